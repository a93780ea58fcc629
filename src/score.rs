use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::{
    config::SimConfig,
    geo::Coordinate,
    model::{driver::VehicleClass, order::OrderMap, stop::StopKind, Map as _},
    oracle::DistanceOracle,
    route::Bundle,
    utils::mins_between,
};

/// Projected lateness beyond the estimate is capped so one pathological
/// order cannot dominate a bid.
const LATENESS_CAP_MINS: f64 = 20.0;

/// The bidder-side view of a driver. Auctions score tentative states, so
/// this is deliberately decoupled from the simulator's `Driver`.
#[derive(Debug, Clone)]
pub struct BidderView {
    pub position: Coordinate,
    pub capacity: usize,
    pub vehicle_class: VehicleClass,
}

/// Marginal trip cost. Lower wins; `f64::INFINITY` is a hard rejection.
pub struct Scorer {
    config: SimConfig,
    oracle: Arc<dyn DistanceOracle>,
}

impl Scorer {
    pub fn new(config: SimConfig, oracle: Arc<dyn DistanceOracle>) -> Self {
        Self { config, oracle }
    }

    /// Score `bundle` for a driver whose committed work measures
    /// `existing_route_distance` from its current position.
    ///
    /// Traversal charges travel to each stop, then the per-stop service
    /// time against the following leg; the simulator applies the same
    /// rule, so projections and realized times agree.
    pub fn bid(
        &self,
        driver: &BidderView,
        bundle: &Bundle,
        orders: &OrderMap,
        now: NaiveDateTime,
        existing_route_distance: f64,
    ) -> f64 {
        if bundle.order_ids.len() > driver.capacity {
            return f64::INFINITY;
        }

        let mut position = driver.position;
        let mut elapsed_mins = 0.0;
        let mut total_lateness = 0.0;
        for stop in &bundle.stops {
            elapsed_mins += self.oracle.travel_time(position, stop.coord);
            position = stop.coord;
            if stop.kind == StopKind::Dropoff {
                let order = orders.gets(&stop.order_id);
                let projected_duration = mins_between(now, order.created_at) + elapsed_mins;
                if projected_duration > self.config.max_delivery_time_mins {
                    return f64::INFINITY;
                }
                let lateness = projected_duration - order.estimated_duration_mins as f64;
                total_lateness += lateness.clamp(0.0, LATENESS_CAP_MINS);
            }
            elapsed_mins += self.config.service_time_mins;
        }

        let marginal = bundle.total_distance - existing_route_distance;
        let base = self.config.w_distance * marginal + self.config.w_delay * total_lateness;
        let vehicle_adjusted = base * driver.vehicle_class.penalty(&self.config);
        let per_order = vehicle_adjusted / bundle.order_ids.len() as f64;
        let discount =
            (1.0 - self.config.bundle_discount_per_order * (bundle.order_ids.len() - 1) as f64)
                .max(0.0);
        per_order * discount
    }
}
