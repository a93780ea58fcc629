use std::sync::Arc;

use chrono::NaiveDateTime;
use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::{
    bundle::BundleGenerator,
    config::SimConfig,
    geo::Coordinate,
    model::{
        driver::{DriverId, DriverMap, DriverStatus, VehicleClass},
        order::{Order, OrderId, OrderMap},
        stop::Stop,
        Map as _,
    },
    oracle::DistanceOracle,
    route::{Bundle, RouteOptimizer},
    score::{BidderView, Scorer},
};

pub mod adaptive;
pub mod baseline;
pub mod combinatorial;
pub mod sequential;

/// Read-only view of the world handed to a policy for one auction round.
/// Policies never mutate drivers or orders; they return assignments and
/// the simulator applies them.
pub struct DispatchArgs<'a> {
    pub now: NaiveDateTime,
    /// Pending order ids in arrival order.
    pub pending: &'a [OrderId],
    pub orders: &'a OrderMap,
    pub drivers: &'a DriverMap,
}

/// A winning `(driver, bundle)` pair. `order_ids` is the driver's full
/// resulting order set; `new_order_ids` is the subset added this round.
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub driver_id: DriverId,
    pub order_ids: Vec<OrderId>,
    pub new_order_ids: Vec<OrderId>,
    pub stops: Vec<Stop>,
    pub route_distance: f64,
    /// Winning bid; absent for baseline picks and fallback assignments.
    pub cost: Option<f64>,
    /// True when the hard delivery floor was bypassed because every bid
    /// came back infinite.
    pub fallback: bool,
}

pub trait DispatchPolicy {
    fn name(&self) -> &'static str;

    fn dispatch(&mut self, args: &DispatchArgs<'_>) -> Vec<Assignment>;
}

pub fn build_policy(name: &str, auction: Arc<Auction>) -> Option<Box<dyn DispatchPolicy>> {
    match name {
        "baseline" => Some(Box::new(baseline::BaselinePolicy::new(auction))),
        "sequential" => Some(Box::new(sequential::SequentialPolicy::new(auction))),
        "combinatorial" => Some(Box::new(combinatorial::CombinatorialPolicy::new(auction))),
        "adaptive" => Some(Box::new(adaptive::AdaptivePolicy::new(auction))),
        _ => None,
    }
}

pub const POLICY_NAMES: [&str; 4] = ["baseline", "sequential", "combinatorial", "adaptive"];

/// A driver's tentative state while an auction round is in flight.
/// Winning bids mutate the scratch copy so later decisions in the same
/// round see capacity and committed work already claimed.
#[derive(Debug, Clone)]
pub struct ScratchDriver {
    pub id: DriverId,
    pub position: Coordinate,
    pub capacity: usize,
    pub vehicle_class: VehicleClass,
    pub assigned: Vec<OrderId>,
    pub route_distance: f64,
    /// Idle at the start of the round (baseline only considers these).
    pub was_idle: bool,
}

impl ScratchDriver {
    pub fn spare_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.assigned.len())
    }
}

/// Shared auction machinery: eligibility, candidate construction and
/// scoring, and the better-late-than-never fallback.
pub struct Auction {
    config: SimConfig,
    oracle: Arc<dyn DistanceOracle>,
    optimizer: RouteOptimizer,
    scorer: Scorer,
    bundles: BundleGenerator,
}

impl Auction {
    pub fn new(config: SimConfig, oracle: Arc<dyn DistanceOracle>) -> Self {
        Self {
            optimizer: RouteOptimizer::new(oracle.clone()),
            scorer: Scorer::new(config.clone(), oracle.clone()),
            bundles: BundleGenerator::new(config.clone(), oracle.clone()),
            config,
            oracle,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn oracle(&self) -> &dyn DistanceOracle {
        self.oracle.as_ref()
    }

    pub fn bundles(&self) -> &BundleGenerator {
        &self.bundles
    }

    /// Idle drivers already on shift enter with no committed work;
    /// accruing drivers with spare capacity enter with their current
    /// route as the marginal baseline. Delivering drivers never bid.
    pub fn eligible_pool(&self, args: &DispatchArgs<'_>) -> Vec<ScratchDriver> {
        args.drivers
            .values()
            .filter_map(|d| match d.status {
                DriverStatus::Idle if d.available_from <= args.now => Some(ScratchDriver {
                    id: d.id.clone(),
                    position: d.position,
                    capacity: d.capacity,
                    vehicle_class: d.vehicle_class,
                    assigned: Vec::new(),
                    route_distance: 0.0,
                    was_idle: true,
                }),
                DriverStatus::Accruing if d.spare_capacity() > 0 => Some(ScratchDriver {
                    id: d.id.clone(),
                    position: d.position,
                    capacity: d.capacity,
                    vehicle_class: d.vehicle_class,
                    assigned: d.assigned_orders.clone(),
                    route_distance: d.committed_route_distance(self.oracle.as_ref()),
                    was_idle: false,
                }),
                _ => None,
            })
            .collect()
    }

    /// Route-optimize `scratch`'s orders plus `new_ids` and score the
    /// marginal bid. `None` when the combined set exceeds capacity.
    pub fn candidate(
        &self,
        scratch: &ScratchDriver,
        new_ids: &[OrderId],
        args: &DispatchArgs<'_>,
    ) -> Option<(Bundle, f64)> {
        if scratch.assigned.len() + new_ids.len() > scratch.capacity {
            return None;
        }
        let combined: Vec<&Order> = scratch
            .assigned
            .iter()
            .chain(new_ids)
            .map(|id| args.orders.gets(id))
            .collect();
        let bundle = self.optimizer.optimize(scratch.position, &combined);
        let view = BidderView {
            position: scratch.position,
            capacity: scratch.capacity,
            vehicle_class: scratch.vehicle_class,
        };
        let cost = self
            .scorer
            .bid(&view, &bundle, args.orders, args.now, scratch.route_distance);
        Some((bundle, cost))
    }

    /// Route for `scratch`'s orders plus `new_ids` without any bid, for
    /// fallback assignments that bypass the delivery floor.
    pub fn unscored_candidate(
        &self,
        scratch: &ScratchDriver,
        new_ids: &[OrderId],
        args: &DispatchArgs<'_>,
    ) -> Bundle {
        let combined: Vec<&Order> = scratch
            .assigned
            .iter()
            .chain(new_ids)
            .map(|id| args.orders.gets(id))
            .collect();
        self.optimizer.optimize(scratch.position, &combined)
    }

    /// Fallback target: the nearest driver that still has spare capacity.
    pub fn nearest_with_capacity(
        &self,
        pool: &[ScratchDriver],
        order: &Order,
    ) -> Option<usize> {
        pool.iter()
            .enumerate()
            .filter(|(_, s)| s.spare_capacity() > 0)
            .min_by_key(|(_, s)| {
                (
                    OrderedFloat(self.oracle.distance(s.position, order.pickup)),
                    s.id.clone(),
                )
            })
            .map(|(i, _)| i)
    }
}

/// Commit a win to the scratch pool and produce the assignment record.
pub fn record_win(
    scratch: &mut ScratchDriver,
    bundle: Bundle,
    new_order_ids: Vec<OrderId>,
    cost: Option<f64>,
    fallback: bool,
) -> Assignment {
    scratch.assigned = bundle.order_ids.clone();
    scratch.route_distance = bundle.total_distance;
    Assignment {
        driver_id: scratch.id.clone(),
        order_ids: bundle.order_ids,
        new_order_ids,
        stops: bundle.stops,
        route_distance: bundle.total_distance,
        cost,
        fallback,
    }
}
