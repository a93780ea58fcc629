use std::sync::Arc;

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::{
    model::{stop::Stop, Map as _},
    oracle::DistanceOracle as _,
};

use super::{Assignment, Auction, DispatchArgs, DispatchPolicy};

/// Greedy nearest-idle-driver matching: one order, one fresh two-stop
/// route, no bundling, no re-routing. Orders with no idle driver left
/// defer to the next tick.
pub struct BaselinePolicy {
    auction: Arc<Auction>,
}

impl BaselinePolicy {
    pub fn new(auction: Arc<Auction>) -> Self {
        Self { auction }
    }
}

impl DispatchPolicy for BaselinePolicy {
    fn name(&self) -> &'static str {
        "baseline"
    }

    fn dispatch(&mut self, args: &DispatchArgs<'_>) -> Vec<Assignment> {
        let mut pool = self.auction.eligible_pool(args);
        pool.retain(|s| s.was_idle);

        let mut out = Vec::new();
        for order_id in args.pending {
            let order = args.orders.gets(order_id);
            let Some(winner) = pool
                .iter()
                .enumerate()
                .filter(|(_, s)| s.assigned.is_empty())
                .min_by_key(|(_, s)| {
                    (
                        OrderedFloat(self.auction.oracle().distance(s.position, order.pickup)),
                        s.id.clone(),
                    )
                })
                .map(|(i, _)| i)
            else {
                debug!("no idle driver for {order_id}, deferring");
                continue;
            };

            let scratch = &mut pool[winner];
            let to_pickup = self.auction.oracle().distance(scratch.position, order.pickup);
            let leg = self.auction.oracle().distance(order.pickup, order.dropoff);
            scratch.assigned = vec![order_id.clone()];
            out.push(Assignment {
                driver_id: scratch.id.clone(),
                order_ids: vec![order_id.clone()],
                new_order_ids: vec![order_id.clone()],
                stops: vec![
                    Stop::pickup(order.pickup, order_id.clone()),
                    Stop::dropoff(order.dropoff, order_id.clone()),
                ],
                route_distance: to_pickup + leg,
                cost: None,
                fallback: false,
            });
        }
        out
    }
}
