use std::sync::Arc;

use ordered_float::OrderedFloat;
use tracing::{debug, warn};

use crate::{
    model::{
        driver::DriverId,
        order::{Order, OrderId},
        Map as _,
    },
    route::Bundle,
};

use super::{record_win, Assignment, Auction, DispatchArgs, DispatchPolicy};

/// Selection key: cheapest bid first, then the larger new-order set, then
/// stable driver/bundle identifiers for reproducibility.
type SelectionKey = (OrderedFloat<f64>, i64, DriverId, String);

/// Bundle auction: candidate groups from the generator are offered to
/// every eligible driver and the cheapest `(driver, bundle)` pair wins
/// each iteration. Preferring larger new-order sets on cost ties is what
/// compresses the fleet.
pub struct CombinatorialPolicy {
    auction: Arc<Auction>,
}

impl CombinatorialPolicy {
    pub fn new(auction: Arc<Auction>) -> Self {
        Self { auction }
    }
}

impl DispatchPolicy for CombinatorialPolicy {
    fn name(&self) -> &'static str {
        "combinatorial"
    }

    fn dispatch(&mut self, args: &DispatchArgs<'_>) -> Vec<Assignment> {
        let mut pool = self.auction.eligible_pool(args);
        let mut pending: Vec<OrderId> = args.pending.to_vec();
        let mut out = Vec::new();

        while !pending.is_empty() && pool.iter().any(|s| s.spare_capacity() > 0) {
            let pending_refs: Vec<&Order> =
                pending.iter().map(|id| args.orders.gets(id)).collect();
            let groups = self.auction.bundles().generate(&pending_refs);

            let mut best: Option<(SelectionKey, usize, Bundle, Vec<OrderId>, f64)> = None;
            for group in &groups {
                for (i, scratch) in pool.iter().enumerate() {
                    let Some((bundle, cost)) = self.auction.candidate(scratch, group, args)
                    else {
                        continue;
                    };
                    if !cost.is_finite() {
                        continue;
                    }
                    let key: SelectionKey = (
                        OrderedFloat(cost),
                        -(group.len() as i64),
                        scratch.id.clone(),
                        bundle.key(),
                    );
                    if best.as_ref().map(|(k, ..)| key < *k).unwrap_or(true) {
                        best = Some((key, i, bundle, group.clone(), cost));
                    }
                }
            }

            match best {
                Some((_, i, bundle, group, cost)) => {
                    debug!(
                        "bundle [{}] -> {} at cost {cost:.3}",
                        bundle.key(),
                        pool[i].id
                    );
                    pending.retain(|id| !group.contains(id));
                    out.push(record_win(&mut pool[i], bundle, group, Some(cost), false));
                }
                None => {
                    // No finite bid anywhere: place what still fits with
                    // the nearest drivers and end the round.
                    for order_id in &pending {
                        let order = args.orders.gets(order_id);
                        let Some(i) = self.auction.nearest_with_capacity(&pool, order) else {
                            debug!("{order_id} has no driver with spare capacity, deferring");
                            continue;
                        };
                        let bundle = self.auction.unscored_candidate(
                            &pool[i],
                            std::slice::from_ref(order_id),
                            args,
                        );
                        warn!(
                            "every bundle bid for {order_id} was rejected, assigning to nearest driver {}",
                            pool[i].id
                        );
                        out.push(record_win(
                            &mut pool[i],
                            bundle,
                            vec![order_id.clone()],
                            None,
                            true,
                        ));
                    }
                    pending.clear();
                }
            }
        }
        out
    }
}
