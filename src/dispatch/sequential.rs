use std::sync::Arc;

use tracing::{debug, warn};

use crate::{model::Map as _, route::Bundle};

use super::{record_win, Assignment, Auction, DispatchArgs, DispatchPolicy};

/// Per-order marginal auction: each pending order, in arrival order, goes
/// to the driver whose route it extends most cheaply. When every bid is
/// infinite the order still ships with the nearest driver that has spare
/// capacity, late but not abandoned.
pub struct SequentialPolicy {
    auction: Arc<Auction>,
}

impl SequentialPolicy {
    pub fn new(auction: Arc<Auction>) -> Self {
        Self { auction }
    }
}

impl DispatchPolicy for SequentialPolicy {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn dispatch(&mut self, args: &DispatchArgs<'_>) -> Vec<Assignment> {
        let mut pool = self.auction.eligible_pool(args);
        let mut out = Vec::new();

        for order_id in args.pending {
            let order = args.orders.gets(order_id);
            let new_ids = std::slice::from_ref(order_id);

            let mut best: Option<(usize, Bundle, f64)> = None;
            for (i, scratch) in pool.iter().enumerate() {
                let Some((bundle, cost)) = self.auction.candidate(scratch, new_ids, args) else {
                    continue;
                };
                if !cost.is_finite() {
                    continue;
                }
                // The pool is id-ordered, so keeping the first of equal
                // bids is a stable tie-break.
                if best.as_ref().map(|(_, _, c)| cost < *c).unwrap_or(true) {
                    best = Some((i, bundle, cost));
                }
            }

            match best {
                Some((i, bundle, cost)) => {
                    debug!("{order_id} -> {} at cost {cost:.3}", pool[i].id);
                    out.push(record_win(
                        &mut pool[i],
                        bundle,
                        vec![order_id.clone()],
                        Some(cost),
                        false,
                    ));
                }
                None => {
                    let Some(i) = self.auction.nearest_with_capacity(&pool, order) else {
                        debug!("{order_id} has no driver with spare capacity, deferring");
                        continue;
                    };
                    let bundle = self.auction.unscored_candidate(&pool[i], new_ids, args);
                    warn!(
                        "every bid for {order_id} was rejected, assigning to nearest driver {}",
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
            }
        }
        out
    }
}
