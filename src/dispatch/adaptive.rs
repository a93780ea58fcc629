use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use crate::model::Map as _;

use super::{
    combinatorial::CombinatorialPolicy, sequential::SequentialPolicy, Assignment, Auction,
    DispatchArgs, DispatchPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionMode {
    Sequential,
    Combinatorial,
}

/// Load-adaptive switching: run the combinatorial auction under bursts,
/// fall back to the cheaper per-order auction when arrivals are sparse.
pub struct AdaptivePolicy {
    auction: Arc<Auction>,
    sequential: SequentialPolicy,
    combinatorial: CombinatorialPolicy,
}

impl AdaptivePolicy {
    pub fn new(auction: Arc<Auction>) -> Self {
        Self {
            sequential: SequentialPolicy::new(auction.clone()),
            combinatorial: CombinatorialPolicy::new(auction.clone()),
            auction,
        }
    }

    /// Orders created within the trailing rate window, per minute.
    pub fn arrival_rate(&self, args: &DispatchArgs<'_>) -> f64 {
        let window_mins = self.auction.config().combinatorial_window_mins;
        let window_start = args.now - Duration::minutes(window_mins);
        let arrived = args
            .orders
            .values()
            .filter(|o| o.created_at > window_start && o.created_at <= args.now)
            .count();
        arrived as f64 / window_mins as f64
    }

    pub fn pick_mode(&self, args: &DispatchArgs<'_>) -> AuctionMode {
        if self.arrival_rate(args) >= self.auction.config().high_load_threshold {
            AuctionMode::Combinatorial
        } else {
            AuctionMode::Sequential
        }
    }
}

impl DispatchPolicy for AdaptivePolicy {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn dispatch(&mut self, args: &DispatchArgs<'_>) -> Vec<Assignment> {
        let rate = self.arrival_rate(args);
        match self.pick_mode(args) {
            AuctionMode::Combinatorial => {
                debug!("arrival rate {rate:.2}/min, running combinatorial auction");
                self.combinatorial.dispatch(args)
            }
            AuctionMode::Sequential => {
                debug!("arrival rate {rate:.2}/min, running sequential auction");
                self.sequential.dispatch(args)
            }
        }
    }
}
