use std::sync::Arc;

use serde::Serialize;

use crate::{
    geo::Coordinate,
    model::{
        order::{Order, OrderId, OrderStatus},
        stop::Stop,
    },
    oracle::DistanceOracle,
};

/// A candidate order group together with a concrete precedence-respecting
/// visit sequence and its length.
#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    pub order_ids: Vec<OrderId>,
    pub stops: Vec<Stop>,
    pub total_distance: f64,
}

impl Bundle {
    pub fn empty() -> Self {
        Self {
            order_ids: Vec::new(),
            stops: Vec::new(),
            total_distance: f64::INFINITY,
        }
    }

    /// Canonical key over the unordered id set, used for deduplication and
    /// as the last tie-break in auction selection.
    pub fn key(&self) -> String {
        let mut ids: Vec<&str> = self.order_ids.iter().map(|id| id.0.as_str()).collect();
        ids.sort_unstable();
        ids.join("+")
    }
}

/// Exhaustive constrained route search. Inputs stay tiny (bundle sizes are
/// capped well below the point where enumeration hurts), so a pruned
/// depth-first walk over stop permutations is both optimal and fast.
pub struct RouteOptimizer {
    oracle: Arc<dyn DistanceOracle>,
}

struct Search<'a> {
    oracle: &'a dyn DistanceOracle,
    orders: &'a [&'a Order],
    pickup_placed: Vec<bool>,
    dropoff_placed: Vec<bool>,
    sequence: Vec<Stop>,
    best: Option<(f64, Vec<Stop>)>,
}

impl RouteOptimizer {
    pub fn new(oracle: Arc<dyn DistanceOracle>) -> Self {
        Self { oracle }
    }

    /// Minimum-distance visit sequence from `start` over `orders`. Orders
    /// already picked up contribute a dropoff only; every other order
    /// contributes a pickup that must precede its dropoff.
    pub fn optimize(&self, start: Coordinate, orders: &[&Order]) -> Bundle {
        if orders.is_empty() {
            return Bundle::empty();
        }

        let mut search = Search {
            oracle: self.oracle.as_ref(),
            orders,
            // A picked-up order behaves as if its pickup were already behind us.
            pickup_placed: orders
                .iter()
                .map(|o| o.status == OrderStatus::PickedUp)
                .collect(),
            dropoff_placed: vec![false; orders.len()],
            sequence: Vec::with_capacity(orders.len() * 2),
            best: None,
        };
        search.explore(start, 0.0);

        let (total_distance, stops) = search.best.expect("at least one valid sequence exists");
        Bundle {
            order_ids: orders.iter().map(|o| o.id.clone()).collect(),
            stops,
            total_distance,
        }
    }
}

impl Search<'_> {
    fn explore(&mut self, position: Coordinate, travelled: f64) {
        if self.dropoff_placed.iter().all(|&d| d) {
            match &self.best {
                Some((best, _)) if *best <= travelled => {}
                _ => self.best = Some((travelled, self.sequence.clone())),
            }
            return;
        }
        if let Some((best, _)) = &self.best {
            if travelled >= *best {
                return;
            }
        }

        for i in 0..self.orders.len() {
            let order = self.orders[i];
            if !self.pickup_placed[i] {
                self.pickup_placed[i] = true;
                self.sequence.push(Stop::pickup(order.pickup, order.id.clone()));
                let d = travelled + self.oracle.distance(position, order.pickup);
                self.explore(order.pickup, d);
                self.sequence.pop();
                self.pickup_placed[i] = false;
            } else if !self.dropoff_placed[i] {
                self.dropoff_placed[i] = true;
                self.sequence.push(Stop::dropoff(order.dropoff, order.id.clone()));
                let d = travelled + self.oracle.distance(position, order.dropoff);
                self.explore(order.dropoff, d);
                self.sequence.pop();
                self.dropoff_placed[i] = false;
            }
        }
    }
}
