use std::collections::BTreeSet;
use std::sync::Arc;

use crate::{
    config::SimConfig,
    model::order::{Order, OrderId},
    oracle::DistanceOracle,
};

/// Recursion depth cap for the cut tree.
const MAX_CUT_DEPTH: usize = 5;

/// Produces candidate order groups for the combinatorial auction:
/// clusters from a recursive greedy max-cut over pickup distances, every
/// proximate pair, and every singleton.
pub struct BundleGenerator {
    config: SimConfig,
    oracle: Arc<dyn DistanceOracle>,
}

impl BundleGenerator {
    pub fn new(config: SimConfig, oracle: Arc<dyn DistanceOracle>) -> Self {
        Self { config, oracle }
    }

    /// Candidate groups over `pending`, each of size in
    /// `[1, max_bundle_size]`, deduplicated by unordered id set. Every
    /// order is covered by at least its singleton.
    pub fn generate(&self, pending: &[&Order]) -> Vec<Vec<OrderId>> {
        let n = pending.len();
        let pickups: Vec<_> = pending.iter().map(|o| o.pickup).collect();
        let distances = self.oracle.table(&pickups);

        let mut groups: Vec<Vec<usize>> = Vec::new();
        self.cut((0..n).collect(), &distances, 0, &mut groups);

        for i in 0..n {
            for j in (i + 1)..n {
                if distances[i][j] <= self.config.max_pickup_distance_km {
                    groups.push(vec![i, j]);
                }
            }
        }
        for i in 0..n {
            groups.push(vec![i]);
        }

        let mut seen: BTreeSet<Vec<&OrderId>> = BTreeSet::new();
        let mut out = Vec::new();
        for group in groups {
            let mut key: Vec<&OrderId> = group.iter().map(|&i| &pending[i].id).collect();
            key.sort_unstable();
            if seen.insert(key) {
                out.push(group.iter().map(|&i| pending[i].id.clone()).collect());
            }
        }
        out
    }

    fn cut(
        &self,
        indices: Vec<usize>,
        distances: &[Vec<f64>],
        depth: usize,
        out: &mut Vec<Vec<usize>>,
    ) {
        if indices.is_empty() {
            return;
        }
        if indices.len() <= self.config.max_bundle_size {
            out.push(indices);
            return;
        }
        if depth >= MAX_CUT_DEPTH {
            return;
        }

        // Greedy max-cut: each order joins the side that maximizes the
        // inter-group distance, which keeps nearby pickups together.
        let mut side_a: Vec<usize> = Vec::new();
        let mut side_b: Vec<usize> = Vec::new();
        for &i in &indices {
            let to_a: f64 = side_a.iter().map(|&j| distances[i][j]).sum();
            let to_b: f64 = side_b.iter().map(|&j| distances[i][j]).sum();
            // Joining A cuts the edges towards B and vice versa.
            if to_b >= to_a {
                side_a.push(i);
            } else {
                side_b.push(i);
            }
        }

        if side_a.is_empty() || side_b.is_empty() {
            // Degenerate split (all-equal distances); no further progress.
            return;
        }
        self.cut(side_a, distances, depth + 1, out);
        self.cut(side_b, distances, depth + 1, out);
    }
}
