use std::sync::Arc;

use anyhow::Context as _;
use serde::Deserialize;
use tracing::warn;

use crate::{config::SimConfig, geo::Coordinate};

/// Detour multiplier applied to Haversine when the road backend is down.
const ROAD_DETOUR_FACTOR: f64 = 1.4;

/// Read-only geographic metric. Implementations must be cheap to query
/// many times per tick and safe to share across threads.
pub trait DistanceOracle: Send + Sync {
    /// Distance in kilometers. Non-negative and symmetric.
    fn distance(&self, a: Coordinate, b: Coordinate) -> f64;

    /// Travel time in minutes.
    fn travel_time(&self, a: Coordinate, b: Coordinate) -> f64;

    /// Full pairwise matrix, row-major over `points`.
    fn table(&self, points: &[Coordinate]) -> Vec<Vec<f64>> {
        points
            .iter()
            .map(|a| points.iter().map(|b| self.distance(*a, *b)).collect())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct HaversineOracle {
    avg_speed_kmh: f64,
}

impl HaversineOracle {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            avg_speed_kmh: config.avg_speed_kmh,
        }
    }
}

impl DistanceOracle for HaversineOracle {
    fn distance(&self, a: Coordinate, b: Coordinate) -> f64 {
        a.haversine_km(&b)
    }

    fn travel_time(&self, a: Coordinate, b: Coordinate) -> f64 {
        self.distance(a, b) / self.avg_speed_kmh * 60.0
    }
}

#[derive(Debug, Deserialize)]
struct RoadRoute {
    /// Meters.
    distance: f64,
    /// Seconds.
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct RoadResponse {
    routes: Vec<RoadRoute>,
}

/// Road-distance backend speaking the OSRM `route` API. Every failure
/// falls back to Haversine scaled by a detour factor.
pub struct RoadDistanceOracle {
    client: reqwest::blocking::Client,
    base_url: String,
    fallback: HaversineOracle,
}

impl RoadDistanceOracle {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: config.road_distance_url.clone(),
            fallback: HaversineOracle::new(config),
        }
    }

    /// `(km, minutes)` over the road network.
    fn query(&self, a: Coordinate, b: Coordinate) -> anyhow::Result<(f64, f64)> {
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}?overview=false",
            self.base_url, a.lng, a.lat, b.lng, b.lat
        );
        let response: RoadResponse = self
            .client
            .get(&url)
            .send()
            .context("road distance request failed")?
            .json()
            .context("road distance response is not valid JSON")?;
        let route = response
            .routes
            .first()
            .context("road distance response contains no route")?;
        Ok((route.distance / 1000.0, route.duration / 60.0))
    }

    fn query_or_fallback(&self, a: Coordinate, b: Coordinate) -> (f64, f64) {
        match self.query(a, b) {
            Ok(pair) => pair,
            Err(err) => {
                warn!("road distance unavailable, using haversine fallback: {err:#}");
                (
                    self.fallback.distance(a, b) * ROAD_DETOUR_FACTOR,
                    self.fallback.travel_time(a, b) * ROAD_DETOUR_FACTOR,
                )
            }
        }
    }
}

impl DistanceOracle for RoadDistanceOracle {
    fn distance(&self, a: Coordinate, b: Coordinate) -> f64 {
        self.query_or_fallback(a, b).0
    }

    fn travel_time(&self, a: Coordinate, b: Coordinate) -> f64 {
        self.query_or_fallback(a, b).1
    }
}

pub fn build_oracle(config: &SimConfig) -> Arc<dyn DistanceOracle> {
    if config.use_road_distance {
        Arc::new(RoadDistanceOracle::new(config))
    } else {
        Arc::new(HaversineOracle::new(config))
    }
}
