use chrono::NaiveTime;

/// Immutable run configuration, threaded through every component
/// constructor. A harness can build variants without any process-wide
/// state.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Minutes pending orders accumulate before an auction round.
    pub batch_window_mins: f64,
    /// Orders/minute at which the adaptive policy switches to the
    /// combinatorial auction.
    pub high_load_threshold: f64,
    /// Window in minutes for the adaptive arrival-rate estimate.
    pub combinatorial_window_mins: i64,
    /// Cap on bundle size produced by the generator.
    pub max_bundle_size: usize,
    /// Pickup-proximity threshold for pair emission, in kilometers.
    pub max_pickup_distance_km: f64,
    pub w_distance: f64,
    pub w_delay: f64,
    /// Multiplier taken off the per-order cost for every extra order in a
    /// bundle, clamped so the discount never goes negative.
    pub bundle_discount_per_order: f64,
    /// Hard rejection floor: projected creation-to-dropoff minutes above
    /// this make a bid infinite.
    pub max_delivery_time_mins: f64,
    /// Minutes a driver is held at every stop.
    pub service_time_mins: f64,
    pub avg_speed_kmh: f64,
    pub penalty_motorbike: f64,
    pub penalty_bike: f64,
    pub penalty_car: f64,
    /// Query a road-distance service instead of plain Haversine.
    pub use_road_distance: bool,
    pub road_distance_url: String,
    pub t_start: NaiveTime,
    pub t_end: NaiveTime,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            batch_window_mins: 1.0,
            high_load_threshold: 2.0,
            combinatorial_window_mins: 5,
            max_bundle_size: 2,
            max_pickup_distance_km: 5.0,
            w_distance: 1.0,
            w_delay: 1.5,
            bundle_discount_per_order: 0.25,
            max_delivery_time_mins: 52.0,
            service_time_mins: 5.0,
            avg_speed_kmh: 35.0,
            penalty_motorbike: 1.0,
            penalty_bike: 1.2,
            penalty_car: 1.4,
            use_road_distance: false,
            road_distance_url: "http://localhost:5000".to_string(),
            t_start: NaiveTime::from_hms_opt(17, 0, 0).expect("valid time"),
            t_end: NaiveTime::from_hms_opt(22, 0, 0).expect("valid time"),
        }
    }
}
