use chrono::{Duration, NaiveDateTime};

/// Convert fractional minutes to a `Duration` with second resolution.
pub fn mins_f64(mins: f64) -> Duration {
    Duration::seconds((mins * 60.0).round() as i64)
}

/// Signed difference `later - earlier` in fractional minutes.
pub fn mins_between(later: NaiveDateTime, earlier: NaiveDateTime) -> f64 {
    later.signed_duration_since(earlier).num_seconds() as f64 / 60.0
}
