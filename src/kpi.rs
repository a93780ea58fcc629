use std::collections::BTreeSet;
use std::fmt::Write as _;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::model::{
    driver::{DriverId, DriverMap, DriverStatus},
    order::{OrderMap, OrderStatus},
    Map as _,
};

/// Delivery-duration thresholds reported as dedicated late buckets.
const LATE_BUCKET_1_MINS: f64 = 45.0;
const LATE_BUCKET_2_MINS: f64 = 60.0;

/// Per-tick snapshot of the running counters.
#[derive(Debug, Clone, Serialize)]
pub struct TickKpi {
    pub now: NaiveDateTime,
    pub drivers_activated: usize,
    pub total_distance_km: f64,
    pub delivered: usize,
    pub on_time: usize,
    pub late_over_45: usize,
    pub late_over_60: usize,
}

/// End-of-run KPI row.
#[derive(Debug, Clone, Serialize)]
pub struct KpiSnapshot {
    pub strategy: String,
    pub total_distance_km: f64,
    pub delivered: usize,
    pub undelivered: usize,
    pub avg_delivery_mins: f64,
    pub median_delivery_mins: f64,
    pub p95_delivery_mins: f64,
    pub max_delivery_mins: f64,
    pub drivers_activated: usize,
    pub orders_per_driver: f64,
    pub on_time_rate: f64,
    pub late_over_45: usize,
    pub late_over_60: usize,
    pub fleet_utilization_pct: f64,
}

/// Write-only per tick; aggregated once at the end of the run.
#[derive(Debug, Clone, Default)]
pub struct KpiRecorder {
    activated: BTreeSet<DriverId>,
    busy_driver_ticks: u64,
    ticks: u64,
    trace: Vec<TickKpi>,
}

fn order_counters(orders: &OrderMap) -> (usize, usize, usize, usize, Vec<f64>) {
    let mut delivered = 0;
    let mut on_time = 0;
    let mut late_45 = 0;
    let mut late_60 = 0;
    let mut durations = Vec::new();
    for order in orders.values() {
        if order.status != OrderStatus::Delivered {
            continue;
        }
        delivered += 1;
        if order.dropoff_time.map(|t| t <= order.deadline).unwrap_or(false) {
            on_time += 1;
        }
        if let Some(mins) = order.delivery_duration_mins() {
            if mins > LATE_BUCKET_1_MINS {
                late_45 += 1;
            }
            if mins > LATE_BUCKET_2_MINS {
                late_60 += 1;
            }
            durations.push(mins);
        }
    }
    (delivered, on_time, late_45, late_60, durations)
}

/// Nearest-rank percentile over an ascending slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0 * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1]
}

impl KpiRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fleet activation only ever grows.
    pub fn record_assignment(&mut self, driver_id: &DriverId) {
        self.activated.insert(driver_id.clone());
    }

    pub fn record_tick(&mut self, now: NaiveDateTime, orders: &OrderMap, drivers: &DriverMap) {
        self.ticks += 1;
        self.busy_driver_ticks += drivers
            .values()
            .filter(|d| d.status != DriverStatus::Idle)
            .count() as u64;
        let (delivered, on_time, late_45, late_60, _) = order_counters(orders);
        self.trace.push(TickKpi {
            now,
            drivers_activated: self.activated.len(),
            total_distance_km: drivers.values().map(|d| d.distance_km).sum(),
            delivered,
            on_time,
            late_over_45: late_45,
            late_over_60: late_60,
        });
    }

    pub fn drivers_activated(&self) -> usize {
        self.activated.len()
    }

    pub fn trace(&self) -> &[TickKpi] {
        &self.trace
    }

    pub fn snapshot(&self, strategy: &str, orders: &OrderMap, drivers: &DriverMap) -> KpiSnapshot {
        let (delivered, on_time, late_45, late_60, mut durations) = order_counters(orders);
        durations.sort_by(|a, b| a.total_cmp(b));

        let total_orders = orders.len();
        let fleet_size = drivers.len();
        let avg = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };
        let assigned_ever = orders
            .values()
            .filter(|o| o.assigned_driver.is_some())
            .count();

        KpiSnapshot {
            strategy: strategy.to_string(),
            total_distance_km: drivers.values().map(|d| d.distance_km).sum(),
            delivered,
            undelivered: total_orders - delivered,
            avg_delivery_mins: avg,
            median_delivery_mins: percentile(&durations, 50.0),
            p95_delivery_mins: percentile(&durations, 95.0),
            max_delivery_mins: durations.last().copied().unwrap_or(0.0),
            drivers_activated: self.activated.len(),
            orders_per_driver: if self.activated.is_empty() {
                0.0
            } else {
                assigned_ever as f64 / self.activated.len() as f64
            },
            on_time_rate: if total_orders == 0 {
                0.0
            } else {
                on_time as f64 / total_orders as f64
            },
            late_over_45: late_45,
            late_over_60: late_60,
            fleet_utilization_pct: if self.ticks == 0 || fleet_size == 0 {
                0.0
            } else {
                self.busy_driver_ticks as f64 / (self.ticks * fleet_size as u64) as f64 * 100.0
            },
        }
    }
}

/// Fixed-width comparison table over one row per strategy.
pub fn render_table(rows: &[KpiSnapshot]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<14} {:>9} {:>6} {:>7} {:>7} {:>7} {:>7} {:>8} {:>8} {:>8} {:>6} {:>6} {:>7}",
        "strategy",
        "dist_km",
        "deliv",
        "avg_m",
        "med_m",
        "p95_m",
        "max_m",
        "drivers",
        "ord/drv",
        "on_time",
        ">45m",
        ">60m",
        "util%"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:<14} {:>9.1} {:>6} {:>7.1} {:>7.1} {:>7.1} {:>7.1} {:>8} {:>8.2} {:>7.1}% {:>6} {:>6} {:>7.1}",
            row.strategy,
            row.total_distance_km,
            row.delivered,
            row.avg_delivery_mins,
            row.median_delivery_mins,
            row.p95_delivery_mins,
            row.max_delivery_mins,
            row.drivers_activated,
            row.orders_per_driver,
            row.on_time_rate * 100.0,
            row.late_over_45,
            row.late_over_60,
            row.fleet_utilization_pct
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_nearest_rank() {
        let values = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&values, 50.0), 20.0);
        assert_eq!(percentile(&values, 95.0), 40.0);
        assert_eq!(percentile(&values, 100.0), 40.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[7.0], 95.0), 7.0);
    }

    #[test]
    fn activation_is_monotone() {
        let mut recorder = KpiRecorder::new();
        let a = DriverId("D_1".into());
        let b = DriverId("D_2".into());
        recorder.record_assignment(&a);
        assert_eq!(recorder.drivers_activated(), 1);
        recorder.record_assignment(&a);
        assert_eq!(recorder.drivers_activated(), 1);
        recorder.record_assignment(&b);
        assert_eq!(recorder.drivers_activated(), 2);
    }
}
