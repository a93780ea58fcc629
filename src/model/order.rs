use std::fmt::{self, Display};
use std::path::Path;

use anyhow::bail;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{define_map, geo::Coordinate, utils::mins_between};

use super::{driver::DriverId, parse_naive_time, read_csv, serialize_naive_time};

#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of `orders.csv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
    #[serde(
        deserialize_with = "parse_naive_time",
        serialize_with = "serialize_naive_time"
    )]
    pub created_time: NaiveTime,
    #[serde(
        deserialize_with = "parse_naive_time",
        serialize_with = "serialize_naive_time"
    )]
    pub deadline: NaiveTime,
    pub estimated_delivery_time_min: i64,
}

impl OrderRecord {
    pub fn read(path: impl AsRef<Path>) -> anyhow::Result<Vec<OrderRecord>> {
        read_csv(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum OrderStatus {
    Pending,
    Assigned,
    PickedUp,
    Delivered,
}

/// Runtime order state. Status only ever moves forward; the transition
/// methods reject anything else so a corrupted dispatch round surfaces
/// immediately.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub pickup: Coordinate,
    pub dropoff: Coordinate,
    pub created_at: NaiveDateTime,
    pub deadline: NaiveDateTime,
    pub estimated_duration_mins: i64,
    pub status: OrderStatus,
    pub pickup_time: Option<NaiveDateTime>,
    pub dropoff_time: Option<NaiveDateTime>,
    pub assigned_driver: Option<DriverId>,
}

impl Order {
    pub fn from_record(record: &OrderRecord, date: NaiveDate) -> Self {
        Self {
            id: record.order_id.clone(),
            pickup: Coordinate::new(record.pickup_lat, record.pickup_lng),
            dropoff: Coordinate::new(record.dropoff_lat, record.dropoff_lng),
            created_at: date.and_time(record.created_time),
            deadline: date.and_time(record.deadline),
            estimated_duration_mins: record.estimated_delivery_time_min,
            status: OrderStatus::Pending,
            pickup_time: None,
            dropoff_time: None,
            assigned_driver: None,
        }
    }

    pub fn age_mins(&self, now: NaiveDateTime) -> f64 {
        mins_between(now, self.created_at)
    }

    /// Within one third of the estimated duration of the deadline.
    pub fn urgent(&self, now: NaiveDateTime) -> bool {
        let slack = mins_between(self.deadline, now);
        slack <= self.estimated_duration_mins as f64 / 3.0
    }

    /// Creation-to-dropoff minutes, once delivered.
    pub fn delivery_duration_mins(&self) -> Option<f64> {
        self.dropoff_time.map(|t| mins_between(t, self.created_at))
    }

    pub fn mark_assigned(&mut self, driver: &DriverId) -> anyhow::Result<()> {
        match self.status {
            OrderStatus::Pending => {
                self.status = OrderStatus::Assigned;
                self.assigned_driver = Some(driver.clone());
                Ok(())
            }
            // Re-routing on the owning driver is fine as long as the order
            // has not been picked up.
            OrderStatus::Assigned if self.assigned_driver.as_ref() == Some(driver) => Ok(()),
            _ => bail!(
                "order {} cannot be assigned to {driver} while {:?} (owner {:?})",
                self.id,
                self.status,
                self.assigned_driver
            ),
        }
    }

    pub fn mark_picked_up(&mut self, time: NaiveDateTime) -> anyhow::Result<()> {
        if self.status != OrderStatus::Assigned {
            bail!("order {} picked up while {:?}", self.id, self.status);
        }
        self.status = OrderStatus::PickedUp;
        self.pickup_time = Some(time);
        Ok(())
    }

    pub fn mark_delivered(&mut self, time: NaiveDateTime) -> anyhow::Result<()> {
        if self.status != OrderStatus::PickedUp {
            bail!("order {} delivered while {:?}", self.id, self.status);
        }
        if self.pickup_time.map(|p| p > time).unwrap_or(false) {
            bail!("order {} delivered before its pickup", self.id);
        }
        self.status = OrderStatus::Delivered;
        self.dropoff_time = Some(time);
        Ok(())
    }
}

define_map!(OrderId, Order, OrderMap);

#[cfg(test)]
mod tests {
    use crate::model::read_csv_from;

    use super::*;

    const ORDERS_CSV: &str = "\
order_id,pickup_lat,pickup_lng,dropoff_lat,dropoff_lng,created_time,deadline,estimated_delivery_time_min
O_1,25.2901,51.5352,25.3002,51.5450,17:00:00,17:45:00,20
O_2,25.2800,51.5300,25.2900,51.5400,17:03:00,17:50:00,25
";

    #[test]
    fn parses_canonical_schema() {
        let records: Vec<OrderRecord> =
            read_csv_from(ORDERS_CSV.as_bytes(), "orders.csv").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].order_id, OrderId("O_1".into()));
        assert_eq!(
            records[1].created_time,
            NaiveTime::from_hms_opt(17, 3, 0).unwrap()
        );
        assert_eq!(records[1].estimated_delivery_time_min, 25);
    }

    #[test]
    fn rejects_malformed_timestamp() {
        let bad = ORDERS_CSV.replace("17:00:00", "5pm");
        let result: anyhow::Result<Vec<OrderRecord>> =
            read_csv_from(bad.as_bytes(), "orders.csv");
        assert!(result.is_err());
    }

    #[test]
    fn status_progresses_monotonically() {
        let records: Vec<OrderRecord> =
            read_csv_from(ORDERS_CSV.as_bytes(), "orders.csv").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut order = Order::from_record(&records[0], date);
        let driver = DriverId("D_1".into());
        let other = DriverId("D_2".into());
        let t = date.and_time(NaiveTime::from_hms_opt(17, 10, 0).unwrap());

        assert!(order.mark_picked_up(t).is_err());
        order.mark_assigned(&driver).unwrap();
        // Re-routing on the same driver is allowed, stealing is not.
        order.mark_assigned(&driver).unwrap();
        assert!(order.mark_assigned(&other).is_err());
        order.mark_picked_up(t).unwrap();
        assert!(order.mark_assigned(&driver).is_err());
        order.mark_delivered(t + chrono::Duration::minutes(9)).unwrap();
        assert!(order.mark_picked_up(t).is_err());
        assert!((order.delivery_duration_mins().unwrap() - 19.0).abs() < 1e-9);
    }
}
