use std::fmt::{self, Display};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{config::SimConfig, define_map, geo::Coordinate, oracle::DistanceOracle};

use super::{
    order::OrderId,
    parse_naive_time, read_csv, serialize_naive_time,
    stop::{Stop, StopKind},
};

#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DriverId(pub String);

impl Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Motorbike,
    Bike,
    Car,
}

impl VehicleClass {
    pub fn penalty(&self, config: &SimConfig) -> f64 {
        match self {
            VehicleClass::Motorbike => config.penalty_motorbike,
            VehicleClass::Bike => config.penalty_bike,
            VehicleClass::Car => config.penalty_car,
        }
    }
}

fn default_capacity() -> usize {
    2
}

/// One row of `couriers.csv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRecord {
    pub driver_id: DriverId,
    pub start_lat: f64,
    pub start_lng: f64,
    pub vehicle_type: VehicleClass,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(
        deserialize_with = "parse_naive_time",
        serialize_with = "serialize_naive_time"
    )]
    pub available_from: NaiveTime,
}

impl DriverRecord {
    pub fn read(path: impl AsRef<Path>) -> anyhow::Result<Vec<DriverRecord>> {
        read_csv(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverStatus {
    /// No assigned orders.
    Idle,
    /// At least one pickup pending; more orders may attach up to capacity.
    Accruing,
    /// All pickups done; the remaining route is frozen.
    Delivering,
}

#[derive(Debug, Clone, Serialize)]
pub struct Driver {
    pub id: DriverId,
    pub origin: Coordinate,
    pub vehicle_class: VehicleClass,
    pub capacity: usize,
    pub available_from: NaiveDateTime,

    pub position: Coordinate,
    pub status: DriverStatus,
    pub assigned_orders: Vec<OrderId>,
    pub route_stops: Vec<Stop>,
    pub current_stop_index: usize,
    pub eta_next_stop: Option<NaiveDateTime>,
    /// Kilometers traversed so far, for the KPI ledger.
    pub distance_km: f64,
}

impl Driver {
    pub fn from_record(record: &DriverRecord, date: NaiveDate) -> Self {
        let origin = Coordinate::new(record.start_lat, record.start_lng);
        Self {
            id: record.driver_id.clone(),
            origin,
            vehicle_class: record.vehicle_type,
            capacity: record.capacity,
            available_from: date.and_time(record.available_from),
            position: origin,
            status: DriverStatus::Idle,
            assigned_orders: Vec::new(),
            route_stops: Vec::new(),
            current_stop_index: 0,
            eta_next_stop: None,
            distance_km: 0.0,
        }
    }

    pub fn remaining_stops(&self) -> &[Stop] {
        &self.route_stops[self.current_stop_index.min(self.route_stops.len())..]
    }

    pub fn spare_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.assigned_orders.len())
    }

    pub fn has_pending_pickup(&self) -> bool {
        self.remaining_stops()
            .iter()
            .any(|s| s.kind == StopKind::Pickup)
    }

    /// Length of the committed route from the current position, the base
    /// against which marginal bids are measured.
    pub fn committed_route_distance(&self, oracle: &dyn DistanceOracle) -> f64 {
        let mut from = self.position;
        let mut total = 0.0;
        for stop in self.remaining_stops() {
            total += oracle.distance(from, stop.coord);
            from = stop.coord;
        }
        total
    }
}

define_map!(DriverId, Driver, DriverMap);
