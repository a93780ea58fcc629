use std::collections::BTreeSet;

use anyhow::{bail, ensure, Context as _};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use derivative::Derivative;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::{
    callbacks::dump_json,
    config::SimConfig,
    dispatch::{Assignment, DispatchArgs, DispatchPolicy},
    kpi::{KpiRecorder, KpiSnapshot, TickKpi},
    model::{
        driver::{Driver, DriverId, DriverMap, DriverStatus},
        order::{Order, OrderId, OrderMap, OrderStatus},
        stop::{Stop, StopKind},
        Map as _, MapType,
    },
    oracle::DistanceOracle,
    utils::mins_f64,
};

use super::{callback::SimulationCallback, event_queue::ArrivalQueue};

#[derive(Debug, Clone, Serialize)]
pub struct RouteLogEntry {
    pub time: NaiveDateTime,
    pub stop: Stop,
}

/// Everything a run leaves behind: the KPI row, the per-tick trace, the
/// final entity states, and per-driver visit logs.
pub struct RunResult {
    pub kpis: KpiSnapshot,
    pub trace: Vec<TickKpi>,
    pub orders: OrderMap,
    pub drivers: DriverMap,
    pub route_logs: MapType<DriverId, Vec<RouteLogEntry>>,
}

#[derive(Serialize)]
struct WorldDump<'a> {
    now: NaiveDateTime,
    pending: &'a [OrderId],
    orders: Vec<&'a Order>,
    drivers: Vec<&'a Driver>,
}

/// Tick-synchronous discrete-event loop. Each minute: advance driver
/// state, inject newly created orders, run the policy behind the batching
/// gate, record KPIs.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Simulator {
    config: SimConfig,
    #[derivative(Debug = "ignore")]
    oracle: Arc<dyn DistanceOracle>,
    #[derivative(Debug = "ignore")]
    policy: Box<dyn DispatchPolicy>,
    policy_name: &'static str,

    orders: OrderMap,
    drivers: DriverMap,
    pending: Vec<OrderId>,
    arrivals: ArrivalQueue,

    now: NaiveDateTime,
    t_end: NaiveDateTime,

    recorder: KpiRecorder,
    route_logs: MapType<DriverId, Vec<RouteLogEntry>>,
    #[derivative(Debug = "ignore")]
    callbacks: Vec<Box<dyn SimulationCallback>>,
}

impl Simulator {
    pub fn new(
        config: SimConfig,
        date: NaiveDate,
        oracle: Arc<dyn DistanceOracle>,
        orders: Vec<Order>,
        drivers: Vec<Driver>,
        policy: Box<dyn DispatchPolicy>,
        callbacks: Vec<Box<dyn SimulationCallback>>,
    ) -> Self {
        let mut arrivals = ArrivalQueue::new();
        for order in &orders {
            arrivals.push(order.created_at, order.id.clone());
        }
        let now = date.and_time(config.t_start);
        let t_end = date.and_time(config.t_end);
        let policy_name = policy.name();
        Self {
            config,
            oracle,
            policy,
            policy_name,
            orders: orders.into_iter().map(|o| (o.id.clone(), o)).collect(),
            drivers: drivers.into_iter().map(|d| (d.id.clone(), d)).collect(),
            pending: Vec::new(),
            arrivals,
            now,
            t_end,
            recorder: KpiRecorder::new(),
            route_logs: MapType::new(),
            callbacks,
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn orders(&self) -> &OrderMap {
        &self.orders
    }

    pub fn drivers(&self) -> &DriverMap {
        &self.drivers
    }

    pub fn all_delivered(&self) -> bool {
        self.orders
            .values()
            .all(|o| o.status == OrderStatus::Delivered)
    }

    pub fn run(&mut self) -> anyhow::Result<RunResult> {
        info!(
            "simulating {} orders, {} drivers, policy {}",
            self.orders.len(),
            self.drivers.len(),
            self.policy_name
        );
        while self.now < self.t_end {
            self.tick().with_context(|| format!("tick at {}", self.now))?;
            if self.all_delivered() && self.arrivals.is_empty() {
                info!("all orders delivered at {}", self.now);
                break;
            }
            self.now += Duration::minutes(1);
        }
        let kpis = self
            .recorder
            .snapshot(self.policy_name, &self.orders, &self.drivers);
        Ok(RunResult {
            kpis,
            trace: self.recorder.trace().to_vec(),
            orders: self.orders.clone(),
            drivers: self.drivers.clone(),
            route_logs: self.route_logs.clone(),
        })
    }

    pub fn tick(&mut self) -> anyhow::Result<()> {
        for cb in self.callbacks.iter_mut() {
            cb.visit_tick(&self.now);
        }
        self.advance_drivers()?;
        self.inject_arrivals();
        if self.should_dispatch() {
            self.dispatch_round()?;
        }
        self.recorder
            .record_tick(self.now, &self.orders, &self.drivers);
        Ok(())
    }

    /// Process every stop whose ETA has passed: teleport to the stop,
    /// stamp the order, and charge the service time against the next
    /// leg's ETA. A driver may clear several stops in one tick.
    fn advance_drivers(&mut self) -> anyhow::Result<()> {
        let ids: Vec<DriverId> = self.drivers.keys().cloned().collect();
        for id in ids {
            loop {
                let driver = self.drivers.gets_mut(&id);
                if driver.status == DriverStatus::Idle {
                    break;
                }
                let Some(eta) = driver.eta_next_stop else {
                    break;
                };
                if eta > self.now {
                    break;
                }

                let stop = driver.route_stops[driver.current_stop_index].clone();
                driver.distance_km += self.oracle.distance(driver.position, stop.coord);
                driver.position = stop.coord;
                driver.current_stop_index += 1;

                match stop.kind {
                    StopKind::Pickup => {
                        self.orders.gets_mut(&stop.order_id).mark_picked_up(eta)?;
                        debug!("{id} picked up {} at {eta}", stop.order_id);
                    }
                    StopKind::Dropoff => {
                        let order = self.orders.gets_mut(&stop.order_id);
                        order.mark_delivered(eta)?;
                        driver.assigned_orders.retain(|oid| oid != &stop.order_id);
                        debug!("{id} delivered {} at {eta}", stop.order_id);
                        let order = self.orders.gets(&stop.order_id);
                        for cb in self.callbacks.iter_mut() {
                            cb.visit_delivery(order);
                        }
                    }
                }

                let driver = self.drivers.gets_mut(&id);
                self.route_logs.entry(id.clone()).or_default().push(RouteLogEntry {
                    time: eta,
                    stop: stop.clone(),
                });

                if driver.current_stop_index >= driver.route_stops.len() {
                    driver.status = DriverStatus::Idle;
                    driver.route_stops.clear();
                    driver.current_stop_index = 0;
                    driver.eta_next_stop = None;
                    debug!("{id} finished its route");
                } else {
                    let next = driver.route_stops[driver.current_stop_index].coord;
                    let travel = self.oracle.travel_time(stop.coord, next);
                    driver.eta_next_stop =
                        Some(eta + mins_f64(self.config.service_time_mins) + mins_f64(travel));
                    if driver.status == DriverStatus::Accruing && !driver.has_pending_pickup() {
                        driver.status = DriverStatus::Delivering;
                        debug!("{id} has all pickups aboard, route is now frozen");
                    }
                }
            }
        }
        Ok(())
    }

    fn inject_arrivals(&mut self) {
        for order_id in self.arrivals.pop_due(self.now) {
            debug!("order {order_id} created at {}", self.now);
            self.pending.push(order_id);
        }
    }

    /// Baseline dispatches every tick. The auction policies hold until
    /// the batch window elapses or a pending order turns urgent.
    fn should_dispatch(&self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        if self.policy_name == "baseline" {
            return true;
        }
        self.pending.iter().any(|id| {
            let order = self.orders.gets(id);
            order.age_mins(self.now) >= self.config.batch_window_mins || order.urgent(self.now)
        })
    }

    fn dispatch_round(&mut self) -> anyhow::Result<()> {
        let assignments = {
            let args = DispatchArgs {
                now: self.now,
                pending: &self.pending,
                orders: &self.orders,
                drivers: &self.drivers,
            };
            for cb in self.callbacks.iter_mut() {
                cb.visit_dispatch_input(&args);
            }
            let out = self.policy.dispatch(&args);
            for cb in self.callbacks.iter_mut() {
                cb.visit_dispatch_output(&out);
            }
            out
        };

        let mut newly_assigned: BTreeSet<OrderId> = BTreeSet::new();
        for assignment in &assignments {
            self.apply_assignment(assignment)
                .context("rejecting corrupt assignment")?;
            newly_assigned.extend(assignment.new_order_ids.iter().cloned());
        }
        self.pending.retain(|id| !newly_assigned.contains(id));

        if let Err(err) = self.check_world() {
            self.dump_diagnostics();
            return Err(err);
        }
        Ok(())
    }

    fn apply_assignment(&mut self, assignment: &Assignment) -> anyhow::Result<()> {
        let driver_id = &assignment.driver_id;
        ensure!(
            self.drivers.contains_key(driver_id),
            "assignment names unknown driver {driver_id}"
        );
        let unique: BTreeSet<&OrderId> = assignment.order_ids.iter().collect();
        ensure!(
            unique.len() == assignment.order_ids.len(),
            "assignment for {driver_id} repeats an order"
        );

        for order_id in &assignment.order_ids {
            ensure!(
                self.orders.contains_key(order_id),
                "assignment names unknown order {order_id}"
            );
            let order = self.orders.gets_mut(order_id);
            match order.status {
                OrderStatus::Pending | OrderStatus::Assigned => {
                    order.mark_assigned(driver_id)?;
                }
                OrderStatus::PickedUp => {
                    // Stops may be reordered, but a picked-up order can
                    // never change hands.
                    ensure!(
                        order.assigned_driver.as_ref() == Some(driver_id),
                        "picked-up order {order_id} appears in {driver_id}'s assignment"
                    );
                }
                OrderStatus::Delivered => {
                    bail!("delivered order {order_id} appears in {driver_id}'s assignment");
                }
            }
        }

        let now = self.now;
        let oracle = self.oracle.clone();
        let driver = self.drivers.gets_mut(driver_id);
        ensure!(
            assignment.order_ids.len() <= driver.capacity,
            "driver {driver_id} over capacity: {} > {}",
            assignment.order_ids.len(),
            driver.capacity
        );
        driver.assigned_orders = assignment.order_ids.clone();
        driver.route_stops = assignment.stops.clone();
        driver.current_stop_index = 0;
        driver.eta_next_stop = driver
            .route_stops
            .first()
            .map(|stop| now + mins_f64(oracle.travel_time(driver.position, stop.coord)));
        driver.status = if driver.has_pending_pickup() {
            DriverStatus::Accruing
        } else {
            DriverStatus::Delivering
        };
        self.recorder.record_assignment(driver_id);
        debug!(
            "assigned [{}] to {driver_id}{}",
            assignment
                .new_order_ids
                .iter()
                .map(|id| id.0.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            if assignment.fallback { " (fallback)" } else { "" }
        );
        Ok(())
    }

    /// Cross-entity consistency: capacity, unique ownership, pickup
    /// precedence, frozen delivering routes. Any violation is fatal.
    fn check_world(&self) -> anyhow::Result<()> {
        let mut owners: MapType<&OrderId, &DriverId> = MapType::new();
        for driver in self.drivers.values() {
            ensure!(
                driver.assigned_orders.len() <= driver.capacity,
                "driver {} exceeds capacity",
                driver.id
            );
            for order_id in &driver.assigned_orders {
                if let Some(previous) = owners.insert(order_id, &driver.id) {
                    bail!(
                        "order {order_id} is assigned to both {previous} and {}",
                        driver.id
                    );
                }
                let order = self
                    .orders
                    .get(order_id)
                    .with_context(|| format!("driver {} holds unknown order", driver.id))?;
                ensure!(
                    order.assigned_driver.as_ref() == Some(&driver.id),
                    "order {order_id} does not acknowledge owner {}",
                    driver.id
                );
                ensure!(
                    matches!(order.status, OrderStatus::Assigned | OrderStatus::PickedUp),
                    "order {order_id} held by {} has status {:?}",
                    driver.id,
                    order.status
                );
            }

            let remaining = driver.remaining_stops();
            match driver.status {
                DriverStatus::Idle => {
                    ensure!(
                        driver.assigned_orders.is_empty() && remaining.is_empty(),
                        "idle driver {} still has work",
                        driver.id
                    );
                }
                DriverStatus::Accruing => {
                    ensure!(
                        remaining.iter().any(|s| s.kind == StopKind::Pickup),
                        "accruing driver {} has no pickup left",
                        driver.id
                    );
                }
                DriverStatus::Delivering => {
                    ensure!(
                        remaining.iter().all(|s| s.kind == StopKind::Dropoff),
                        "delivering driver {} still routes a pickup",
                        driver.id
                    );
                }
            }
            for order_id in &driver.assigned_orders {
                let order = self.orders.gets(order_id);
                let pickup = remaining
                    .iter()
                    .position(|s| s.order_id == *order_id && s.kind == StopKind::Pickup);
                let dropoff = remaining
                    .iter()
                    .position(|s| s.order_id == *order_id && s.kind == StopKind::Dropoff);
                ensure!(
                    dropoff.is_some(),
                    "order {order_id} on {} has no dropoff stop",
                    driver.id
                );
                match order.status {
                    OrderStatus::Assigned => ensure!(
                        pickup.is_some() && pickup < dropoff,
                        "order {order_id} on {} misses pickup-before-dropoff",
                        driver.id
                    ),
                    OrderStatus::PickedUp => ensure!(
                        pickup.is_none(),
                        "picked-up order {order_id} on {} is routed for pickup again",
                        driver.id
                    ),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn dump_diagnostics(&self) {
        let dump = WorldDump {
            now: self.now,
            pending: &self.pending,
            orders: self.orders.values().collect(),
            drivers: self.drivers.values().collect(),
        };
        let path = "logs/state_corruption.json";
        match dump_json(path, &dump) {
            Ok(()) => error!("state corruption detected, world dumped to {path}"),
            Err(err) => error!("state corruption detected, dump failed: {err:#}"),
        }
    }
}
