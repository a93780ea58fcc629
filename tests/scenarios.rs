use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use lastmile::{
    config::SimConfig,
    dispatch::{self, adaptive::AdaptivePolicy, sequential::SequentialPolicy, Auction,
        DispatchArgs, DispatchPolicy},
    geo::Coordinate,
    model::{
        driver::{Driver, DriverId, DriverMap, DriverStatus, VehicleClass},
        order::{Order, OrderId, OrderMap, OrderStatus},
        stop::Stop,
        Map as _,
    },
    oracle::build_oracle,
    simulation::simulator::{RunResult, Simulator},
};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    date().and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
}

fn order(id: &str, pickup: Coordinate, dropoff: Coordinate, created: NaiveDateTime) -> Order {
    Order {
        id: OrderId(id.into()),
        pickup,
        dropoff,
        created_at: created,
        deadline: created + Duration::minutes(45),
        estimated_duration_mins: 20,
        status: OrderStatus::Pending,
        pickup_time: None,
        dropoff_time: None,
        assigned_driver: None,
    }
}

fn driver(id: &str, position: Coordinate, available: NaiveDateTime) -> Driver {
    Driver {
        id: DriverId(id.into()),
        origin: position,
        vehicle_class: VehicleClass::Motorbike,
        capacity: 2,
        available_from: available,
        position,
        status: DriverStatus::Idle,
        assigned_orders: Vec::new(),
        route_stops: Vec::new(),
        current_stop_index: 0,
        eta_next_stop: None,
        distance_km: 0.0,
    }
}

fn build_sim(policy: &str, orders: Vec<Order>, drivers: Vec<Driver>) -> Simulator {
    let config = SimConfig::default();
    let oracle = build_oracle(&config);
    let auction = Arc::new(Auction::new(config.clone(), oracle.clone()));
    let policy = dispatch::build_policy(policy, auction).unwrap();
    Simulator::new(config, date(), oracle, orders, drivers, policy, Vec::new())
}

fn run_policy(policy: &str, orders: Vec<Order>, drivers: Vec<Driver>) -> RunResult {
    build_sim(policy, orders, drivers).run().unwrap()
}

fn single_order_world() -> (Vec<Order>, Vec<Driver>) {
    let o = order(
        "O_1",
        Coordinate::new(25.290, 51.535),
        Coordinate::new(25.300, 51.545),
        at(17, 0),
    );
    let d = driver("D_1", Coordinate::new(25.285, 51.531), at(17, 0));
    (vec![o], vec![d])
}

/// Shared pickup, dropoffs 2 km and 2.1 km north, one driver at the
/// pickup and a second 3 km away.
fn colocated_pair_world() -> (Vec<Order>, Vec<Driver>) {
    let pickup = Coordinate::new(25.2854, 51.5310);
    let o1 = order("O_1", pickup, Coordinate::new(25.3034, 51.5310), at(17, 0));
    let o2 = order("O_2", pickup, Coordinate::new(25.3043, 51.5310), at(17, 0));
    let d1 = driver("D_1", pickup, at(17, 0));
    let d2 = driver("D_2", Coordinate::new(25.2584, 51.5310), at(17, 0));
    (vec![o1, o2], vec![d1, d2])
}

#[test]
fn single_order_single_driver_under_every_policy() {
    for policy in dispatch::POLICY_NAMES {
        let (orders, drivers) = single_order_world();
        let result = run_policy(policy, orders, drivers);

        let o = result.orders.gets(&OrderId("O_1".into()));
        assert_eq!(o.status, OrderStatus::Delivered, "policy {policy}");
        assert_eq!(o.assigned_driver, Some(DriverId("D_1".into())));
        assert!(
            o.dropoff_time.unwrap() < at(17, 30),
            "policy {policy} delivered at {:?}",
            o.dropoff_time
        );
        assert!(o.pickup_time.unwrap() <= o.dropoff_time.unwrap());
        assert_eq!(result.kpis.drivers_activated, 1, "policy {policy}");
        assert!(result.kpis.total_distance_km > 0.0);

        let log = &result.route_logs[&DriverId("D_1".into())];
        assert_eq!(log.len(), 2);
    }
}

#[test]
fn auction_policies_bundle_colocated_orders_baseline_does_not() {
    for policy in ["sequential", "combinatorial"] {
        let (orders, drivers) = colocated_pair_world();
        let result = run_policy(policy, orders, drivers);
        assert_eq!(result.kpis.drivers_activated, 1, "policy {policy}");
        assert_eq!(result.kpis.delivered, 2, "policy {policy}");
        for id in ["O_1", "O_2"] {
            assert_eq!(
                result.orders.gets(&OrderId(id.into())).assigned_driver,
                Some(DriverId("D_1".into())),
                "policy {policy}"
            );
        }
    }

    let (orders, drivers) = colocated_pair_world();
    let result = run_policy("baseline", orders, drivers);
    assert_eq!(result.kpis.drivers_activated, 2);
    assert_eq!(result.kpis.delivered, 2);
    assert_eq!(
        result.orders.gets(&OrderId("O_1".into())).assigned_driver,
        Some(DriverId("D_1".into()))
    );
    assert_eq!(
        result.orders.gets(&OrderId("O_2".into())).assigned_driver,
        Some(DriverId("D_2".into()))
    );
}

#[test]
fn delivery_floor_rejects_distant_bundle() {
    // Pickups ~25 km apart: any single-driver route over both orders
    // projects one dropoff past the floor, so the pair must split.
    let p1 = Coordinate::new(25.20, 51.40);
    let p2 = Coordinate::new(25.425, 51.40);
    let o1 = order("O_1", p1, Coordinate::new(25.209, 51.40), at(17, 0));
    let o2 = order("O_2", p2, Coordinate::new(25.434, 51.40), at(17, 0));
    let d1 = driver("D_1", p1, at(17, 0));
    let d2 = driver("D_2", p2, at(17, 0));
    let result = run_policy("combinatorial", vec![o1, o2], vec![d1, d2]);

    assert_eq!(result.kpis.drivers_activated, 2);
    assert_eq!(result.kpis.delivered, 2);
    for d in result.drivers.values() {
        assert!(d.distance_km < 5.0, "driver {} crossed town", d.id);
    }
    assert_eq!(
        result.orders.gets(&OrderId("O_1".into())).assigned_driver,
        Some(DriverId("D_1".into()))
    );
    assert_eq!(
        result.orders.gets(&OrderId("O_2".into())).assigned_driver,
        Some(DriverId("D_2".into()))
    );
}

#[test]
fn marginal_cost_favors_accruing_driver() {
    let p = Coordinate::new(25.30, 51.50);
    let q = Coordinate::new(25.31, 51.51);

    let mut o1 = order("O_1", p, q, at(16, 55));
    o1.status = OrderStatus::Assigned;
    o1.assigned_driver = Some(DriverId("D_1".into()));
    let o_new = order("O_2", p, Coordinate::new(25.312, 51.512), at(17, 0));

    let mut d1 = driver("D_1", Coordinate::new(25.295, 51.495), at(17, 0));
    d1.status = DriverStatus::Accruing;
    d1.assigned_orders = vec![o1.id.clone()];
    d1.route_stops = vec![Stop::pickup(p, o1.id.clone()), Stop::dropoff(q, o1.id.clone())];
    // Idle competitor ~4 km from the new pickup.
    let d2 = driver("D_2", Coordinate::new(25.336, 51.50), at(17, 0));

    let orders: OrderMap = [(o1.id.clone(), o1), (o_new.id.clone(), o_new.clone())]
        .into_iter()
        .collect();
    let drivers: DriverMap = [(d1.id.clone(), d1), (d2.id.clone(), d2)]
        .into_iter()
        .collect();

    let config = SimConfig::default();
    let oracle = build_oracle(&config);
    let auction = Arc::new(Auction::new(config, oracle));
    let mut policy = SequentialPolicy::new(auction);
    let pending = vec![o_new.id.clone()];
    let out = policy.dispatch(&DispatchArgs {
        now: at(17, 1),
        pending: &pending,
        orders: &orders,
        drivers: &drivers,
    });

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].driver_id, DriverId("D_1".into()));
    assert_eq!(out[0].order_ids.len(), 2);
    assert!(!out[0].fallback);
}

#[test]
fn adaptive_switches_on_arrival_rate() {
    use lastmile::dispatch::adaptive::AuctionMode;

    let config = SimConfig::default();
    let oracle = build_oracle(&config);
    let policy = AdaptivePolicy::new(Arc::new(Auction::new(config, oracle)));
    let drivers = DriverMap::default();

    // 12 orders over five minutes: 2.4/min, combinatorial territory.
    let burst: OrderMap = (0..12)
        .map(|i| {
            let o = order(
                &format!("O_{i}"),
                Coordinate::new(25.29, 51.53),
                Coordinate::new(25.30, 51.54),
                at(17, [0, 0, 0, 1, 1, 1, 2, 2, 3, 3, 4, 4][i]),
            );
            (o.id.clone(), o)
        })
        .collect();
    let pending: Vec<OrderId> = burst.keys().cloned().collect();
    let args = DispatchArgs {
        now: at(17, 4),
        pending: &pending,
        orders: &burst,
        drivers: &drivers,
    };
    assert!((policy.arrival_rate(&args) - 2.4).abs() < 1e-9);
    assert_eq!(policy.pick_mode(&args), AuctionMode::Combinatorial);

    // 3 orders over five minutes: 0.6/min, back to sequential.
    let sparse: OrderMap = [10u32, 12, 14]
        .into_iter()
        .map(|m| {
            let o = order(
                &format!("O_{m}"),
                Coordinate::new(25.29, 51.53),
                Coordinate::new(25.30, 51.54),
                at(17, m),
            );
            (o.id.clone(), o)
        })
        .collect();
    let pending: Vec<OrderId> = sparse.keys().cloned().collect();
    let args = DispatchArgs {
        now: at(17, 14),
        pending: &pending,
        orders: &sparse,
        drivers: &drivers,
    };
    assert!((policy.arrival_rate(&args) - 0.6).abs() < 1e-9);
    assert_eq!(policy.pick_mode(&args), AuctionMode::Sequential);
}

#[test]
fn saturated_driver_never_bids_nearest_idle_wins() {
    let p = Coordinate::new(25.30, 51.50);
    let mut o1 = order("O_1", p, Coordinate::new(25.31, 51.51), at(16, 50));
    let mut o2 = order("O_2", p, Coordinate::new(25.32, 51.52), at(16, 50));
    let mut d_full = driver("D_full", p, at(17, 0));
    for o in [&mut o1, &mut o2] {
        o.status = OrderStatus::Assigned;
        o.assigned_driver = Some(d_full.id.clone());
        d_full.assigned_orders.push(o.id.clone());
        d_full
            .route_stops
            .push(Stop::pickup(o.pickup, o.id.clone()));
        d_full
            .route_stops
            .push(Stop::dropoff(o.dropoff, o.id.clone()));
    }
    d_full.status = DriverStatus::Accruing;

    let o_new = order("O_3", p, Coordinate::new(25.305, 51.505), at(17, 0));
    // Two idle drivers ~10 km and ~13 km out.
    let d_near = driver("D_near", Coordinate::new(25.39, 51.50), at(17, 0));
    let d_far = driver("D_far", Coordinate::new(25.417, 51.50), at(17, 0));

    let orders: OrderMap = [o1, o2, o_new.clone()]
        .into_iter()
        .map(|o| (o.id.clone(), o))
        .collect();
    let drivers: DriverMap = [d_full, d_near, d_far]
        .into_iter()
        .map(|d| (d.id.clone(), d))
        .collect();

    let config = SimConfig::default();
    let oracle = build_oracle(&config);
    let mut policy = SequentialPolicy::new(Arc::new(Auction::new(config, oracle)));
    let pending = vec![o_new.id.clone()];
    let out = policy.dispatch(&DispatchArgs {
        now: at(17, 1),
        pending: &pending,
        orders: &orders,
        drivers: &drivers,
    });

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].driver_id, DriverId("D_near".into()));
}

#[test]
fn all_bids_infinite_falls_back_to_nearest_with_capacity() {
    // The only driver is ~50 km out, far past the delivery floor.
    let o = order(
        "O_1",
        Coordinate::new(25.30, 51.50),
        Coordinate::new(25.31, 51.51),
        at(17, 0),
    );
    let d = driver("D_1", Coordinate::new(25.75, 51.50), at(17, 0));

    let orders: OrderMap = [(o.id.clone(), o.clone())].into_iter().collect();
    let drivers: DriverMap = [(d.id.clone(), d)].into_iter().collect();
    let config = SimConfig::default();
    let oracle = build_oracle(&config);
    let mut policy = SequentialPolicy::new(Arc::new(Auction::new(config, oracle)));
    let pending = vec![o.id.clone()];
    let out = policy.dispatch(&DispatchArgs {
        now: at(17, 1),
        pending: &pending,
        orders: &orders,
        drivers: &drivers,
    });

    assert_eq!(out.len(), 1);
    assert!(out[0].fallback);
    assert!(out[0].cost.is_none());
    assert_eq!(out[0].driver_id, DriverId("D_1".into()));

    // End to end the order still ships, just late.
    let (orders, drivers) = (
        vec![order(
            "O_1",
            Coordinate::new(25.30, 51.50),
            Coordinate::new(25.31, 51.51),
            at(17, 0),
        )],
        vec![driver("D_1", Coordinate::new(25.75, 51.50), at(17, 0))],
    );
    let result = run_policy("sequential", orders, drivers);
    let o = result.orders.gets(&OrderId("O_1".into()));
    assert_eq!(o.status, OrderStatus::Delivered);
    assert!(result.kpis.late_over_60 >= 1);
}

#[test]
fn urgent_order_flushes_the_batch_early() {
    let make_world = |deadline_offset: i64| {
        let mut o = order(
            "O_1",
            Coordinate::new(25.290, 51.535),
            Coordinate::new(25.300, 51.545),
            at(17, 0),
        );
        o.deadline = at(17, 0) + Duration::minutes(deadline_offset);
        o.estimated_duration_mins = 30;
        (
            vec![o],
            vec![driver("D_1", Coordinate::new(25.285, 51.531), at(17, 0))],
        )
    };

    // Tight deadline: inside a third of the estimate, dispatched at 17:00.
    let (orders, drivers) = make_world(8);
    let urgent = run_policy("sequential", orders, drivers);
    // Comfortable deadline: waits out the one-minute batch window.
    let (orders, drivers) = make_world(45);
    let relaxed = run_policy("sequential", orders, drivers);

    let urgent_pickup = urgent.orders.gets(&OrderId("O_1".into())).pickup_time.unwrap();
    let relaxed_pickup = relaxed.orders.gets(&OrderId("O_1".into())).pickup_time.unwrap();
    assert!(urgent_pickup < relaxed_pickup);
}

#[test]
fn quiescent_ticks_do_not_mutate_state() {
    let (orders, drivers) = single_order_world();
    let mut sim = build_sim("combinatorial", orders, drivers);
    let result = sim.run().unwrap();
    assert!(sim.all_delivered());

    let orders_before = serde_json::to_string(&sim.orders().values().collect::<Vec<_>>()).unwrap();
    let drivers_before =
        serde_json::to_string(&sim.drivers().values().collect::<Vec<_>>()).unwrap();
    for _ in 0..5 {
        sim.tick().unwrap();
    }
    let orders_after = serde_json::to_string(&sim.orders().values().collect::<Vec<_>>()).unwrap();
    let drivers_after =
        serde_json::to_string(&sim.drivers().values().collect::<Vec<_>>()).unwrap();
    assert_eq!(orders_before, orders_after);
    assert_eq!(drivers_before, drivers_after);
    drop(result);
}

#[test]
fn identical_inputs_yield_identical_kpis() {
    for policy in dispatch::POLICY_NAMES {
        let (orders, drivers) = colocated_pair_world();
        let first = run_policy(policy, orders.clone(), drivers.clone());
        let second = run_policy(policy, orders, drivers);
        assert_eq!(
            serde_json::to_string(&first.kpis).unwrap(),
            serde_json::to_string(&second.kpis).unwrap(),
            "policy {policy}"
        );
    }
}

#[test]
fn baseline_never_activates_fewer_drivers_than_combinatorial() {
    let (orders, drivers) = colocated_pair_world();
    let baseline = run_policy("baseline", orders.clone(), drivers.clone());
    let combinatorial = run_policy("combinatorial", orders, drivers);
    assert!(baseline.kpis.drivers_activated >= combinatorial.kpis.drivers_activated);
}

#[test]
fn capacity_and_precedence_hold_in_final_state() {
    let (orders, drivers) = colocated_pair_world();
    let result = run_policy("combinatorial", orders, drivers);
    for d in result.drivers.values() {
        assert!(d.assigned_orders.len() <= d.capacity);
    }
    for o in result.orders.values() {
        if let (Some(p), Some(dt)) = (o.pickup_time, o.dropoff_time) {
            assert!(p <= dt);
        }
    }
    // Fleet distance equals the per-driver sum.
    let sum: f64 = result.drivers.values().map(|d| d.distance_km).sum();
    assert!((sum - result.kpis.total_distance_km).abs() < 1e-9);
}
