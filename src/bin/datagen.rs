use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{Duration, NaiveTime};
use clap::Parser;
use rand::{rngs::SmallRng, seq::IndexedRandom, Rng, SeedableRng};

use lastmile::model::{
    driver::{DriverId, DriverRecord, VehicleClass},
    order::{OrderId, OrderRecord},
};

/// Doha city center; order and courier locations scatter around it.
const CITY_CENTER: (f64, f64) = (25.2854, 51.5310);
/// Coordinate jitter, roughly a 9 km box at this latitude.
const SPREAD_DEG: f64 = 0.04;

/// Generate a seeded synthetic rush-hour dataset pair.
#[derive(Debug, Parser)]
struct Cli {
    #[arg(long, default_value = "data")]
    out_dir: PathBuf,
    #[arg(long, default_value = "synthetic")]
    name: String,
    #[arg(long, default_value_t = 60)]
    orders: usize,
    #[arg(long, default_value_t = 12)]
    drivers: usize,
    #[arg(long, default_value_t = 727)]
    seed: u64,
}

fn scatter(rng: &mut SmallRng) -> (f64, f64) {
    (
        CITY_CENTER.0 + rng.random_range(-SPREAD_DEG..SPREAD_DEG),
        CITY_CENTER.1 + rng.random_range(-SPREAD_DEG..SPREAD_DEG),
    )
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let mut rng = SmallRng::seed_from_u64(cli.seed);
    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("unable to create {}", cli.out_dir.display()))?;
    let shift_start = NaiveTime::from_hms_opt(17, 0, 0).expect("valid time");

    let orders_path = cli.out_dir.join(format!("{}_orders.csv", cli.name));
    let mut orders = csv::Writer::from_path(&orders_path)
        .with_context(|| format!("unable to create {}", orders_path.display()))?;
    for i in 0..cli.orders {
        let created = shift_start + Duration::minutes(rng.random_range(0..280));
        let estimated = rng.random_range(20..35);
        let (pickup_lat, pickup_lng) = scatter(&mut rng);
        let (dropoff_lat, dropoff_lng) = scatter(&mut rng);
        orders.serialize(OrderRecord {
            order_id: OrderId(format!("O_{i}")),
            pickup_lat,
            pickup_lng,
            dropoff_lat,
            dropoff_lng,
            created_time: created,
            deadline: created + Duration::minutes(estimated + rng.random_range(10..20)),
            estimated_delivery_time_min: estimated,
        })?;
    }
    orders.flush()?;

    let couriers_path = cli.out_dir.join(format!("{}_couriers.csv", cli.name));
    let mut couriers = csv::Writer::from_path(&couriers_path)
        .with_context(|| format!("unable to create {}", couriers_path.display()))?;
    // Motorbikes dominate a delivery fleet.
    let classes = [
        VehicleClass::Motorbike,
        VehicleClass::Motorbike,
        VehicleClass::Bike,
        VehicleClass::Car,
    ];
    for i in 0..cli.drivers {
        let (start_lat, start_lng) = scatter(&mut rng);
        couriers.serialize(DriverRecord {
            driver_id: DriverId(format!("D_{i}")),
            start_lat,
            start_lng,
            vehicle_type: *classes.choose(&mut rng).expect("non-empty"),
            capacity: 2,
            available_from: shift_start + Duration::minutes(rng.random_range(0..45)),
        })?;
    }
    couriers.flush()?;

    println!(
        "wrote {} orders to {} and {} couriers to {}",
        cli.orders,
        orders_path.display(),
        cli.drivers,
        couriers_path.display()
    );
    Ok(())
}
