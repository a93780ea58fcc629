use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use chrono::NaiveDate;

use crate::model::{
    driver::{Driver, DriverRecord},
    order::{Order, OrderRecord},
    InputSchemaError,
};

const ORDERS_SUFFIX: &str = "_orders.csv";
const COURIERS_SUFFIX: &str = "_couriers.csv";

/// A named `(orders, couriers)` CSV pair under the data directory.
#[derive(Debug, Clone)]
pub struct DatasetPair {
    pub name: String,
    pub orders_path: PathBuf,
    pub couriers_path: PathBuf,
}

/// Scan `data_dir` for `<name>_orders.csv` files with a matching
/// `<name>_couriers.csv`, sorted by name.
pub fn discover(data_dir: &Path) -> anyhow::Result<Vec<DatasetPair>> {
    let entries = fs::read_dir(data_dir)
        .map_err(|e| InputSchemaError(format!("{}: {e}", data_dir.display())))?;
    let mut pairs = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("reading {}", data_dir.display()))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(name) = file_name.strip_suffix(ORDERS_SUFFIX) else {
            continue;
        };
        let couriers_path = data_dir.join(format!("{name}{COURIERS_SUFFIX}"));
        if couriers_path.is_file() {
            pairs.push(DatasetPair {
                name: name.to_string(),
                orders_path: entry.path(),
                couriers_path,
            });
        }
    }
    pairs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(pairs)
}

pub fn find(data_dir: &Path, name: &str) -> anyhow::Result<DatasetPair> {
    discover(data_dir)?
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| {
            InputSchemaError(format!(
                "no dataset named {name:?} under {}",
                data_dir.display()
            ))
            .into()
        })
}

/// Load a pair into runtime entities, anchoring all times on `date`.
pub fn load(pair: &DatasetPair, date: NaiveDate) -> anyhow::Result<(Vec<Order>, Vec<Driver>)> {
    let orders = OrderRecord::read(&pair.orders_path)
        .with_context(|| format!("unable to load orders for dataset {}", pair.name))?
        .iter()
        .map(|r| Order::from_record(r, date))
        .collect();
    let drivers = DriverRecord::read(&pair.couriers_path)
        .with_context(|| format!("unable to load couriers for dataset {}", pair.name))?
        .iter()
        .map(|r| Driver::from_record(r, date))
        .collect();
    Ok((orders, drivers))
}
