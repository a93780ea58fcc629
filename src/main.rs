use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Instant};

use clap::{Parser, ValueEnum};
use humantime::format_duration;
use tracing::{error, info};

use lastmile::{
    callbacks::{dump_json, log_dispatch::LogDispatchCallback},
    config::SimConfig,
    datasets,
    dispatch::{self, Auction},
    kpi::render_table,
    model::{InputSchemaError, Map as _},
    oracle::build_oracle,
    simulation::{callback::SimulationCallback, simulator::Simulator},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Strategy {
    Baseline,
    Sequential,
    Combinatorial,
    Adaptive,
    All,
}

impl Strategy {
    fn policy_names(self) -> Vec<&'static str> {
        match self {
            Strategy::Baseline => vec!["baseline"],
            Strategy::Sequential => vec!["sequential"],
            Strategy::Combinatorial => vec!["combinatorial"],
            Strategy::Adaptive => vec!["adaptive"],
            Strategy::All => dispatch::POLICY_NAMES.to_vec(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Last-mile delivery dispatch simulator")]
struct Cli {
    /// Dataset name, selecting a `<name>_orders.csv` /
    /// `<name>_couriers.csv` pair under the data directory.
    #[arg(long, required_unless_present = "list_datasets")]
    dataset: Option<String>,

    /// Dispatch strategy to simulate.
    #[arg(long, value_enum, default_value_t = Strategy::All)]
    strategy: Strategy,

    /// List known dataset pairs and exit.
    #[arg(long)]
    list_datasets: bool,

    /// Directory containing dataset CSV pairs.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Write final per-order states as JSON (one file per strategy).
    #[arg(long)]
    order_log: Option<PathBuf>,

    /// Dump every auction round under logs/.
    #[arg(long)]
    log_dispatch: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.downcast_ref::<InputSchemaError>().is_some() => {
            error!("{err:#}");
            ExitCode::from(1)
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(3)
        }
    }
}

fn order_log_path(base: &PathBuf, strategy: &str, multiple: bool) -> PathBuf {
    if !multiple {
        return base.clone();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "orders".to_string());
    let file = match base.extension() {
        Some(ext) => format!("{stem}_{strategy}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{strategy}"),
    };
    base.with_file_name(file)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.list_datasets {
        for pair in datasets::discover(&cli.data_dir)? {
            println!("{}", pair.name);
        }
        return Ok(());
    }

    let name = cli.dataset.expect("enforced by clap");
    let pair = datasets::find(&cli.data_dir, &name)?;
    let date = chrono::Local::now().date_naive();
    let (orders, drivers) = datasets::load(&pair, date)?;
    info!(
        "dataset {name}: {} orders, {} drivers",
        orders.len(),
        drivers.len()
    );

    let config = SimConfig::default();
    let oracle = build_oracle(&config);
    let policy_names = cli.strategy.policy_names();
    let multiple = policy_names.len() > 1;

    let mut rows = Vec::new();
    for policy_name in policy_names {
        let auction = Arc::new(Auction::new(config.clone(), oracle.clone()));
        let policy = dispatch::build_policy(policy_name, auction).expect("known policy name");
        let mut callbacks: Vec<Box<dyn SimulationCallback>> = Vec::new();
        if cli.log_dispatch {
            callbacks.push(Box::new(LogDispatchCallback::new(format!(
                "{name}_{policy_name}"
            ))));
        }
        let mut sim = Simulator::new(
            config.clone(),
            date,
            oracle.clone(),
            orders.clone(),
            drivers.clone(),
            policy,
            callbacks,
        );
        let started = Instant::now();
        let result = sim.run()?;
        info!(
            "{policy_name} finished in {}",
            format_duration(started.elapsed())
        );

        if let Some(base) = &cli.order_log {
            let path = order_log_path(base, policy_name, multiple);
            let final_orders: Vec<_> = result.orders.values().collect();
            dump_json(&path, &final_orders)?;
            info!("per-order log written to {}", path.display());
        }
        rows.push(result.kpis);
    }

    print!("{}", render_table(&rows));
    Ok(())
}
