//! kpi-runner: headless batch runner for campaign and subscription KPIs.
//!
//! Usage:
//!   kpi-runner --data-dir ./data --as-of 2024-12-31
//!   kpi-runner --data-dir ./data --db kpi.db --config kpi.json --normalize --save
//!   kpi-runner --data-dir ./data --price-per-meal 7.5 --json

use anyhow::{Context, Result};
use campaign_kpi_core::{
    clock::AsOf,
    config::KpiConfig,
    kpi_engine::KpiEngine,
    loader::SnapshotLoader,
    report,
    store::KpiStore,
    validator::Validator,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let config_path = flag_value(&args, "--config");
    let price_override = flag_value(&args, "--price-per-meal");
    let normalize = args.iter().any(|a| a == "--normalize");
    let json = args.iter().any(|a| a == "--json");
    let save = args.iter().any(|a| a == "--save");
    let window = parse_arg(&args, "--window", 0usize);

    // The one place "today" is read; everything downstream takes the as-of date.
    let as_of = match flag_value(&args, "--as-of") {
        Some(value) => AsOf::parse(value)?,
        None => AsOf::new(chrono::Local::now().date_naive()),
    };

    let mut config = match config_path {
        Some(path) => KpiConfig::load(path)?,
        None => KpiConfig::default(),
    };
    if let Some(price) = price_override {
        let price: f64 = price
            .parse()
            .with_context(|| format!("--price-per-meal expects a number, got '{price}'"))?;
        config = config.with_price_per_meal(price);
    }
    if window > 0 {
        config.moving_average_window = window;
    }
    config.validate()?;

    if !json {
        println!("kpi-runner");
        println!("  data_dir:  {data_dir}");
        println!("  db:        {db}");
        println!("  as_of:     {as_of}");
        println!();
    }

    let store = KpiStore::open(db)?;
    store.migrate()?;

    let label = format!("{data_dir}@{as_of}");
    let loaded = SnapshotLoader::load_dir(&store, data_dir, &label)
        .with_context(|| format!("loading snapshot from {data_dir}"))?;
    log::info!(
        "loaded {} campaigns, {} events, {} subscriptions",
        loaded.campaigns,
        loaded.events,
        loaded.subscriptions
    );

    if normalize {
        let changed = Validator::new(&store).normalize_sentinels()?;
        for c in changed.iter().filter(|c| c.count > 0) {
            log::info!("{}.{}: {} empty cell(s) set to NULL", c.table, c.column, c.count);
        }
    }

    let engine = KpiEngine::new(&config, &store)?;
    let kpis = engine.report(as_of)?;

    if json {
        println!("{}", report::to_json(&kpis)?);
    } else {
        print!("{}", report::render_text(&kpis));
    }

    if save {
        engine.save_report(&kpis)?;
        if !json {
            println!();
            println!("report saved ({} stored)", store.report_count()?);
        }
    }

    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
