use std::sync::Arc;

use anyhow::{Context, Result};
use celldb_core::models::{GpsFix, ServingCell, SignalMetrics};
use celldb_core::{CellDatabase, CellDbConfig, TracingEventSink};
use serde::Serialize;

use crate::cli::{Commands, GlobalArgs, RecordArgs};


pub(crate) fn run(global: &GlobalArgs, command: Commands) -> Result<()> {
    let config = resolve_config(global)?;
    match command {
        Commands::Config => print_json(&config),
        Commands::Init => with_database(config, |db| {
            print_json(&serde_json::json!({
                "status": "ok",
                "database_path": db.config().database_path,
            }))
        }),
        Commands::Record(args) => with_database(config, |db| {
            let (fix, cell) = record_input(args);
            print_json(&db.store_observation(&fix, Some(&cell))?)
        }),
        Commands::Cell(args) => with_database(config, |db| {
            print_json(&db.query_by_cell(args.cell_id, args.mcc, args.mnc, args.lac)?)
        }),
        Commands::Estimate(args) => with_database(config, |db| {
            print_json(&db.estimate(args.cell_id, args.mcc, args.mnc, args.lac)?)
        }),
        Commands::Stats => with_database(config, |db| print_json(&db.statistics()?)),
        Commands::Pending(args) => {
            with_database(config, |db| print_json(&db.query_uncontributed(args.limit)?))
        }
        Commands::Batch(args) => with_database(config, |db| {
            print_json(&db.prepare_contribution_batch(args.limit)?)
        }),
        Commands::Mark(args) => with_database(config, |db| {
            let newly_marked = db.mark_contributed(&args.ids)?;
            print_json(&serde_json::json!({
                "status": "ok",
                "requested": args.ids.len(),
                "newly_marked": newly_marked,
            }))
        }),
        Commands::Maintain => with_database(config, |db| print_json(&db.run_maintenance_now()?)),
    }
}

pub(crate) fn resolve_config(global: &GlobalArgs) -> Result<CellDbConfig> {
    let base = match &global.config {
        Some(path) => CellDbConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CellDbConfig::default(),
    };
    let mut config = base.with_env_overrides();
    if let Some(db) = &global.db {
        config.database_path = db.clone();
    }
    config.validate()?;
    Ok(config)
}

fn with_database(
    config: CellDbConfig,
    action: impl FnOnce(&CellDatabase) -> Result<()>,
) -> Result<()> {
    let db = CellDatabase::open_with_sink(config, Arc::new(TracingEventSink))
        .context("failed to open cell observation database")?;
    let result = action(&db);
    db.close().context("failed to close cell observation database")?;
    result
}

fn record_input(args: RecordArgs) -> (GpsFix, ServingCell) {
    let fix = GpsFix::new(args.lat, args.lon, args.accuracy, args.source);
    let cell = ServingCell::new(args.cell_id, args.mcc, args.mnc, args.tac, args.technology)
        .with_signal(SignalMetrics {
            rssi: args.rssi,
            rsrp: args.rsrp,
            rsrq: args.rsrq,
            sinr: args.sinr,
        });
    (fix, cell)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
