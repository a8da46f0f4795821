use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod args;


pub use args::{CellArgs, LimitArgs, MarkArgs, RecordArgs};

#[derive(Debug, Parser)]
#[command(name = "celldb")]
#[command(about = "Local GPS + cell tower observation database", version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Database file; overrides the config file and CELLDB_DATABASE_PATH.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// TOML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Init,
    Record(RecordArgs),
    Cell(CellArgs),
    Estimate(CellArgs),
    Stats,
    Pending(LimitArgs),
    Batch(LimitArgs),
    Mark(MarkArgs),
    Maintain,
    Config,
}
