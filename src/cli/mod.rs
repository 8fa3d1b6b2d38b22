//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rwcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "check", about = "Validate a configuration file")]
    Check(CheckArgs),

    #[command(name = "simulate", about = "Run concurrent writers and readers against a region")]
    Simulate(SimulateArgs),

    #[command(name = "metrics", about = "Print collected metrics")]
    Metrics,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[arg(short, long, help = "Path to the TOML configuration")]
    pub config: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    #[arg(short, long, help = "Path to the TOML configuration")]
    pub config: Option<PathBuf>,

    #[arg(short, long, default_value = "simulation", help = "Region name")]
    pub region: String,

    #[arg(short, long, default_value_t = 8, help = "Concurrent writers")]
    pub writers: usize,

    #[arg(short, long, default_value_t = 16, help = "Distinct keys")]
    pub keys: usize,

    #[arg(long, default_value_t = 200, help = "Rounds per writer")]
    pub rounds: usize,

    #[arg(long, default_value_t = 5, help = "Roll back every Nth transaction (0 = never)")]
    pub rollback_every: usize,
}

mod check;
mod metrics;
mod simulate;

pub use simulate::{run_simulation, SimulationReport};

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::telemetry::init_tracing("rwcache", "warn");

    match &cli.command {
        Commands::Check(args) => check::execute(args),
        Commands::Simulate(args) => simulate::execute(args).await,
        Commands::Metrics => metrics::execute(),
    }
}
