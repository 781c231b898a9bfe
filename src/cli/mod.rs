//! CLI interface for split-trader
//!
//! Provides subcommands for:
//! - `run`: Start the paper trading loop
//! - `status`: Show persisted ledger state
//! - `config`: Show configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "split-trader")]
#[command(about = "Multi-stage split trading bot with a crash-safe position ledger")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the paper trading loop
    Run(RunArgs),
    /// Show persisted ledger state
    Status,
    /// Show configuration
    Config,
}
