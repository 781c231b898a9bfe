//! Run command implementation

use crate::broker::{LogSink, PaperBroker};
use crate::config::Config;
use crate::cycle::{Collaborators, Orchestrator};
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunArgs {
    /// Wire the paper broker into the orchestrator and run until stopped
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let broker = PaperBroker::new();
        let deps = Collaborators {
            market_data: Arc::new(broker.clone()),
            valuation: Arc::new(broker.clone()),
            conditions: Arc::new(broker.clone()),
            executor: Arc::new(broker),
            notifier: Arc::new(LogSink),
        };
        let mut orchestrator = Orchestrator::new(config, deps)?;
        tracing::info!("starting paper trading loop");
        orchestrator.run().await
    }
}
