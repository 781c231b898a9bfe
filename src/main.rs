use clap::Parser;
use split_trader::cli::{Cli, Commands};
use split_trader::config::Config;
use split_trader::ledger::LedgerStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        toml::from_str(include_str!("../config.toml.example")).expect("Invalid default config")
    });

    // Initialize telemetry
    split_trader::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting paper trading mode");
            args.execute(config).await?;
        }
        Commands::Status => {
            let store = LedgerStore::new(&config.ledger);
            let ledgers = store.load(&config.instruments)?;
            println!("split-trader status");
            for inst in &config.instruments {
                let Some(ledger) = ledgers.get(&inst.code) else {
                    continue;
                };
                println!(
                    "  {} {}: {} open stage(s), {} share(s), exposure {}, realized P&L {}",
                    ledger.code,
                    ledger.name,
                    ledger.open_stage_count(),
                    ledger.total_quantity(),
                    ledger.total_exposure(),
                    ledger.realized_pnl
                );
            }
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Instruments: {}", config.instruments.len());
            println!("  Ledger dir: {}", config.ledger.data_dir.display());
            println!("  Max stages: {}", config.ledger.max_stages);
            println!("  Initial budget: {}", config.budget.initial_budget);
            println!(
                "  Cycle: every {}s, order timeout {}s",
                config.cycle.interval_secs, config.cycle.order_timeout_secs
            );
        }
    }

    Ok(())
}
