//! Structured logging setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging for the trading loop
///
/// The configured level applies to this crate and its dependencies, except
/// that the metrics exporter's HTTP stack is held at `warn` so connection
/// chatter does not drown out cycle logs. `RUST_LOG` overrides everything.
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let default_directives = format!("{level},hyper=warn,h2=warn,tower=warn");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .map_err(|e| anyhow::anyhow!("logging init failed: {e}"))?;

    Ok(())
}
