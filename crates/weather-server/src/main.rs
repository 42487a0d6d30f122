//! Aggregation server binary.
//!
//! # Startup Sequence
//!
//! 1. Parse command-line arguments
//! 2. Load `aggregator.yaml` (or defaults) and apply overrides
//! 3. Initialize structured logging
//! 4. Restore the content store from the primary or bootstrap snapshot
//! 5. Serve until `Ctrl-C`, then shut down gracefully

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use tracing::info;
use weather_core::config::AggregatorConfig;
use weather_server::AggregationServer;

/// Weather aggregation server.
#[derive(Debug, Parser)]
#[command(name = "aggregation-server")]
#[command(about = "Aggregates weather readings and answers station queries")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file).
    port: Option<u16>,

    /// YAML configuration file.
    #[arg(long, short, env = "AGGREGATOR_CONFIG", default_value = "aggregator.yaml")]
    config: PathBuf,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AggregatorConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.logging.json |= args.json_logs;

    weather_core::logging::init(&config.logging.level, config.logging.json);
    info!(
        config = %args.config.display(),
        port = config.server.port,
        snapshot = %config.persistence.snapshot_path.display(),
        persist_interval_secs = config.persistence.interval_secs,
        evict_interval_secs = config.eviction.interval_secs,
        staleness_secs = config.eviction.staleness_secs,
        "aggregation-server starting"
    );

    let server = AggregationServer::bootstrap(config).await;
    let handle = server.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    handle.shutdown().await;

    Ok(())
}
