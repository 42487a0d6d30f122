//! Content source binary.
//!
//! Reads the data file, then pushes it to the aggregator every push
//! interval until `Ctrl-C`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tracing::info;
use weather_source::{ContentSource, SourceConfig, load_document};

/// Weather content source.
#[derive(Debug, Parser)]
#[command(name = "content-source")]
#[command(about = "Pushes a station's weather document to the aggregation server")]
#[command(version)]
struct Args {
    /// Aggregator host.
    #[arg(default_value = "localhost", env = "CONTENT_SOURCE_HOST")]
    host: String,

    /// Aggregator port.
    #[arg(default_value_t = 4567, env = "CONTENT_SOURCE_PORT")]
    port: u16,

    /// Data file with one `key: value` pair per line.
    #[arg(default_value = "input.txt", env = "CONTENT_SOURCE_FILE")]
    data_file: PathBuf,

    /// Seconds between pushes.
    #[arg(long, default_value_t = 30)]
    interval_secs: u64,

    /// Seconds to wait before retrying a failed push.
    #[arg(long, default_value_t = 15)]
    retry_secs: u64,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, env = "CONTENT_SOURCE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

/// Timings are clamped to one second so a zero cannot spin the push loop.
fn source_config(args: &Args) -> SourceConfig {
    let mut config = SourceConfig::new(&args.host, args.port);
    config.push_interval = Duration::from_secs(args.interval_secs.max(1));
    config.retry_backoff = Duration::from_secs(args.retry_secs.max(1));
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    weather_core::logging::init(&args.log_level, args.json_logs);

    let document = load_document(&args.data_file)
        .await
        .with_context(|| format!("loading {}", args.data_file.display()))?;

    let source = ContentSource::new(source_config(&args), document);
    info!(
        source = %source.id(),
        data_file = %args.data_file.display(),
        "content-source starting"
    );
    source.start();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    source.shutdown();

    Ok(())
}
