//! Query client binary.
//!
//! Fetches the latest reading for a station once and prints it as
//! `key: value` lines.

use clap::Parser;
use tracing::info;
use weather_client::{QueryClient, parse_server_addr, render};
use weather_types::StationId;

/// Weather query client.
#[derive(Debug, Parser)]
#[command(name = "get-client")]
#[command(about = "Prints the latest weather reading held by the aggregation server")]
#[command(version)]
struct Args {
    /// Aggregator as `host:port`, optionally as `http://host:port/path`.
    #[arg(default_value = "localhost:4567", env = "GET_CLIENT_SERVER")]
    server: String,

    /// Station to query; the server picks one when omitted.
    station: Option<String>,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, env = "GET_CLIENT_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    weather_core::logging::init(&args.log_level, false);

    let client = QueryClient::new(parse_server_addr(&args.server));
    let station = args.station.map(StationId::from);
    info!(
        client = %client.id(),
        addr = client.addr(),
        station = station.as_ref().map(StationId::as_str),
        "querying aggregator"
    );

    match client.fetch(station.as_ref()).await {
        Some(document) => print!("{}", render(&document)),
        None => println!("No weather data available."),
    }
    Ok(())
}
