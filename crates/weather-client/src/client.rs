//! Query client.
//!
//! Each fetch stamps a `GET` with the client's clock, opens a fresh
//! connection, merges the server's greeting and response clocks, and
//! decodes the body. [`QueryClient::fetch`] reports every failure as an
//! absent result; [`QueryClient::try_fetch`] keeps the typed error.

use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::{debug, warn};
use weather_core::LamportClock;
use weather_types::{Document, SourceId, StationId};
use weather_wire::message::{LAMPORT_CLOCK, STATION_ID, WEATHER_PATH};
use weather_wire::{Method, Request, read_greeting, read_response, write_request};

use crate::error::ClientError;

/// Port assumed when an address names none.
pub const DEFAULT_PORT: u16 = 4567;

/// Default bound on one connect-and-exchange.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalize a server argument to `host:port`.
///
/// Accepts `host`, `host:port`, and either form prefixed with `http://`
/// and followed by a path.
pub fn parse_server_addr(arg: &str) -> String {
    let rest = arg
        .strip_prefix("http://")
        .or_else(|| arg.strip_prefix("https://"))
        .unwrap_or(arg);
    let authority = rest.split('/').next().unwrap_or(rest);
    let authority = if authority.is_empty() {
        "localhost"
    } else {
        authority
    };
    if authority.contains(':') {
        authority.to_owned()
    } else {
        format!("{authority}:{DEFAULT_PORT}")
    }
}

/// Fetches station readings from an aggregator.
#[derive(Debug)]
pub struct QueryClient {
    id: SourceId,
    clock: LamportClock,
    addr: String,
    exchange_timeout: Duration,
}

impl QueryClient {
    /// Create a client for the aggregator at `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            id: SourceId::generate(),
            clock: LamportClock::new(),
            addr: addr.into(),
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }

    /// Override the exchange timeout.
    #[must_use]
    pub fn with_timeout(mut self, exchange_timeout: Duration) -> Self {
        self.exchange_timeout = exchange_timeout;
        self
    }

    /// This client's identity.
    pub const fn id(&self) -> &SourceId {
        &self.id
    }

    /// This client's Lamport clock.
    pub const fn clock(&self) -> &LamportClock {
        &self.clock
    }

    /// The aggregator address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Fetch the latest reading, treating every failure as absent.
    pub async fn fetch(&self, station: Option<&StationId>) -> Option<Document> {
        match self.try_fetch(station).await {
            Ok(document) => document,
            Err(e) => {
                warn!(client = %self.id, addr = self.addr, error = %e, "fetch failed");
                None
            }
        }
    }

    /// Fetch the latest reading.
    ///
    /// `Ok(None)` means the server answered without a body (no data, or a
    /// rejected request). Server errors and undecodable bodies are errors.
    pub async fn try_fetch(
        &self,
        station: Option<&StationId>,
    ) -> Result<Option<Document>, ClientError> {
        let limit = self.exchange_timeout;
        match tokio::time::timeout(limit, self.exchange(station)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(limit)),
        }
    }

    async fn exchange(&self, station: Option<&StationId>) -> Result<Option<Document>, ClientError> {
        let mut request =
            Request::new(Method::Get, WEATHER_PATH).header(LAMPORT_CLOCK, self.clock.send());
        if let Some(station) = station.filter(|s| !s.is_empty()) {
            request = request.header(STATION_ID, station);
        }

        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let greeting = read_greeting(&mut reader).await?;
        self.clock.receive(greeting);

        write_request(&mut write_half, &request).await?;
        let response = read_response(&mut reader).await?;
        self.clock.receive(response.lamport_clock());
        debug!(
            status = response.status.as_u16(),
            clock = self.clock.current(),
            "response received"
        );

        if response.status.is_server_error() {
            return Err(ClientError::Server(response.status));
        }
        if response.body.is_empty() {
            return Ok(None);
        }
        let document: Document = serde_json::from_slice(&response.body)?;
        Ok(Some(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_addr_forms() {
        assert_eq!(parse_server_addr("localhost:4567"), "localhost:4567");
        assert_eq!(parse_server_addr("http://example.org:8080/weather.json"), "example.org:8080");
        assert_eq!(parse_server_addr("http://example.org"), "example.org:4567");
        assert_eq!(parse_server_addr("server"), "server:4567");
        assert_eq!(parse_server_addr(""), "localhost:4567");
    }

    #[test]
    fn clients_have_distinct_identities() {
        let a = QueryClient::new("localhost:4567");
        let b = QueryClient::new("localhost:4567");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clock().current(), 0);
    }
}
