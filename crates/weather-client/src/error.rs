//! Error types for the query client.

use std::time::Duration;

use weather_wire::{StatusCode, WireError};

/// Errors that can occur while fetching a reading.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The aggregator could not be reached.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// Address the connection was attempted on.
        addr: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The exchange did not complete in time.
    #[error("exchange timed out after {0:?}")]
    Timeout(Duration),

    /// Sending or receiving a message failed.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The aggregator answered with a server error.
    #[error("server error: {0}")]
    Server(StatusCode),

    /// The response body is not a JSON object.
    #[error("undecodable body: {0}")]
    Decode(#[from] serde_json::Error),
}
