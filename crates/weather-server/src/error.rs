//! Error types for the aggregation server.
//!
//! [`RequestError`] covers everything that can go wrong while handling a
//! single request and maps each failure onto the status code returned to
//! the peer. [`ServerError`] covers listener startup.

use weather_wire::StatusCode;

/// Errors raised while handling one request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The request could not be decoded or uses an unsupported method.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A header the method requires is absent or empty.
    #[error("missing required header: {0}")]
    MissingRequiredHeader(&'static str),

    /// The body is not a JSON object with a usable station id.
    #[error("malformed body: {0}")]
    MalformedBody(String),

    /// No reading is visible for the requested station.
    #[error("no data for station")]
    NoData,

    /// A stored document could not be serialized.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl RequestError {
    /// Status code sent back for this failure.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MalformedRequest(_) | Self::MissingRequiredHeader(_) | Self::MalformedBody(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NoData => StatusCode::NO_CONTENT,
            Self::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors that can occur when starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("bind failed on {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on.
        addr: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The listener failed after binding.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}
