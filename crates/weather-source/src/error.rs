//! Error types for the content source.

use std::path::PathBuf;
use std::time::Duration;

use weather_wire::WireError;

/// Errors that can occur while pushing a document.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
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

    /// The document could not be serialized.
    #[error("document encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl SourceError {
    /// Whether the failure is a transport failure worth retrying.
    pub const fn is_transport(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::Timeout(_) => true,
            Self::Wire(e) => e.is_transport(),
            Self::Encoding(_) => false,
        }
    }
}

/// Errors that can occur while loading a data file.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A non-blank line has no `:` separator.
    #[error("line {line}: expected `key: value`, got {text:?}")]
    MalformedLine {
        /// One-based line number.
        line: usize,
        /// The offending line.
        text: String,
    },

    /// The document has no usable `id` field.
    #[error("document has no \"id\" field")]
    MissingId,
}
