//! Error types for the wire codec.

/// Errors that can occur while decoding or encoding a message.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The request start line is empty or has fewer than two tokens, or a
    /// header value required for framing is unusable.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The response start line or status code could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The connection did not open with a `LamportClock` greeting.
    #[error("missing clock greeting, got {0:?}")]
    MissingGreeting(String),

    /// A start or header line exceeded the line limit.
    #[error("line exceeds {limit} bytes")]
    LineTooLong {
        /// Maximum accepted line length.
        limit: usize,
    },

    /// The declared body length exceeded the body limit.
    #[error("body of {declared} bytes exceeds limit of {limit}")]
    BodyTooLarge {
        /// `Content-Length` announced by the peer.
        declared: usize,
        /// Maximum accepted body length.
        limit: usize,
    },

    /// The peer closed the connection before a complete message arrived.
    #[error("connection closed before a complete message was read")]
    ConnectionClosed,

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Whether the error came from the transport rather than the content.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionClosed)
    }
}
