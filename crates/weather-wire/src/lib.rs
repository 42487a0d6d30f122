//! Wire protocol shared by the aggregation server, content sources, and
//! query clients.
//!
//! A message is a start line, CRLF-terminated header lines, a blank line,
//! and exactly `Content-Length` bytes of body:
//!
//! ```text
//! PUT /weather.json HTTP/1.1\r\n
//! ServerID: 6f1c...\r\n
//! LamportClock: 12\r\n
//! Content-Type: application/json\r\n
//! Content-Length: 27\r\n
//! \r\n
//! {"id":"IDS60901","t":"13"}
//! ```
//!
//! Before reading a request on a freshly accepted connection the server
//! sends one greeting line, `LamportClock: <n>\r\n`, so the peer can merge
//! the server's clock before stamping its own message.
//!
//! # Modules
//!
//! - [`message`] -- Request, response, header, and status types.
//! - [`codec`] -- Async decode/encode over tokio byte streams.
//! - [`error`] -- [`WireError`].

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{
    read_greeting, read_request, read_response, write_greeting, write_request, write_response,
};
pub use error::WireError;
pub use message::{Headers, Method, Request, Response, StatusCode};
