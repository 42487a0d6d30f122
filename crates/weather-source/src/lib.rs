//! Content source for the weather aggregation network.
//!
//! Loads a station document from a `key: value` data file and pushes it to
//! the aggregation server on a fixed interval, retrying after transport
//! failures.
//!
//! # Modules
//!
//! - [`document`] -- Data file parsing into a JSON document.
//! - [`error`] -- [`SourceError`] and [`DocumentError`].
//! - [`source`] -- The pushing [`ContentSource`].

pub mod document;
pub mod error;
pub mod source;

pub use document::{load_document, parse_document};
pub use error::{DocumentError, SourceError};
pub use source::{ContentSource, PushOutcome, SourceConfig};
