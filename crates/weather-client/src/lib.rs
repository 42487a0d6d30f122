//! Query client for the weather aggregation network.
//!
//! # Modules
//!
//! - [`client`] -- [`QueryClient`], which fetches the latest station reading.
//! - [`error`] -- [`ClientError`].
//! - [`render`] -- Document to `key: value` text.

pub mod client;
pub mod error;
pub mod render;

pub use client::{QueryClient, parse_server_addr};
pub use error::ClientError;
pub use render::render;
