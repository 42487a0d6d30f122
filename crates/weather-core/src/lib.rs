//! Causal clock, content store, persistence, and configuration for the
//! weather aggregator.
//!
//! # Modules
//!
//! - [`clock`] -- Lamport logical clock with tick/send/receive rules.
//! - [`config`] -- Configuration loading from `aggregator.yaml` into
//!   strongly-typed structs.
//! - [`logging`] -- Tracing subscriber setup for the binaries.
//! - [`persist`] -- Atomic snapshot writes and primary/bootstrap loading.
//! - [`store`] -- Concurrent per-station reading ledgers with staleness
//!   eviction.

pub mod clock;
pub mod config;
pub mod logging;
pub mod persist;
pub mod store;

pub use clock::LamportClock;
pub use store::{ContactKind, ContentStore, EvictionReport, StoreError};
