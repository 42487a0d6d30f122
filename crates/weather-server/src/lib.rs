//! Aggregation server for the weather network.
//!
//! Content sources push readings with `PUT`; query clients fetch the most
//! recent reading for a station with `GET`. Every exchange is ordered by a
//! shared Lamport clock, and the store is persisted to disk periodically.
//!
//! # Modules
//!
//! - [`dispatch`] -- Request to response mapping over the content store.
//! - [`error`] -- [`RequestError`] and [`ServerError`].
//! - [`server`] -- Listener, worker, and lifecycle management.
//! - [`tasks`] -- Periodic persistence and eviction.

pub mod dispatch;
pub mod error;
pub mod server;
pub mod tasks;

pub use dispatch::Dispatcher;
pub use error::{RequestError, ServerError};
pub use server::{AggregationServer, ServerHandle};
