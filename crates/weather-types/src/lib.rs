//! Shared type definitions for the weather aggregation network.
//!
//! These types are used by every participant: the aggregation server stores
//! [`Reading`]s and persists [`Snapshot`]s, content sources identify
//! themselves with a [`SourceId`], and query clients name the [`StationId`]
//! they want to read.
//!
//! # Modules
//!
//! - [`ids`] -- String-backed identifier newtypes.
//! - [`reading`] -- A single weather reading and its JSON payload.
//! - [`snapshot`] -- Full-state serialization format used for persistence.

pub mod ids;
pub mod reading;
pub mod snapshot;

pub use ids::{SourceId, StationId};
pub use reading::{Document, Reading};
pub use snapshot::Snapshot;
