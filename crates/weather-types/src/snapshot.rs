//! Full-state serialization format for the aggregator's content store.
//!
//! A snapshot is written periodically to durable storage and read back
//! once at startup. Both the primary and the bootstrap snapshot files use
//! this same structure.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SourceId, StationId};
use crate::reading::Reading;

/// Serialized state of every station ledger plus the liveness map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Readings per station, ordered by Lamport time then arrival.
    #[serde(default)]
    pub ledgers: BTreeMap<StationId, Vec<Reading>>,
    /// Last-contact wall-clock time per content source.
    #[serde(default)]
    pub liveness: BTreeMap<SourceId, DateTime<Utc>>,
}

impl Snapshot {
    /// Total number of readings across all ledgers.
    pub fn reading_count(&self) -> usize {
        self.ledgers.values().map(Vec::len).sum()
    }

    /// Whether the snapshot holds no readings and no liveness entries.
    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty() && self.liveness.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_deserializes_to_empty_snapshot() {
        let snapshot: Snapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.reading_count(), 0);
    }

    #[test]
    fn snapshot_json_shape() {
        let mut snapshot = Snapshot::default();
        let reading = Reading {
            station_id: StationId::from("A"),
            payload: serde_json::Map::new(),
            lamport_time: 3,
            source_id: SourceId::new("s1"),
        };
        snapshot.ledgers.insert(StationId::from("A"), vec![reading]);
        snapshot.liveness.insert(SourceId::new("s1"), Utc::now());

        let value = serde_json::to_value(&snapshot).unwrap();
        assert!(value["ledgers"]["A"].is_array());
        assert!(value["liveness"]["s1"].is_string());
        assert_eq!(snapshot.reading_count(), 1);
    }
}
