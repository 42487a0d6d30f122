//! Weather readings as stored by the aggregator.
//!
//! A [`Reading`] pairs the JSON document pushed by a content source with
//! the Lamport time at which the aggregator accepted it and the identity
//! of the source that sent it. Readings are immutable once created.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{SourceId, StationId};

/// Insertion-ordered JSON object carrying the fields of one observation.
pub type Document = serde_json::Map<String, Value>;

/// Name of the document field that identifies the station.
pub const STATION_ID_FIELD: &str = "id";

/// One accepted weather observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Station this reading belongs to (copied from the document's `id`).
    pub station_id: StationId,
    /// The document exactly as the content source sent it.
    pub payload: Document,
    /// Aggregator clock value when the reading was accepted.
    pub lamport_time: u64,
    /// Content source that pushed the reading.
    pub source_id: SourceId,
}

impl Reading {
    /// Build a reading from a decoded document.
    ///
    /// Returns `None` when the document has no usable station id (see
    /// [`station_id_of`]).
    pub fn from_document(
        payload: Document,
        lamport_time: u64,
        source_id: SourceId,
    ) -> Option<Self> {
        let station_id = station_id_of(&payload)?;
        Some(Self {
            station_id,
            payload,
            lamport_time,
            source_id,
        })
    }
}

/// Extract the station id from a document's `id` field.
///
/// Strings are taken verbatim and numbers are rendered as text. Any other
/// value, a missing field, or an empty string yields `None`.
pub fn station_id_of(document: &Document) -> Option<StationId> {
    let id = match document.get(STATION_ID_FIELD)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if id.is_empty() {
        None
    } else {
        Some(StationId::from(id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: &Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn station_id_from_string_field() {
        let d = doc(&json!({"id": "IDS60901", "air_temp": "13.3"}));
        assert_eq!(station_id_of(&d), Some(StationId::from("IDS60901")));
    }

    #[test]
    fn station_id_from_numeric_field() {
        let d = doc(&json!({"id": 94672}));
        assert_eq!(station_id_of(&d), Some(StationId::from("94672")));
    }

    #[test]
    fn missing_or_empty_id_is_rejected() {
        assert_eq!(station_id_of(&doc(&json!({"name": "Adelaide"}))), None);
        assert_eq!(station_id_of(&doc(&json!({"id": ""}))), None);
        assert_eq!(station_id_of(&doc(&json!({"id": null}))), None);
        assert_eq!(station_id_of(&doc(&json!({"id": ["a"]}))), None);
    }

    #[test]
    fn from_document_keeps_payload_order() {
        let d = doc(&json!({"id": "A", "zeta": 1, "alpha": 2}));
        let reading = Reading::from_document(d, 4, SourceId::new("s1")).unwrap();
        let keys: Vec<&str> = reading.payload.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "zeta", "alpha"]);
        assert_eq!(reading.lamport_time, 4);
    }
}
