//! Document to text rendering.

use serde_json::Value;
use weather_types::Document;

/// Render a document as `key: value` lines in field order.
///
/// String values are written without quotes; anything else is written as
/// compact JSON.
pub fn render(document: &Document) -> String {
    document
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}: {s}\n"),
            other => format!("{key}: {other}\n"),
        })
        .collect()
}
