//! Data file loader.
//!
//! A data file holds one `key: value` pair per line. Keys and values are
//! split at the first `:` and trimmed, so values may themselves contain
//! colons (`local_date_time_full: 20230715160000` or `time: 15:00`). Blank
//! lines are skipped. Every value is kept as a JSON string.

use std::path::Path;

use serde_json::Value;
use weather_types::{Document, reading::station_id_of};

use crate::error::DocumentError;

/// Parse data file text into a document.
pub fn parse_document(text: &str) -> Result<Document, DocumentError> {
    let mut document = Document::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(DocumentError::MalformedLine {
                line: index.saturating_add(1),
                text: raw.to_owned(),
            });
        };
        document.insert(key.trim().to_owned(), Value::String(value.trim().to_owned()));
    }

    if station_id_of(&document).is_none() {
        return Err(DocumentError::MissingId);
    }
    Ok(document)
}

/// Read and parse a data file.
pub async fn load_document(path: &Path) -> Result<Document, DocumentError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_document(&text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = "id: IDS60901\nname: Adelaide (West Terrace /  ngayirdapira)\n\
                          state: SA\nlocal_date_time: 15/04:00pm\n\nair_temp: 13.3\nwind_dir: S\n";

    #[test]
    fn parses_pairs_in_order() {
        let document = parse_document(SAMPLE).unwrap();
        let keys: Vec<&str> = document.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "name", "state", "local_date_time", "air_temp", "wind_dir"]);
        assert_eq!(document.get("local_date_time").unwrap(), "15/04:00pm");
        assert_eq!(document.get("air_temp").unwrap(), "13.3");
    }

    #[test]
    fn crlf_lines_are_trimmed() {
        let document = parse_document("id: A\r\nair_temp: 1\r\n").unwrap();
        assert_eq!(document.get("id").unwrap(), "A");
        assert_eq!(document.get("air_temp").unwrap(), "1");
    }

    #[test]
    fn line_without_separator_is_rejected() {
        let err = parse_document("id: A\nnonsense\n").unwrap_err();
        assert!(matches!(err, DocumentError::MalformedLine { line: 2, .. }));
    }

    #[test]
    fn missing_or_empty_id_is_rejected() {
        assert!(matches!(parse_document("air_temp: 1\n"), Err(DocumentError::MissingId)));
        assert!(matches!(parse_document("id:\n"), Err(DocumentError::MissingId)));
    }

    #[tokio::test]
    async fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        tokio::fs::write(&path, SAMPLE).await.unwrap();
        let document = load_document(&path).await.unwrap();
        assert_eq!(document.get("id").unwrap(), "IDS60901");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_document(&dir.path().join("absent.txt")).await.unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }
}
