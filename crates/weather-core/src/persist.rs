//! Snapshot persistence for the content store.
//!
//! Snapshots are written as JSON to a temporary file which is then renamed
//! over the live file, so a crash mid-write never leaves a truncated
//! snapshot behind. At startup the primary snapshot is read first; if it is
//! missing or unreadable the bootstrap snapshot is tried, and if that fails
//! too the server starts empty.
//!
//! A failed write is reported to the caller but never touches in-memory
//! state; the next persistence cycle simply tries again.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use weather_types::Snapshot;

/// Errors that can occur while writing or reading a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Reading, writing, or renaming a snapshot file failed.
    #[error("snapshot I/O error on {path}: {source}")]
    Io {
        /// File the operation was acting on.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The snapshot could not be serialized or parsed.
    #[error("snapshot encoding error on {path}: {source}")]
    Encoding {
        /// File the operation was acting on.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

/// Where a restored snapshot came from.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The primary snapshot was read.
    Primary(Snapshot),
    /// The primary snapshot failed; the bootstrap snapshot was read.
    Bootstrap(Snapshot),
    /// Neither file could be read.
    Empty,
}

impl LoadOutcome {
    /// The loaded snapshot, or an empty one.
    pub fn into_snapshot(self) -> Snapshot {
        match self {
            Self::Primary(s) | Self::Bootstrap(s) => s,
            Self::Empty => Snapshot::default(),
        }
    }
}

/// Snapshot file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    /// Live snapshot, replaced atomically on each write.
    pub primary: PathBuf,
    /// Fallback snapshot read when the primary is absent or unreadable.
    pub bootstrap: PathBuf,
    /// Scratch file written before the rename.
    pub temp: PathBuf,
}

impl SnapshotPaths {
    /// Build paths with the temp file placed next to the primary.
    pub fn new(primary: impl Into<PathBuf>, bootstrap: impl Into<PathBuf>) -> Self {
        let primary = primary.into();
        let mut temp = primary.clone().into_os_string();
        temp.push(".tmp");
        Self {
            primary,
            bootstrap: bootstrap.into(),
            temp: PathBuf::from(temp),
        }
    }
}

/// Serialize `snapshot` and atomically replace the primary file with it.
pub async fn write_snapshot(
    snapshot: &Snapshot,
    paths: &SnapshotPaths,
) -> Result<(), PersistError> {
    let json = serde_json::to_vec(snapshot).map_err(|source| PersistError::Encoding {
        path: paths.primary.clone(),
        source,
    })?;

    if let Some(parent) = paths.temp.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| io_error(parent, source))?;
    }

    tokio::fs::write(&paths.temp, &json)
        .await
        .map_err(|source| io_error(&paths.temp, source))?;
    tokio::fs::rename(&paths.temp, &paths.primary)
        .await
        .map_err(|source| io_error(&paths.primary, source))?;

    debug!(
        path = %paths.primary.display(),
        bytes = json.len(),
        readings = snapshot.reading_count(),
        "snapshot written"
    );
    Ok(())
}

/// Read one snapshot file.
pub async fn read_snapshot(path: &Path) -> Result<Snapshot, PersistError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| io_error(path, source))?;
    serde_json::from_slice(&bytes).map_err(|source| PersistError::Encoding {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the primary snapshot, falling back to the bootstrap snapshot.
pub async fn load_snapshot(paths: &SnapshotPaths) -> LoadOutcome {
    match read_snapshot(&paths.primary).await {
        Ok(snapshot) => {
            info!(path = %paths.primary.display(), "primary snapshot loaded");
            return LoadOutcome::Primary(snapshot);
        }
        Err(e) => warn!(error = %e, "primary snapshot unavailable, trying bootstrap"),
    }

    match read_snapshot(&paths.bootstrap).await {
        Ok(snapshot) => {
            info!(path = %paths.bootstrap.display(), "bootstrap snapshot loaded");
            LoadOutcome::Bootstrap(snapshot)
        }
        Err(e) => {
            warn!(error = %e, "bootstrap snapshot unavailable, starting empty");
            LoadOutcome::Empty
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PersistError {
    PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use weather_types::{Reading, SourceId, StationId};

    use super::*;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::default();
        let payload = serde_json::json!({"id": "A", "air_temp": "13.3"})
            .as_object()
            .cloned()
            .unwrap();
        snapshot.ledgers.insert(
            StationId::from("A"),
            vec![Reading {
                station_id: StationId::from("A"),
                payload,
                lamport_time: 4,
                source_id: SourceId::new("s1"),
            }],
        );
        snapshot.liveness.insert(SourceId::new("s1"), Utc::now());
        snapshot
    }

    #[test]
    fn temp_path_sits_next_to_primary() {
        let paths = SnapshotPaths::new("data/snapshot.json", "data/bootstrap.json");
        assert_eq!(paths.temp, PathBuf::from("data/snapshot.json.tmp"));
    }

    #[tokio::test]
    async fn write_then_load_primary() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SnapshotPaths::new(dir.path().join("snap.json"), dir.path().join("boot.json"));
        let snapshot = sample();

        write_snapshot(&snapshot, &paths).await.unwrap();
        assert!(!paths.temp.exists(), "temp file must be renamed away");

        let loaded = load_snapshot(&paths).await;
        assert_eq!(loaded, LoadOutcome::Primary(snapshot));
    }

    #[tokio::test]
    async fn write_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SnapshotPaths::new(
            dir.path().join("nested").join("snap.json"),
            dir.path().join("boot.json"),
        );
        write_snapshot(&sample(), &paths).await.unwrap();
        assert!(paths.primary.exists());
    }

    #[tokio::test]
    async fn corrupt_primary_falls_back_to_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SnapshotPaths::new(dir.path().join("snap.json"), dir.path().join("boot.json"));
        tokio::fs::write(&paths.primary, b"{not json").await.unwrap();
        tokio::fs::write(&paths.bootstrap, serde_json::to_vec(&sample()).unwrap())
            .await
            .unwrap();

        match load_snapshot(&paths).await {
            LoadOutcome::Bootstrap(s) => assert_eq!(s.reading_count(), 1),
            other => panic!("expected bootstrap, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_files_start_empty() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SnapshotPaths::new(dir.path().join("snap.json"), dir.path().join("boot.json"));
        let loaded = load_snapshot(&paths).await;
        assert_eq!(loaded, LoadOutcome::Empty);
        assert!(loaded.into_snapshot().is_empty());
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the primary file should be makes the rename fail.
        let primary = dir.path().join("snap.json");
        tokio::fs::create_dir_all(primary.join("occupied")).await.unwrap();
        let paths = SnapshotPaths::new(&primary, dir.path().join("boot.json"));

        let result = write_snapshot(&sample(), &paths).await;
        assert!(matches!(result, Err(PersistError::Io { .. })));
    }
}
