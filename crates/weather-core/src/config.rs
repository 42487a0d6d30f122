//! Configuration loading and typed config structures for the aggregator.
//!
//! The aggregator reads an optional `aggregator.yaml`. This module defines
//! strongly-typed structs that mirror the YAML structure and a loader that
//! reads and validates the file. Every field has a default, so an absent
//! file or a partial file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::persist::SnapshotPaths;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level aggregator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AggregatorConfig {
    /// Listener and request handling settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Snapshot persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Stale-source eviction settings.
    #[serde(default)]
    pub eviction: EvictionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AggregatorConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `AGGREGATOR_PORT` overrides `server.port`
    /// - `AGGREGATOR_SNAPSHOT_PATH` overrides `persistence.snapshot_path`
    /// - `AGGREGATOR_BOOTSTRAP_PATH` overrides `persistence.bootstrap_path`
    /// - `AGGREGATOR_LOG_LEVEL` overrides `logging.level`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply env overrides.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            let mut config = Self::default();
            config.apply_env_overrides()?;
            Ok(config)
        }
    }

    /// Apply `AGGREGATOR_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("AGGREGATOR_PORT") {
            self.server.port = val.parse().map_err(|e| ConfigError::Invalid {
                reason: format!("invalid AGGREGATOR_PORT {val:?}: {e}"),
            })?;
        }
        if let Ok(val) = std::env::var("AGGREGATOR_SNAPSHOT_PATH") {
            self.persistence.snapshot_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("AGGREGATOR_BOOTSTRAP_PATH") {
            self.persistence.bootstrap_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("AGGREGATOR_LOG_LEVEL") {
            self.logging.level = val;
        }
        Ok(())
    }

    /// Reject settings that would stall the server.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.server.worker_poll_ms, "server.worker_poll_ms"),
            (self.server.request_timeout_ms, "server.request_timeout_ms"),
            (self.persistence.interval_secs, "persistence.interval_secs"),
            (self.eviction.interval_secs, "eviction.interval_secs"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    reason: format!("{name} must be at least 1"),
                });
            }
        }
        Ok(())
    }
}

/// Listener and request handling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on (0 picks a free port).
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long the worker waits on its queue before rechecking shutdown.
    #[serde(default = "default_worker_poll_ms")]
    pub worker_poll_ms: u64,

    /// Upper bound on reading one request and writing its response.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerConfig {
    /// Worker queue poll interval.
    pub const fn worker_poll(&self) -> Duration {
        Duration::from_millis(self.worker_poll_ms)
    }

    /// Per-connection request timeout.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            worker_poll_ms: default_worker_poll_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Snapshot persistence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersistenceConfig {
    /// Live snapshot file.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Fallback snapshot read when the live one is unusable.
    #[serde(default = "default_bootstrap_path")]
    pub bootstrap_path: PathBuf,

    /// Seconds between snapshot writes.
    #[serde(default = "default_persist_interval_secs")]
    pub interval_secs: u64,

    /// Seconds an in-flight write may take after shutdown is requested.
    #[serde(default = "default_persist_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Whether to write one final snapshot during shutdown.
    #[serde(default = "default_true")]
    pub persist_on_shutdown: bool,
}

impl PersistenceConfig {
    /// Snapshot file locations.
    pub fn paths(&self) -> SnapshotPaths {
        SnapshotPaths::new(&self.snapshot_path, &self.bootstrap_path)
    }

    /// Interval between snapshot writes.
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Grace period for the persistence task at shutdown.
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            bootstrap_path: default_bootstrap_path(),
            interval_secs: default_persist_interval_secs(),
            shutdown_grace_secs: default_persist_grace_secs(),
            persist_on_shutdown: true,
        }
    }
}

/// Stale-source eviction configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EvictionConfig {
    /// Seconds between eviction passes.
    #[serde(default = "default_evict_interval_secs")]
    pub interval_secs: u64,

    /// Seconds of silence after which a source is stale.
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,

    /// Seconds an in-flight pass may take after shutdown is requested.
    #[serde(default = "default_evict_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl EvictionConfig {
    /// Interval between eviction passes.
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Staleness window as a signed wall-clock delta.
    pub fn staleness(&self) -> TimeDelta {
        let secs = i64::try_from(self.staleness_secs).unwrap_or(i64::MAX);
        TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX)
    }

    /// Grace period for the eviction task at shutdown.
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_evict_interval_secs(),
            staleness_secs: default_staleness_secs(),
            shutdown_grace_secs: default_evict_grace_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    4567
}

const fn default_worker_poll_ms() -> u64 {
    10
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data/snapshot.json")
}

fn default_bootstrap_path() -> PathBuf {
    PathBuf::from("data/bootstrap.json")
}

const fn default_persist_interval_secs() -> u64 {
    60
}

const fn default_persist_grace_secs() -> u64 {
    5
}

const fn default_evict_interval_secs() -> u64 {
    21
}

const fn default_staleness_secs() -> u64 {
    20
}

const fn default_evict_grace_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = AggregatorConfig::default();
        assert_eq!(config.server.port, 4567);
        assert_eq!(config.server.worker_poll(), Duration::from_millis(10));
        assert_eq!(config.persistence.interval(), Duration::from_secs(60));
        assert_eq!(config.persistence.shutdown_grace(), Duration::from_secs(5));
        assert_eq!(config.eviction.interval(), Duration::from_secs(21));
        assert_eq!(config.eviction.staleness(), TimeDelta::seconds(20));
        assert_eq!(config.eviction.shutdown_grace(), Duration::from_secs(60));
        assert!(config.persistence.persist_on_shutdown);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9000
  worker_poll_ms: 25
  request_timeout_ms: 2000

persistence:
  snapshot_path: "/var/lib/weather/snapshot.json"
  bootstrap_path: "/var/lib/weather/bootstrap.json"
  interval_secs: 30
  shutdown_grace_secs: 2
  persist_on_shutdown: false

eviction:
  interval_secs: 11
  staleness_secs: 10
  shutdown_grace_secs: 3

logging:
  level: "debug"
  json: true
"#;
        let config: AggregatorConfig = serde_yml::from_str(yaml).unwrap_or_default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.request_timeout(), Duration::from_secs(2));
        assert_eq!(
            config.persistence.paths().temp,
            PathBuf::from("/var/lib/weather/snapshot.json.tmp")
        );
        assert!(!config.persistence.persist_on_shutdown);
        assert_eq!(config.eviction.staleness(), TimeDelta::seconds(10));
        assert!(config.logging.json);
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = "eviction:\n  staleness_secs: 45\n";
        let config: AggregatorConfig = serde_yml::from_str(yaml).unwrap_or_default();

        // Staleness is overridden
        assert_eq!(config.eviction.staleness_secs, 45);
        // Everything else uses defaults
        assert_eq!(config.eviction.interval_secs, 21);
        assert_eq!(config.server.port, 4567);
    }

    #[test]
    fn shipped_sample_matches_defaults() {
        let sample = include_str!("../../../aggregator.yaml");
        let config: Option<AggregatorConfig> = serde_yml::from_str(sample).ok();
        assert_eq!(config, Some(AggregatorConfig::default()));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut config = AggregatorConfig::default();
        config.eviction.interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result: Result<AggregatorConfig, _> = serde_yml::from_str("server: [1, 2");
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = AggregatorConfig::load_or_default(Path::new("/nonexistent/aggregator.yaml"));
        assert!(config.is_ok());
    }
}
