//! Configuration loading.
//!
//! Settings come from an optional TOML file, overridden by environment
//! variables prefixed with `JVMWATCH_`. Nested keys use `__`, so
//! `JVMWATCH_POLLER__INTERVAL_MS=250` sets `poller.interval_ms`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::data::Thresholds;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_ms: u64,
    pub query_timeout_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            query_timeout_ms: 5000,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_points: usize,
    pub max_age_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_points: 300,
            max_age_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// How long reconstructed events are kept.
    pub retention_secs: u64,
    /// Detail records older than this are treated as absent.
    pub detail_staleness_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            retention_secs: 300,
            detail_staleness_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub window_secs: u64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self { window_secs: 300 }
    }
}

/// Top-level configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct JvmwatchConfig {
    pub poller: PollerConfig,
    pub history: HistoryConfig,
    pub gc: GcConfig,
    pub trend: TrendConfig,
    pub thresholds: Thresholds,
    /// Append one JSON line per tick to this file.
    pub diagnostic_log: Option<PathBuf>,
}

impl JvmwatchConfig {
    /// Load from an optional file plus `JVMWATCH_` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config: JvmwatchConfig = builder
            .add_source(
                Environment::with_prefix("JVMWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.poller.interval_ms > 0, "poller.interval_ms must be positive");
        ensure!(
            self.poller.query_timeout_ms > 0,
            "poller.query_timeout_ms must be positive"
        );
        ensure!(self.history.max_points > 0, "history.max_points must be positive");
        ensure!(self.history.max_age_secs > 0, "history.max_age_secs must be positive");
        ensure!(self.gc.retention_secs > 0, "gc.retention_secs must be positive");
        ensure!(self.trend.window_secs > 0, "trend.window_secs must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn toml_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = JvmwatchConfig::default();
        assert_eq!(config.poller.interval(), Duration::from_secs(1));
        assert_eq!(config.poller.query_timeout(), Duration::from_secs(5));
        assert_eq!(config.history.max_points, 300);
        assert_eq!(config.gc.detail_staleness_secs, 30);
        assert_eq!(config.trend.window_secs, 300);
        assert_eq!(config.thresholds.heap_critical, 0.90);
        assert!(config.diagnostic_log.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let file = toml_file(
            r#"
diagnostic_log = "/tmp/jvmwatch.jsonl"

[poller]
interval_ms = 500

[thresholds]
heap_warning = 0.75

[thresholds.pressure.critical]
overhead = 0.3
max_pause_ms = 2000.0
per_minute = 120.0
"#,
        );

        let config = JvmwatchConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.poller.interval_ms, 500);
        assert_eq!(config.poller.query_timeout_ms, 5000);
        assert_eq!(config.thresholds.heap_warning, 0.75);
        assert_eq!(config.thresholds.heap_critical, 0.90);
        assert_eq!(config.thresholds.pressure.critical.max_pause_ms, 2000.0);
        assert_eq!(config.thresholds.pressure.high.overhead, 0.10);
        assert_eq!(
            config.diagnostic_log.as_deref(),
            Some(Path::new("/tmp/jvmwatch.jsonl"))
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let file = toml_file("[poller]\ninterval_ms = 0\n");
        let err = JvmwatchConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("interval_ms"));
    }

    #[test]
    fn test_zero_windows_rejected() {
        let mut config = JvmwatchConfig::default();
        config.history.max_age_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("history.max_age_secs"));

        let mut config = JvmwatchConfig::default();
        config.gc.retention_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("gc.retention_secs"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(JvmwatchConfig::load(Some(Path::new("/nonexistent/jvmwatch.toml"))).is_err());
    }

    #[test]
    fn test_environment_override() {
        std::env::set_var("JVMWATCH_GC__RETENTION_SECS", "42");
        let config = JvmwatchConfig::load(None);
        std::env::remove_var("JVMWATCH_GC__RETENTION_SECS");

        assert_eq!(config.unwrap().gc.retention_secs, 42);
    }
}
