//! Append-only diagnostic log.
//!
//! One JSON object per line, one line per tick. The log is write-only; the
//! pipeline never reads it back. Write failures are logged and otherwise
//! ignored so a full disk cannot stop polling.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::data::Metrics;

/// A single log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticRecord<'a> {
    pub timestamp_ms: u64,
    pub tick: u64,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    pub heap_percent: Option<f64>,
    pub gc_overhead: f64,
    pub allocation_rate: Option<f64>,
    pub events_emitted: usize,
    pub pressure: &'static str,
    pub alerts: Vec<&'a str>,
}

impl<'a> DiagnosticRecord<'a> {
    pub fn from_metrics(metrics: &'a Metrics) -> Self {
        Self {
            timestamp_ms: metrics.snapshot.timestamp_ms,
            tick: metrics.tick,
            connected: metrics.snapshot.connected,
            error: metrics.snapshot.error.as_deref(),
            heap_percent: metrics.heap_ratio.map(|r| r * 100.0),
            gc_overhead: metrics.gc_overhead,
            allocation_rate: metrics.allocation_rate,
            events_emitted: metrics.events_emitted,
            pressure: metrics.pressure.label(),
            alerts: metrics.alerts.iter().map(|a| a.title.as_str()).collect(),
        }
    }
}

/// JSON-lines writer.
#[derive(Debug)]
pub struct DiagnosticLog {
    path: PathBuf,
    file: File,
}

impl DiagnosticLog {
    /// Open `path` for appending, creating it if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, record: &DiagnosticRecord<'_>) {
        if let Err(e) = self.try_write(record) {
            warn!(path = %self.path.display(), error = %e, "Failed to write diagnostic record");
        }
    }

    fn try_write(&mut self, record: &DiagnosticRecord<'_>) -> io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn record(connected: bool) -> DiagnosticRecord<'static> {
        DiagnosticRecord {
            timestamp_ms: 1_700_000_000_000,
            tick: 1,
            connected,
            error: (!connected).then_some("Source closed"),
            heap_percent: connected.then_some(42.0),
            gc_overhead: 0.01,
            allocation_rate: None,
            events_emitted: 3,
            pressure: "low",
            alerts: vec!["High heap usage"],
        }
    }

    #[test]
    fn test_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diag.jsonl");

        let mut log = DiagnosticLog::open(&path).unwrap();
        log.write(&record(true));
        log.write(&record(false));
        drop(log);

        // Reopening appends rather than truncating
        let mut log = DiagnosticLog::open(&path).unwrap();
        log.write(&record(true));

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["heap_percent"], 42.0);
        assert!(lines[0].get("error").is_none());
        assert_eq!(lines[1]["error"], "Source closed");
        assert_eq!(lines[1]["alerts"][0], "High heap usage");
    }

    #[test]
    fn test_open_fails_for_missing_directory() {
        assert!(DiagnosticLog::open("/nonexistent/dir/diag.jsonl").is_err());
    }
}
