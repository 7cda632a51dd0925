//! # jvmwatch
//!
//! Continuous diagnostics for a running Java Virtual Machine.
//!
//! This crate turns the point-in-time management data a JVM exposes into
//! time-aware signals: reconstructed garbage-collection events, generation
//! level memory trends, allocation rate estimates, GC pressure, and threshold
//! and trend alerts. It is the analytical core for a terminal dashboard; the
//! dashboard itself only reads the published [`Metrics`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Monitor                            │
//! │  ┌─────────┐    ┌─────────┐    ┌─────────────────────────┐   │
//! │  │ source  │───▶│ poller  │───▶│          data           │   │
//! │  │ (query) │    │ (tick)  │    │ gc/history/trend/alerts │   │
//! │  └─────────┘    └────┬────┘    └────────────┬────────────┘   │
//! │                      │                      │                │
//! │                      ▼                      ▼                │
//! │                 Arc<Snapshot>          Arc<Metrics>          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: The [`SnapshotSource`] trait plus [`ScriptedSource`]
//!   (in-memory) and [`ReplaySource`] (recorded frames)
//! - **[`poller`]**: Queries every section in a fixed order each tick and
//!   publishes an immutable [`Snapshot`]; a failed query yields a
//!   disconnected snapshot instead of a partial one
//! - **[`data`]**: GC event reconstruction, historical series, trends,
//!   alerts, and the [`MetricsProcessor`] tying them together
//! - **[`monitor`]**: [`Monitor`] wires a poller to a processor
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Replay a recording, one tick per second
//! jvmwatch --replay recording.json
//!
//! # Ten ticks with a config file, then exit
//! jvmwatch --replay recording.json --config jvmwatch.toml --ticks 10
//! ```
//!
//! ### As a library
//!
//! ```
//! use std::sync::Arc;
//! use jvmwatch::{JvmwatchConfig, Monitor, ScriptedSource};
//!
//! # tokio_test::block_on(async {
//! let source = ScriptedSource::sample_jvm("example");
//! let monitor = Monitor::connect(Arc::new(source.clone()), &JvmwatchConfig::default())
//!     .await
//!     .unwrap();
//!
//! monitor.tick().await.unwrap();
//! source.set_collector("G1 Young Generation", 13, 80);
//! let metrics = monitor.tick().await.unwrap();
//!
//! assert_eq!(metrics.events_emitted, 3);
//! # });
//! ```

pub mod config;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod monitor;
pub mod poller;
pub mod source;

pub use config::JvmwatchConfig;
pub use data::{
    AlertEngine, GcEventReconstructor, HistoricalStore, Metrics, MetricsHandle, MetricsProcessor,
    PressureLevel, Thresholds, Trend, TrendEngine,
};
pub use error::SourceError;
pub use monitor::Monitor;
pub use poller::{PollHandle, Poller, SnapshotObserver};
pub use source::{ReplaySource, ScriptedSource, SnapshotSource};

pub use jvmwatch_types::{Alert, AlertLevel, GcEvent, Generation, Snapshot};
