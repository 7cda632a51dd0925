//! Derived metrics computed from published snapshots.
//!
//! ## Submodules
//!
//! - [`gc`]: Reconstruction of discrete GC events and window statistics
//! - [`allocation`]: Allocation rate from eden occupancy
//! - [`history`]: Capped, time-windowed series for trending
//! - [`trend`]: Index-based least-squares slopes over history
//! - [`alerts`]: Threshold and trend alerts
//! - [`processor`]: Runs every stage once per tick ([`MetricsProcessor`])
//!
//! ## Data Flow
//!
//! ```text
//! Snapshot (one per tick)
//!        │
//!        ▼
//! MetricsProcessor::process()
//!        │
//!        ├──▶ GcEventReconstructor::process_snapshot()
//!        ├──▶ AllocationEstimator::observe()
//!        ├──▶ HistoricalStore::add_series() ──▶ TrendEngine::compute_all()
//!        ├──▶ AlertEngine::analyze()
//!        │
//!        └──▶ Metrics (published through MetricsHandle)
//! ```

pub mod alerts;
pub mod allocation;
pub mod gc;
pub mod history;
pub mod processor;
pub mod trend;

pub use alerts::{AlertEngine, Thresholds};
pub use allocation::AllocationEstimator;
pub use gc::{GcEventReconstructor, GcSummary, PressureBand, PressureLevel, PressureThresholds};
pub use history::{series, HistoricalPoint, HistoricalStore, PointValue};
pub use processor::{Metrics, MetricsHandle, MetricsProcessor, RECENT_EVENTS};
pub use trend::{regress, Trend, TrendEngine};
