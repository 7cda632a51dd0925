//! Per-tick processing and the pull surface for readers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use jvmwatch_types::{Alert, GcEvent, Generation, PoolKind, Snapshot};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::alerts::AlertEngine;
use super::allocation::AllocationEstimator;
use super::gc::{GcEventReconstructor, GcSummary, PressureLevel, ONE_MINUTE};
use super::history::{series, HistoricalPoint, HistoricalStore, PointValue};
use super::trend::{Trend, TrendEngine};
use crate::config::JvmwatchConfig;
use crate::diagnostics::{DiagnosticLog, DiagnosticRecord};
use crate::poller::SnapshotObserver;

/// Number of events carried in each [`Metrics`].
pub const RECENT_EVENTS: usize = 50;

/// Everything a presentation layer needs for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub snapshot: Arc<Snapshot>,
    /// Heap used / max, if the maximum is defined.
    pub heap_ratio: Option<f64>,
    /// Total GC time / uptime.
    pub gc_overhead: f64,
    /// Bytes per second.
    pub allocation_rate: Option<f64>,
    pub trends: BTreeMap<String, Trend>,
    pub pressure: PressureLevel,
    /// Statistics over the last minute of events.
    pub gc_summary: GcSummary,
    /// Most severe first.
    pub alerts: Vec<Alert>,
    pub recent_events: Vec<GcEvent>,
    /// Events reconstructed from this tick's snapshot.
    pub events_emitted: usize,
    /// Number of snapshots processed so far.
    pub tick: u64,
}

impl Metrics {
    fn initial() -> Self {
        Self {
            snapshot: Arc::new(Snapshot::placeholder()),
            heap_ratio: None,
            gc_overhead: 0.0,
            allocation_rate: None,
            trends: BTreeMap::new(),
            pressure: PressureLevel::Low,
            gc_summary: GcSummary::default(),
            alerts: Vec::new(),
            recent_events: Vec::new(),
            events_emitted: 0,
            tick: 0,
        }
    }
}

/// Runs the reconstructor, history, trend and alert stages for each tick.
///
/// Only one tick is processed at a time; callers share it through
/// [`MetricsHandle`].
#[derive(Debug)]
pub struct MetricsProcessor {
    reconstructor: GcEventReconstructor,
    allocation: AllocationEstimator,
    history: HistoricalStore,
    trends: TrendEngine,
    alerts: AlertEngine,
    diagnostics: Option<DiagnosticLog>,
    metrics: Arc<Metrics>,
}

impl Default for MetricsProcessor {
    fn default() -> Self {
        Self::new(&JvmwatchConfig::default())
    }
}

impl MetricsProcessor {
    pub fn new(config: &JvmwatchConfig) -> Self {
        Self {
            reconstructor: GcEventReconstructor::new(
                Duration::from_secs(config.gc.retention_secs),
                Duration::from_secs(config.gc.detail_staleness_secs),
            ),
            allocation: AllocationEstimator::new(),
            history: HistoricalStore::new(
                config.history.max_points,
                Duration::from_secs(config.history.max_age_secs),
            ),
            trends: TrendEngine::new(Duration::from_secs(config.trend.window_secs)),
            alerts: AlertEngine::new(config.thresholds.clone()),
            diagnostics: None,
            metrics: Arc::new(Metrics::initial()),
        }
    }

    pub fn with_diagnostic_log(mut self, log: DiagnosticLog) -> Self {
        self.diagnostics = Some(log);
        self
    }

    /// Process one snapshot and publish the resulting metrics.
    pub fn process(&mut self, snapshot: Arc<Snapshot>) -> Arc<Metrics> {
        let previous = self.metrics.clone();
        let now = snapshot.timestamp_ms;

        if snapshot.connected != previous.snapshot.connected {
            if snapshot.connected {
                info!(tick = previous.tick + 1, "Target connected");
            } else if previous.tick > 0 {
                warn!(error = snapshot.error.as_deref().unwrap_or("unknown"), "Target disconnected");
            }
        }

        let events_emitted = self.reconstructor.process_snapshot(&snapshot);
        let allocation_rate = self.allocation.observe(&snapshot);
        let gc_overhead = snapshot.gc_overhead();

        if snapshot.connected {
            self.record_history(&snapshot, gc_overhead, allocation_rate);
        }

        let trends = self.trends.compute_all(&self.history, now);
        let pressure = if snapshot.connected {
            self.reconstructor
                .pressure(now, gc_overhead, &self.alerts.thresholds().pressure)
        } else {
            PressureLevel::Low
        };
        let alerts = self
            .alerts
            .analyze(&snapshot, &trends, gc_overhead, &self.reconstructor)
            .to_vec();

        let metrics = Arc::new(Metrics {
            heap_ratio: snapshot.heap_ratio(),
            gc_overhead,
            allocation_rate,
            trends,
            pressure,
            gc_summary: self.reconstructor.summary(now, ONE_MINUTE),
            alerts,
            recent_events: self.reconstructor.recent_events(RECENT_EVENTS),
            events_emitted,
            tick: previous.tick + 1,
            snapshot,
        });

        debug!(
            tick = metrics.tick,
            connected = metrics.snapshot.connected,
            events = events_emitted,
            alerts = metrics.alerts.len(),
            pressure = metrics.pressure.label(),
            "Processed snapshot"
        );

        if let Some(log) = self.diagnostics.as_mut() {
            log.write(&DiagnosticRecord::from_metrics(&metrics));
        }

        self.metrics = metrics.clone();
        metrics
    }

    fn record_history(&mut self, snapshot: &Snapshot, gc_overhead: f64, allocation_rate: Option<f64>) {
        let ts = snapshot.timestamp_ms;
        let memory = &snapshot.memory;
        let history = &mut self.history;

        let mut heap = BTreeMap::new();
        heap.insert("used".to_string(), memory.heap.used as f64);
        heap.insert("committed".to_string(), memory.heap.committed as f64);
        if let Some(max) = memory.heap.max {
            heap.insert("max".to_string(), max as f64);
        }
        history.add_series(series::HEAP, ts, heap);
        history.add_series(
            series::NON_HEAP,
            ts,
            PointValue::fields([
                ("used", memory.non_heap.used as f64),
                ("committed", memory.non_heap.committed as f64),
            ]),
        );

        history.add_series(
            series::YOUNG_GEN_USED,
            ts,
            memory.generation_used(Generation::Young) as f64,
        );
        history.add_series(
            series::OLD_GEN_USED,
            ts,
            memory.generation_used(Generation::Old) as f64,
        );
        let metaspace: u64 = memory.pools_of(PoolKind::Metaspace).map(|p| p.usage.used).sum();
        history.add_series(series::METASPACE_USED, ts, metaspace as f64);

        history.add_series(series::GC_OVERHEAD, ts, gc_overhead);
        if let Some(load) = snapshot.os.process_cpu_load {
            history.add_series(series::CPU_LOAD, ts, load);
        }
        history.add_series(series::THREAD_COUNT, ts, snapshot.threading.thread_count as f64);
        history.add_series(
            series::LOADED_CLASSES,
            ts,
            snapshot.class_loading.loaded_class_count as f64,
        );
        if let Some(rate) = allocation_rate {
            history.add_series(series::ALLOCATION_RATE, ts, rate);
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn history(&self) -> &HistoricalStore {
        &self.history
    }

    pub fn reconstructor(&self) -> &GcEventReconstructor {
        &self.reconstructor
    }
}

/// Shared, read-mostly access to a [`MetricsProcessor`].
///
/// Every getter returns owned data; nothing borrowed outlives the lock.
#[derive(Debug, Clone)]
pub struct MetricsHandle(Arc<RwLock<MetricsProcessor>>);

impl MetricsHandle {
    pub fn new(processor: MetricsProcessor) -> Self {
        Self(Arc::new(RwLock::new(processor)))
    }

    pub fn process(&self, snapshot: Arc<Snapshot>) -> Arc<Metrics> {
        self.0.write().process(snapshot)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.0.read().metrics()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.metrics().alerts.clone()
    }

    pub fn recent_events(&self, n: usize) -> Vec<GcEvent> {
        self.0.read().reconstructor().recent_events(n)
    }

    /// Points of one series within `window` of the latest snapshot.
    pub fn historical_series(&self, name: &str, window: Duration) -> Vec<HistoricalPoint> {
        let processor = self.0.read();
        let now = processor.metrics.snapshot.timestamp_ms;
        processor.history().recent(name, window, now)
    }

    pub fn series_names(&self) -> Vec<String> {
        self.0
            .read()
            .history()
            .series_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

impl SnapshotObserver for MetricsHandle {
    fn on_snapshot(&mut self, snapshot: &Arc<Snapshot>) {
        self.process(snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::trend::keys;
    use jvmwatch_types::AlertLevel;

    const T0: u64 = 1_700_000_000_000;
    const MB: u64 = 1024 * 1024;

    fn snapshot(ts: u64, heap_used: u64, young: (u64, u64), eden: u64) -> Arc<Snapshot> {
        Arc::new(
            Snapshot::builder()
                .timestamp_ms(ts)
                .heap(heap_used, 1000 * MB)
                .pool("G1 Eden Space", eden, None)
                .pool("G1 Old Gen", heap_used - eden, Some(1000 * MB))
                .pool("Metaspace", 40 * MB, None)
                .collector("G1 Young Generation", young.0, young.1)
                .collector("G1 Old Generation", 0, 0)
                .threads(50)
                .process_cpu_load(0.2)
                .uptime_ms(ts - T0)
                .start_time_ms(T0)
                .build(),
        )
    }

    #[test]
    fn test_initial_metrics_are_disconnected() {
        let handle = MetricsHandle::new(MetricsProcessor::default());
        let metrics = handle.metrics();
        assert_eq!(metrics.tick, 0);
        assert!(!metrics.snapshot.connected);
        assert!(handle.alerts().is_empty());
    }

    #[test]
    fn test_pipeline_over_several_ticks() {
        let handle = MetricsHandle::new(MetricsProcessor::default());

        handle.process(snapshot(T0 + 60_000, 300 * MB, (10, 50), 20 * MB));
        let metrics = handle.process(snapshot(T0 + 61_000, 320 * MB, (13, 80), 40 * MB));

        assert_eq!(metrics.tick, 2);
        assert_eq!(metrics.events_emitted, 3);
        assert_eq!(metrics.recent_events.len(), 3);
        assert_eq!(metrics.allocation_rate, Some(20.0 * MB as f64));
        assert_eq!(metrics.heap_ratio, Some(0.32));
        assert_eq!(metrics.gc_summary.young_per_minute, 3.0);
        assert_eq!(metrics.pressure, PressureLevel::Low);
        assert!(metrics.trends[keys::HEAP_USED].slope_per_minute > 0.0);

        assert_eq!(handle.recent_events(2).len(), 2);
        let heap = handle.historical_series(series::HEAP, Duration::from_secs(60));
        assert_eq!(heap.len(), 2);
        assert_eq!(heap[1].value.field("used"), Some(320.0 * MB as f64));
        assert!(handle
            .series_names()
            .contains(&series::ALLOCATION_RATE.to_string()));
    }

    #[test]
    fn test_metrics_stable_between_ticks() {
        let handle = MetricsHandle::new(MetricsProcessor::default());
        handle.process(snapshot(T0 + 60_000, 300 * MB, (10, 50), 20 * MB));

        assert_eq!(handle.metrics(), handle.metrics());
        assert!(Arc::ptr_eq(&handle.metrics(), &handle.metrics()));
    }

    #[test]
    fn test_disconnected_tick() {
        let handle = MetricsHandle::new(MetricsProcessor::default());
        handle.process(snapshot(T0 + 60_000, 300 * MB, (10, 50), 20 * MB));

        let metrics = handle.process(Arc::new(Snapshot::disconnected(
            T0 + 61_000,
            Some("Source closed".into()),
        )));

        assert_eq!(metrics.events_emitted, 0);
        assert_eq!(metrics.alerts.len(), 1);
        assert_eq!(metrics.alerts[0].level, AlertLevel::Warning);
        assert_eq!(metrics.alerts[0].title, "Target disconnected");
        // History is not extended by disconnected ticks
        assert_eq!(
            handle
                .historical_series(series::THREAD_COUNT, Duration::from_secs(60))
                .len(),
            1
        );
    }

    #[test]
    fn test_heap_alert_raised_and_cleared() {
        let handle = MetricsHandle::new(MetricsProcessor::default());

        let metrics = handle.process(snapshot(T0 + 60_000, 950 * MB, (10, 50), 20 * MB));
        assert!(metrics.alerts.iter().any(|a| a.metric == "heap_usage"));

        let metrics = handle.process(snapshot(T0 + 61_000, 400 * MB, (10, 50), 20 * MB));
        assert!(!metrics.alerts.iter().any(|a| a.metric == "heap_usage"));
    }

    #[test]
    fn test_diagnostic_log_written_per_tick() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diag.jsonl");
        let processor = MetricsProcessor::default().with_diagnostic_log(DiagnosticLog::open(&path).unwrap());
        let handle = MetricsHandle::new(processor);

        handle.process(snapshot(T0 + 60_000, 300 * MB, (10, 50), 20 * MB));
        handle.process(snapshot(T0 + 61_000, 300 * MB, (11, 55), 20 * MB));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["tick"], 2);
        assert_eq!(lines[1]["events_emitted"], 1);
        assert_eq!(lines[1]["connected"], true);
    }
}
