//! Threshold and trend alerting.
//!
//! The alert list is rebuilt from scratch on every [`AlertEngine::analyze`]
//! call, so an alert disappears as soon as its condition stops holding.

use std::collections::BTreeMap;

use jvmwatch_types::format::{format_byte_rate, format_bytes, format_millis, format_percent};
use jvmwatch_types::{Alert, AlertLevel, Generation, Snapshot};
use serde::Deserialize;

use super::gc::{GcEventReconstructor, PressureThresholds, ONE_MINUTE};
use super::trend::{keys, Trend};

/// Thresholds for alert computation.
///
/// Every comparison is inclusive: a value equal to a threshold triggers it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Heap used / max.
    pub heap_warning: f64,
    pub heap_critical: f64,
    /// GC time / uptime.
    pub gc_overhead_warning: f64,
    pub gc_overhead_critical: f64,
    /// Process CPU load, `0.0..=1.0`.
    pub cpu_warning: f64,
    pub cpu_critical: f64,
    /// Heap growth per minute, in bytes.
    pub heap_trend_per_minute: f64,
    pub cpu_trend_per_minute: f64,
    pub thread_trend_per_minute: f64,
    /// Young collections in the last minute.
    pub young_gc_per_minute: f64,
    /// Old collections in the last minute.
    pub old_gc_per_minute: f64,
    /// Average pause over the last minute.
    pub pause_warning_ms: f64,
    pub pause_critical_ms: f64,
    pub pressure: PressureThresholds,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            heap_warning: 0.80,
            heap_critical: 0.90,
            gc_overhead_warning: 0.05,
            gc_overhead_critical: 0.10,
            cpu_warning: 0.80,
            cpu_critical: 0.95,
            heap_trend_per_minute: 50.0 * 1024.0 * 1024.0,
            cpu_trend_per_minute: 0.10,
            thread_trend_per_minute: 10.0,
            young_gc_per_minute: 60.0,
            old_gc_per_minute: 5.0,
            pause_warning_ms: 200.0,
            pause_critical_ms: 1000.0,
            pressure: PressureThresholds::default(),
        }
    }
}

/// Evaluates the latest snapshot, trends and GC history against thresholds.
#[derive(Debug, Clone, Default)]
pub struct AlertEngine {
    thresholds: Thresholds,
    alerts: Vec<Alert>,
}

impl AlertEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            alerts: Vec::new(),
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Alerts from the last `analyze` call, most severe first.
    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    /// Replace the alert list with the alerts that hold for this tick.
    pub fn analyze(
        &mut self,
        snapshot: &Snapshot,
        trends: &BTreeMap<String, Trend>,
        gc_overhead: f64,
        gc: &GcEventReconstructor,
    ) -> &[Alert] {
        let mut alerts = Vec::new();
        let ts = snapshot.timestamp_ms;

        if !snapshot.connected {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                title: "Target disconnected".into(),
                description: snapshot
                    .error
                    .clone()
                    .unwrap_or_else(|| "No data received yet".into()),
                metric: "connection".into(),
                value: 0.0,
                threshold: 0.0,
                timestamp_ms: ts,
            });
            self.alerts = alerts;
            return &self.alerts;
        }

        let t = &self.thresholds;

        if let Some(ratio) = snapshot.heap_ratio() {
            if let Some(level) = level_for(ratio, t.heap_warning, t.heap_critical) {
                let heap = &snapshot.memory.heap;
                alerts.push(Alert {
                    level,
                    title: match level {
                        AlertLevel::Critical => "Critical heap usage",
                        _ => "High heap usage",
                    }
                    .into(),
                    description: format!(
                        "Heap at {} of maximum ({} / {})",
                        format_percent(ratio),
                        format_bytes(heap.used),
                        format_bytes(heap.max.unwrap_or_default())
                    ),
                    metric: "heap_usage".into(),
                    value: ratio,
                    threshold: threshold_for(level, t.heap_warning, t.heap_critical),
                    timestamp_ms: ts,
                });
            }
        }

        if let Some(level) = level_for(gc_overhead, t.gc_overhead_warning, t.gc_overhead_critical) {
            alerts.push(Alert {
                level,
                title: "High GC overhead".into(),
                description: format!(
                    "{} of process uptime spent in garbage collection",
                    format_percent(gc_overhead)
                ),
                metric: "gc_overhead".into(),
                value: gc_overhead,
                threshold: threshold_for(level, t.gc_overhead_warning, t.gc_overhead_critical),
                timestamp_ms: ts,
            });
        }

        if let Some(load) = snapshot.os.process_cpu_load {
            if let Some(level) = level_for(load, t.cpu_warning, t.cpu_critical) {
                alerts.push(Alert {
                    level,
                    title: "High CPU usage".into(),
                    description: format!("Process CPU load at {}", format_percent(load)),
                    metric: "cpu_load".into(),
                    value: load,
                    threshold: threshold_for(level, t.cpu_warning, t.cpu_critical),
                    timestamp_ms: ts,
                });
            }
        }

        let rising = |key: &str, threshold: f64| {
            trends
                .get(key)
                .map(|trend| trend.slope_per_minute)
                .filter(|slope| *slope >= threshold)
        };
        if let Some(slope) = rising(keys::HEAP_USED, t.heap_trend_per_minute) {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                title: "Heap usage rising".into(),
                description: format!("Heap growing at {}", format_byte_rate(slope, "min")),
                metric: "heap_trend".into(),
                value: slope,
                threshold: t.heap_trend_per_minute,
                timestamp_ms: ts,
            });
        }
        if let Some(slope) = rising(keys::CPU_LOAD, t.cpu_trend_per_minute) {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                title: "CPU load rising".into(),
                description: format!("CPU load growing by {} per minute", format_percent(slope)),
                metric: "cpu_trend".into(),
                value: slope,
                threshold: t.cpu_trend_per_minute,
                timestamp_ms: ts,
            });
        }
        if let Some(slope) = rising(keys::THREAD_COUNT, t.thread_trend_per_minute) {
            alerts.push(Alert {
                level: AlertLevel::Info,
                title: "Thread count rising".into(),
                description: format!("{:.1} new threads per minute", slope),
                metric: "thread_trend".into(),
                value: slope,
                threshold: t.thread_trend_per_minute,
                timestamp_ms: ts,
            });
        }

        let young = gc.frequency(ts, ONE_MINUTE, Some(Generation::Young));
        if young >= t.young_gc_per_minute {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                title: "Frequent young collections".into(),
                description: format!("{:.0} young collections in the last minute", young),
                metric: "young_gc_frequency".into(),
                value: young,
                threshold: t.young_gc_per_minute,
                timestamp_ms: ts,
            });
        }

        let old = gc.frequency(ts, ONE_MINUTE, Some(Generation::Old));
        if old >= t.old_gc_per_minute {
            alerts.push(Alert {
                level: AlertLevel::Critical,
                title: "Frequent full collections".into(),
                description: format!("{:.0} old-generation collections in the last minute", old),
                metric: "old_gc_frequency".into(),
                value: old,
                threshold: t.old_gc_per_minute,
                timestamp_ms: ts,
            });
        }

        let pause = gc.average_pause(ts, ONE_MINUTE, None);
        if let Some(level) = level_for(pause, t.pause_warning_ms, t.pause_critical_ms) {
            alerts.push(Alert {
                level,
                title: "Long GC pauses".into(),
                description: format!("Average pause {} over the last minute", format_millis(pause)),
                metric: "gc_pause".into(),
                value: pause,
                threshold: threshold_for(level, t.pause_warning_ms, t.pause_critical_ms),
                timestamp_ms: ts,
            });
        }

        // Stable: rules keep their evaluation order within a level
        alerts.sort_by(|a, b| b.level.cmp(&a.level));
        self.alerts = alerts;
        &self.alerts
    }
}

fn level_for(value: f64, warning: f64, critical: f64) -> Option<AlertLevel> {
    if value >= critical {
        Some(AlertLevel::Critical)
    } else if value >= warning {
        Some(AlertLevel::Warning)
    } else {
        None
    }
}

fn threshold_for(level: AlertLevel, warning: f64, critical: f64) -> f64 {
    match level {
        AlertLevel::Critical => critical,
        _ => warning,
    }
}
