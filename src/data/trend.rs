//! Rate-of-change estimation over historical series.

use std::collections::BTreeMap;
use std::time::Duration;

use super::history::{series, HistoricalStore};

/// Default look-back window for trends.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(300);

/// Keys under which [`TrendEngine::compute_all`] reports trends.
pub mod keys {
    pub const HEAP_USED: &str = "heap_used";
    pub const OLD_GEN_USED: &str = "old_gen_used";
    pub const METASPACE_USED: &str = "metaspace_used";
    pub const CPU_LOAD: &str = "cpu_load";
    pub const THREAD_COUNT: &str = "thread_count";
}

/// A fitted linear trend.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Trend {
    /// Change in the series' unit per wall-clock minute.
    pub slope_per_minute: f64,
    /// Pearson correlation of value against sample index, in `-1.0..=1.0`.
    pub correlation: f64,
    pub samples: usize,
}

impl Trend {
    fn flat(samples: usize) -> Self {
        Self {
            samples,
            ..Self::default()
        }
    }
}

/// Fit a least-squares line to `points`, ordered oldest first.
///
/// Samples are regressed against their index rather than their timestamp,
/// so an irregular gap does not dominate the fit. The per-index slope is
/// then scaled by the real time covered: `n - 1` steps span the first to
/// last timestamp.
pub fn regress(points: &[(u64, f64)]) -> Trend {
    let n = points.len();
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Trend::flat(n);
    };
    let span_ms = last.0.saturating_sub(first.0);
    if n < 2 || span_ms == 0 {
        return Trend::flat(n);
    }
    if points.iter().all(|(_, y)| *y == first.1) {
        return Trend::flat(n);
    }

    let count = n as f64;
    let mean_x = (count - 1.0) / 2.0;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / count;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (i, (_, y)) in points.iter().enumerate() {
        let dx = i as f64 - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    let slope_per_index = sxy / sxx;
    let correlation = if syy > 0.0 {
        (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let span_minutes = span_ms as f64 / 60_000.0;

    Trend {
        slope_per_minute: slope_per_index * (count - 1.0) / span_minutes,
        correlation,
        samples: n,
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    key: String,
    series: String,
    field: Option<String>,
}

/// Computes trends for a registry of series.
#[derive(Debug, Clone)]
pub struct TrendEngine {
    window: Duration,
    tracked: Vec<Tracked>,
}

impl Default for TrendEngine {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl TrendEngine {
    /// Create an engine tracking heap, old generation, metaspace, CPU and
    /// thread count.
    pub fn new(window: Duration) -> Self {
        let mut engine = Self {
            window,
            tracked: Vec::new(),
        };
        engine.track(keys::HEAP_USED, series::HEAP, Some("used"));
        engine.track(keys::OLD_GEN_USED, series::OLD_GEN_USED, None);
        engine.track(keys::METASPACE_USED, series::METASPACE_USED, None);
        engine.track(keys::CPU_LOAD, series::CPU_LOAD, None);
        engine.track(keys::THREAD_COUNT, series::THREAD_COUNT, None);
        engine
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Register a series (or one field of a multi-field series) under `key`.
    ///
    /// Re-registering a key replaces the previous registration.
    pub fn track(&mut self, key: &str, series: &str, field: Option<&str>) {
        self.tracked.retain(|t| t.key != key);
        self.tracked.push(Tracked {
            key: key.to_string(),
            series: series.to_string(),
            field: field.map(str::to_string),
        });
    }

    /// Trend of one series over `window` ending at `now_ms`.
    pub fn slope(
        &self,
        store: &HistoricalStore,
        series: &str,
        field: Option<&str>,
        window: Duration,
        now_ms: u64,
    ) -> Trend {
        regress(&store.recent_values(series, field, window, now_ms))
    }

    /// Trends for every tracked series over the engine's window.
    pub fn compute_all(&self, store: &HistoricalStore, now_ms: u64) -> BTreeMap<String, Trend> {
        self.tracked
            .iter()
            .map(|t| {
                let trend = self.slope(store, &t.series, t.field.as_deref(), self.window, now_ms);
                (t.key.clone(), trend)
            })
            .collect()
    }
}
