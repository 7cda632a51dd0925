//! Historical series for trending.
//!
//! Every derived metric is kept as a capped, time-windowed sequence of
//! points, oldest first.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

/// Default maximum number of points kept per series.
pub const DEFAULT_MAX_POINTS: usize = 300;

/// Default maximum age of a point, relative to the newest insert.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(600);

/// Series recorded by the metrics processor each connected tick.
pub mod series {
    /// Fields `used`, `committed`, `max`.
    pub const HEAP: &str = "heap";
    /// Fields `used`, `committed`.
    pub const NON_HEAP: &str = "non_heap";
    pub const YOUNG_GEN_USED: &str = "young_gen_used";
    pub const OLD_GEN_USED: &str = "old_gen_used";
    pub const METASPACE_USED: &str = "metaspace_used";
    pub const GC_OVERHEAD: &str = "gc_overhead";
    pub const CPU_LOAD: &str = "cpu_load";
    pub const THREAD_COUNT: &str = "thread_count";
    pub const LOADED_CLASSES: &str = "loaded_classes";
    /// Bytes per second.
    pub const ALLOCATION_RATE: &str = "allocation_rate";
}

/// The value of a point: a single number or a bundle of named fields.
#[derive(Debug, Clone, PartialEq)]
pub enum PointValue {
    Scalar(f64),
    Fields(BTreeMap<String, f64>),
}

impl PointValue {
    pub fn fields<const N: usize>(entries: [(&str, f64); N]) -> Self {
        PointValue::Fields(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            PointValue::Scalar(v) => Some(*v),
            PointValue::Fields(_) => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        match self {
            PointValue::Fields(fields) => fields.get(name).copied(),
            PointValue::Scalar(_) => None,
        }
    }
}

impl From<f64> for PointValue {
    fn from(v: f64) -> Self {
        PointValue::Scalar(v)
    }
}

impl From<BTreeMap<String, f64>> for PointValue {
    fn from(fields: BTreeMap<String, f64>) -> Self {
        PointValue::Fields(fields)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalPoint {
    pub timestamp_ms: u64,
    pub value: PointValue,
}

/// Tracks historical data for trending.
#[derive(Debug, Clone)]
pub struct HistoricalStore {
    series: HashMap<String, VecDeque<HistoricalPoint>>,
    max_points: usize,
    max_age_ms: u64,
}

impl Default for HistoricalStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS, DEFAULT_MAX_AGE)
    }
}

impl HistoricalStore {
    pub fn new(max_points: usize, max_age: Duration) -> Self {
        Self {
            series: HashMap::new(),
            max_points: max_points.max(1),
            max_age_ms: max_age.as_millis() as u64,
        }
    }

    /// Append a point, then trim the series by count and by age.
    pub fn add_series(&mut self, name: &str, timestamp_ms: u64, value: impl Into<PointValue>) {
        let points = self.series.entry(name.to_string()).or_default();
        points.push_back(HistoricalPoint {
            timestamp_ms,
            value: value.into(),
        });

        while points.len() > self.max_points {
            points.pop_front();
        }

        let cutoff = timestamp_ms.saturating_sub(self.max_age_ms);
        while points.front().is_some_and(|p| p.timestamp_ms < cutoff) {
            points.pop_front();
        }
    }

    /// Points no older than `now_ms - window`, oldest first.
    pub fn recent(&self, name: &str, window: Duration, now_ms: u64) -> Vec<HistoricalPoint> {
        let cutoff = now_ms.saturating_sub(window.as_millis() as u64);
        self.series
            .get(name)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp_ms >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Project a series to `(timestamp, value)` pairs within `window`.
    ///
    /// With `field` set, multi-field points yield that field and points
    /// lacking it are skipped. Without it, only scalar points are returned.
    pub fn recent_values(
        &self,
        name: &str,
        field: Option<&str>,
        window: Duration,
        now_ms: u64,
    ) -> Vec<(u64, f64)> {
        self.recent(name, window, now_ms)
            .into_iter()
            .filter_map(|p| {
                let value = match field {
                    Some(field) => p.value.field(field),
                    None => p.value.as_scalar(),
                }?;
                Some((p.timestamp_ms, value))
            })
            .collect()
    }

    pub fn latest(&self, name: &str) -> Option<&HistoricalPoint> {
        self.series.get(name)?.back()
    }

    pub fn len(&self, name: &str) -> usize {
        self.series.get(name).map_or(0, VecDeque::len)
    }

    /// Names of all series with at least one point, sorted.
    pub fn series_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .series
            .iter()
            .filter(|(_, points)| !points.is_empty())
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn test_count_cap() {
        let mut store = HistoricalStore::new(3, Duration::from_secs(3600));
        for i in 0..5 {
            store.add_series("x", T0 + i * 1_000, i as f64);
        }

        assert_eq!(store.len("x"), 3);
        let values = store.recent_values("x", None, Duration::from_secs(3600), T0 + 4_000);
        assert_eq!(values, vec![(T0 + 2_000, 2.0), (T0 + 3_000, 3.0), (T0 + 4_000, 4.0)]);
    }

    #[test]
    fn test_age_trim_relative_to_insert() {
        let mut store = HistoricalStore::new(100, Duration::from_secs(10));
        store.add_series("x", T0, 1.0);
        store.add_series("x", T0 + 5_000, 2.0);
        store.add_series("x", T0 + 12_000, 3.0);

        assert_eq!(store.len("x"), 2);
        assert_eq!(store.latest("x").unwrap().value, PointValue::Scalar(3.0));
    }

    #[test]
    fn test_recent_filters_by_window() {
        let mut store = HistoricalStore::default();
        for i in 0..10 {
            store.add_series("x", T0 + i * 1_000, i as f64);
        }

        let now = T0 + 9_000;
        let recent = store.recent("x", Duration::from_secs(3), now);
        assert_eq!(recent.len(), 4);
        assert!(recent.iter().all(|p| p.timestamp_ms >= now - 3_000));
    }

    #[test]
    fn test_field_projection() {
        let mut store = HistoricalStore::default();
        store.add_series(
            series::HEAP,
            T0,
            PointValue::fields([("used", 100.0), ("max", 400.0)]),
        );
        store.add_series(
            series::HEAP,
            T0 + 1_000,
            PointValue::fields([("used", 200.0), ("max", 400.0)]),
        );

        let window = Duration::from_secs(60);
        assert_eq!(
            store.recent_values(series::HEAP, Some("used"), window, T0 + 1_000),
            vec![(T0, 100.0), (T0 + 1_000, 200.0)]
        );
        assert!(store
            .recent_values(series::HEAP, Some("committed"), window, T0 + 1_000)
            .is_empty());
        assert!(store.recent_values(series::HEAP, None, window, T0 + 1_000).is_empty());
    }

    #[test]
    fn test_unknown_series() {
        let store = HistoricalStore::default();
        assert!(store.recent("missing", Duration::from_secs(60), T0).is_empty());
        assert!(store.latest("missing").is_none());
        assert_eq!(store.len("missing"), 0);
    }

    #[test]
    fn test_series_names_sorted() {
        let mut store = HistoricalStore::default();
        store.add_series(series::THREAD_COUNT, T0, 10.0);
        store.add_series(series::CPU_LOAD, T0, 0.5);
        assert_eq!(store.series_names(), vec![series::CPU_LOAD, series::THREAD_COUNT]);
    }
}
