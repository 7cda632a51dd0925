//! Snapshot - a point-in-time view of a JVM's management data.

use std::collections::BTreeMap;

use crate::{
    classify_collector, classify_pool, current_timestamp_ms, AttributeError, AttributeMap,
    AttributeMapExt, Generation, PoolKind,
};

/// Usage of one memory region, in bytes.
///
/// `init` and `max` are `None` when the JVM reports them as undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryUsage {
    pub init: Option<u64>,
    pub used: u64,
    pub committed: u64,
    pub max: Option<u64>,
}

impl MemoryUsage {
    pub fn new(used: u64, committed: u64, max: Option<u64>) -> Self {
        Self {
            init: None,
            used,
            committed,
            max,
        }
    }

    /// Parse a `MemoryUsage` composite (`init`, `used`, `committed`, `max`).
    pub fn from_composite(map: &AttributeMap) -> Result<Self, AttributeError> {
        let defined = |v: i64| (v >= 0).then_some(v as u64);
        Ok(Self {
            init: match map.get("init") {
                Some(_) => defined(map.i64_attr("init")?),
                None => None,
            },
            used: map.u64_attr("used")?,
            committed: map.u64_attr("committed")?,
            max: defined(map.i64_attr("max")?),
        })
    }

    /// `used / max`, or `None` if the maximum is undefined or zero.
    pub fn usage_ratio(&self) -> Option<f64> {
        self.max
            .filter(|&max| max > 0)
            .map(|max| self.used as f64 / max as f64)
    }
}

/// A named memory pool with its classified role.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryPool {
    pub name: String,
    pub kind: PoolKind,
    pub usage: MemoryUsage,
}

impl MemoryPool {
    pub fn new(name: impl Into<String>, usage: MemoryUsage) -> Self {
        let name = name.into();
        Self {
            kind: classify_pool(&name),
            name,
            usage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemorySection {
    pub heap: MemoryUsage,
    pub non_heap: MemoryUsage,
    pub pools: Vec<MemoryPool>,
}

impl MemorySection {
    pub fn pools_of(&self, kind: PoolKind) -> impl Iterator<Item = &MemoryPool> {
        self.pools.iter().filter(move |p| p.kind == kind)
    }

    /// Summed usage of every heap pool collected with `generation`.
    pub fn generation_used(&self, generation: Generation) -> u64 {
        self.pools
            .iter()
            .filter(|p| p.kind.generation() == Some(generation))
            .map(|p| p.usage.used)
            .sum()
    }
}

/// Cumulative counters for one garbage collector.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollectorStats {
    pub name: String,
    pub generation: Generation,
    pub collection_count: u64,
    pub collection_time_ms: u64,
}

impl CollectorStats {
    pub fn new(name: impl Into<String>, collection_count: u64, collection_time_ms: u64) -> Self {
        let name = name.into();
        Self {
            generation: classify_collector(&name),
            name,
            collection_count,
            collection_time_ms,
        }
    }
}

/// Detail of the most recent collection, as reported by the JVM.
///
/// Start and end times are offsets from JVM start, not wall-clock times.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GcDetail {
    pub collector: String,
    pub generation: Generation,
    pub id: u64,
    pub duration_ms: u64,
    pub start_offset_ms: u64,
    pub end_offset_ms: u64,
    pub before: BTreeMap<String, MemoryUsage>,
    pub after: BTreeMap<String, MemoryUsage>,
}

impl GcDetail {
    /// Wall-clock end time given the JVM's start time.
    pub fn end_timestamp_ms(&self, jvm_start_ms: u64) -> u64 {
        jvm_start_ms + self.end_offset_ms
    }

    /// Heap bytes in use before the collection, summed over heap pools.
    pub fn heap_used_before(&self) -> u64 {
        sum_heap_used(&self.before)
    }

    pub fn heap_used_after(&self) -> u64 {
        sum_heap_used(&self.after)
    }

    pub fn collected_bytes(&self) -> u64 {
        self.heap_used_before().saturating_sub(self.heap_used_after())
    }
}

fn sum_heap_used(pools: &BTreeMap<String, MemoryUsage>) -> u64 {
    pools
        .iter()
        .filter(|(name, _)| classify_pool(name).is_heap())
        .map(|(_, usage)| usage.used)
        .sum()
}

/// Cumulative count and time for one generation, summed over its collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerationTotals {
    pub count: u64,
    pub time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GcSection {
    pub collectors: Vec<CollectorStats>,
    /// At most one detail record: the most recently finished collection.
    pub last_collection: Option<GcDetail>,
}

impl GcSection {
    /// Totals for `generation`, or `None` if no collector belongs to it.
    pub fn totals(&self, generation: Generation) -> Option<GenerationTotals> {
        self.collectors
            .iter()
            .filter(|c| c.generation == generation)
            .fold(None, |acc: Option<GenerationTotals>, c| {
                let acc = acc.unwrap_or_default();
                Some(GenerationTotals {
                    count: acc.count + c.collection_count,
                    time_ms: acc.time_ms + c.collection_time_ms,
                })
            })
    }

    /// Time spent in stop-the-world collections; concurrent cycles are excluded.
    pub fn total_time_ms(&self) -> u64 {
        self.pausing().map(|c| c.collection_time_ms).sum()
    }

    pub fn total_count(&self) -> u64 {
        self.pausing().map(|c| c.collection_count).sum()
    }

    fn pausing(&self) -> impl Iterator<Item = &CollectorStats> {
        self.collectors.iter().filter(|c| c.generation.is_pause())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThreadingSection {
    pub thread_count: u64,
    pub daemon_thread_count: u64,
    pub peak_thread_count: u64,
    pub total_started_thread_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassLoadingSection {
    pub loaded_class_count: u64,
    pub total_loaded_class_count: u64,
    pub unloaded_class_count: u64,
}

/// Operating-system view of the target process.
///
/// Loads are fractions in `0.0..=1.0`; `None` when the platform does not
/// report them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OsSection {
    pub process_cpu_load: Option<f64>,
    pub system_cpu_load: Option<f64>,
    pub available_processors: u64,
    pub system_load_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeSection {
    pub uptime_ms: u64,
    pub start_time_ms: u64,
    pub vm_name: String,
    pub vm_vendor: String,
    pub vm_version: String,
}

/// A point-in-time snapshot of a JVM's health.
///
/// Snapshots are immutable once published; each poll produces a new one.
/// A disconnected snapshot carries the error and empty sections, since
/// partially collected data is never published.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    /// Unix timestamp in milliseconds when this snapshot was taken.
    pub timestamp_ms: u64,
    pub connected: bool,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub error: Option<String>,
    pub memory: MemorySection,
    pub gc: GcSection,
    pub threading: ThreadingSection,
    pub class_loading: ClassLoadingSection,
    pub os: OsSection,
    pub runtime: RuntimeSection,
}

impl Snapshot {
    /// Placeholder published before the first poll completes.
    pub fn placeholder() -> Self {
        Self::disconnected(current_timestamp_ms(), None)
    }

    pub fn disconnected(timestamp_ms: u64, error: Option<String>) -> Self {
        Self {
            timestamp_ms,
            connected: false,
            error,
            ..Default::default()
        }
    }

    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    /// Heap `used / max`, if the heap maximum is defined.
    pub fn heap_ratio(&self) -> Option<f64> {
        self.memory.heap.usage_ratio()
    }

    /// Fraction of process uptime spent in GC.
    pub fn gc_overhead(&self) -> f64 {
        if self.runtime.uptime_ms == 0 {
            return 0.0;
        }
        self.gc.total_time_ms() as f64 / self.runtime.uptime_ms as f64
    }
}

/// Builder for connected snapshots, mostly for tests and replay tooling.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    timestamp_ms: Option<u64>,
    snapshot: Snapshot,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    pub fn heap(mut self, used: u64, max: u64) -> Self {
        self.snapshot.memory.heap = MemoryUsage::new(used, used, Some(max));
        self
    }

    pub fn heap_usage(mut self, usage: MemoryUsage) -> Self {
        self.snapshot.memory.heap = usage;
        self
    }

    pub fn non_heap(mut self, usage: MemoryUsage) -> Self {
        self.snapshot.memory.non_heap = usage;
        self
    }

    pub fn pool(mut self, name: &str, used: u64, max: Option<u64>) -> Self {
        self.snapshot
            .memory
            .pools
            .push(MemoryPool::new(name, MemoryUsage::new(used, used, max)));
        self
    }

    pub fn collector(mut self, name: &str, count: u64, time_ms: u64) -> Self {
        self.snapshot
            .gc
            .collectors
            .push(CollectorStats::new(name, count, time_ms));
        self
    }

    pub fn last_collection(mut self, detail: GcDetail) -> Self {
        self.snapshot.gc.last_collection = Some(detail);
        self
    }

    pub fn threads(mut self, count: u64) -> Self {
        self.snapshot.threading.thread_count = count;
        self.snapshot.threading.peak_thread_count =
            self.snapshot.threading.peak_thread_count.max(count);
        self
    }

    pub fn process_cpu_load(mut self, load: f64) -> Self {
        self.snapshot.os.process_cpu_load = Some(load);
        self
    }

    pub fn uptime_ms(mut self, uptime_ms: u64) -> Self {
        self.snapshot.runtime.uptime_ms = uptime_ms;
        self
    }

    pub fn start_time_ms(mut self, start_time_ms: u64) -> Self {
        self.snapshot.runtime.start_time_ms = start_time_ms;
        self
    }

    pub fn build(self) -> Snapshot {
        Snapshot {
            timestamp_ms: self.timestamp_ms.unwrap_or_else(current_timestamp_ms),
            connected: true,
            error: None,
            ..self.snapshot
        }
    }
}
