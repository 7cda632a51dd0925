//! In-memory scripted data source.
//!
//! Holds a mutable table of management objects behind a shared handle, so a
//! test (or a demo driver) can change what the "JVM" reports between ticks
//! while the poller owns its own clone of the source.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use jvmwatch_types::{current_timestamp_ms, AttributeMap, AttributeValue};
use parking_lot::Mutex;

use super::{matches_pattern, objects, SnapshotSource};
use crate::error::SourceError;

#[derive(Debug, Default)]
struct ScriptState {
    objects: BTreeMap<String, AttributeMap>,
    /// Object names or patterns whose queries fail, with the error message.
    failures: BTreeMap<String, String>,
    connect_error: Option<String>,
    queries: Vec<String>,
    closed: bool,
}

impl ScriptState {
    /// Record the query and return an error if it is scripted to fail.
    fn begin_query(&mut self, object: &str) -> Result<(), SourceError> {
        self.queries.push(object.to_string());
        if self.closed {
            return Err(SourceError::Closed);
        }
        match self.failures.get(object) {
            Some(message) => Err(SourceError::query(object, message.clone())),
            None => Ok(()),
        }
    }
}

/// A data source whose answers are set programmatically.
///
/// Clones share state: keep one clone to script the target and hand the
/// other to the poller.
///
/// # Example
///
/// ```
/// use jvmwatch::ScriptedSource;
///
/// let source = ScriptedSource::sample_jvm("scripted");
/// let handle = source.clone();
///
/// // Simulate three young collections taking 30ms in total
/// handle.set_collector("G1 Young Generation", 13, 80);
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    state: Arc<Mutex<ScriptState>>,
    description: String,
}

impl ScriptedSource {
    /// Create an empty source that knows no objects.
    pub fn new(source_description: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState::default())),
            description: format!("scripted: {}", source_description),
        }
    }

    /// Create a source pre-populated with a plausible G1 JVM.
    pub fn sample_jvm(source_description: &str) -> Self {
        const MB: i64 = 1024 * 1024;
        let source = Self::new(source_description);

        let mut memory = AttributeMap::new();
        memory.insert(
            "HeapMemoryUsage".into(),
            usage_composite(256 * MB, 512 * MB, 1024 * MB),
        );
        memory.insert(
            "NonHeapMemoryUsage".into(),
            usage_composite(64 * MB, 80 * MB, -1),
        );
        source.set_object(objects::MEMORY, memory);

        source.set_pool("G1 Eden Space", 100 * MB, 200 * MB, -1);
        source.set_pool("G1 Survivor Space", 10 * MB, 16 * MB, -1);
        source.set_pool("G1 Old Gen", 146 * MB, 296 * MB, 1024 * MB);
        source.set_pool("Metaspace", 50 * MB, 52 * MB, -1);

        source.set_collector("G1 Young Generation", 10, 50);
        source.set_collector("G1 Old Generation", 0, 0);

        source.set_object(
            objects::THREADING,
            attributes([
                ("ThreadCount", 42u64.into()),
                ("DaemonThreadCount", 30u64.into()),
                ("PeakThreadCount", 45u64.into()),
                ("TotalStartedThreadCount", 120u64.into()),
            ]),
        );
        source.set_object(
            objects::CLASS_LOADING,
            attributes([
                ("LoadedClassCount", 8000u64.into()),
                ("TotalLoadedClassCount", 8100u64.into()),
                ("UnloadedClassCount", 100u64.into()),
            ]),
        );
        source.set_object(
            objects::OPERATING_SYSTEM,
            attributes([
                ("ProcessCpuLoad", 0.15f64.into()),
                ("SystemCpuLoad", 0.30f64.into()),
                ("AvailableProcessors", 8u64.into()),
                ("SystemLoadAverage", 1.5f64.into()),
            ]),
        );

        let uptime_ms = 600_000u64;
        source.set_object(
            objects::RUNTIME,
            attributes([
                ("Uptime", uptime_ms.into()),
                ("StartTime", (current_timestamp_ms() - uptime_ms).into()),
                ("VmName", "OpenJDK 64-Bit Server VM".into()),
                ("VmVendor", "Eclipse Adoptium".into()),
                ("VmVersion", "21.0.2+13".into()),
            ]),
        );

        source
    }

    /// Replace all attributes of an object.
    pub fn set_object(&self, name: &str, attrs: AttributeMap) {
        self.state.lock().objects.insert(name.to_string(), attrs);
    }

    /// Modify an object's attributes in place, creating it if needed.
    pub fn update_object<F>(&self, name: &str, f: F)
    where
        F: FnOnce(&mut AttributeMap),
    {
        let mut state = self.state.lock();
        f(state.objects.entry(name.to_string()).or_default());
    }

    pub fn remove_object(&self, name: &str) {
        self.state.lock().objects.remove(name);
    }

    /// Set a collector's cumulative counters, keeping any other attributes.
    pub fn set_collector(&self, name: &str, count: u64, time_ms: u64) {
        self.update_object(&collector_object(name), |attrs| {
            attrs.insert("Name".into(), name.into());
            attrs.insert("CollectionCount".into(), count.into());
            attrs.insert("CollectionTime".into(), time_ms.into());
            attrs.entry("LastGcInfo".into()).or_default();
        });
    }

    /// Attach a `LastGcInfo` composite to a collector.
    pub fn set_last_gc_info(&self, name: &str, info: AttributeMap) {
        self.update_object(&collector_object(name), |attrs| {
            attrs.insert("LastGcInfo".into(), AttributeValue::Map(info));
        });
    }

    pub fn set_pool(&self, name: &str, used: i64, committed: i64, max: i64) {
        self.set_object(
            &format!("java.lang:type=MemoryPool,name={}", name),
            attributes([
                ("Name", name.into()),
                ("Usage", usage_composite(used, committed, max)),
            ]),
        );
    }

    pub fn set_heap(&self, used: i64, committed: i64, max: i64) {
        self.update_object(objects::MEMORY, |attrs| {
            attrs.insert("HeapMemoryUsage".into(), usage_composite(used, committed, max));
        });
    }

    pub fn set_process_cpu_load(&self, load: f64) {
        self.update_object(objects::OPERATING_SYSTEM, |attrs| {
            attrs.insert("ProcessCpuLoad".into(), load.into());
        });
    }

    pub fn set_thread_count(&self, count: u64) {
        self.update_object(objects::THREADING, |attrs| {
            attrs.insert("ThreadCount".into(), count.into());
        });
    }

    pub fn set_runtime(&self, uptime_ms: u64, start_time_ms: u64) {
        self.update_object(objects::RUNTIME, |attrs| {
            attrs.insert("Uptime".into(), uptime_ms.into());
            attrs.insert("StartTime".into(), start_time_ms.into());
        });
    }

    /// Make every query for `object` (a name or a pattern) fail.
    pub fn fail(&self, object: &str, message: &str) {
        self.state
            .lock()
            .failures
            .insert(object.to_string(), message.to_string());
    }

    pub fn recover(&self, object: &str) {
        self.state.lock().failures.remove(object);
    }

    /// Make `test_connection` fail (or succeed again with `None`).
    pub fn refuse_connections(&self, message: Option<&str>) {
        self.state.lock().connect_error = message.map(str::to_string);
    }

    /// Names and patterns queried so far, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.state.lock().queries.clone()
    }

    pub fn clear_queries(&self) {
        self.state.lock().queries.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn query_one(&self, object: &str) -> Result<AttributeMap, SourceError> {
        let mut state = self.state.lock();
        state.begin_query(object)?;
        state
            .objects
            .get(object)
            .cloned()
            .ok_or_else(|| SourceError::query(object, "instance not found"))
    }

    async fn query_pattern(&self, pattern: &str) -> Result<Vec<AttributeMap>, SourceError> {
        let mut state = self.state.lock();
        state.begin_query(pattern)?;
        Ok(state
            .objects
            .iter()
            .filter(|(name, _)| matches_pattern(pattern, name))
            .map(|(_, attrs)| attrs.clone())
            .collect())
    }

    async fn test_connection(&self) -> Result<(), SourceError> {
        let state = self.state.lock();
        if state.closed {
            return Err(SourceError::Closed);
        }
        match &state.connect_error {
            Some(message) => Err(SourceError::Connection(message.clone())),
            None => Ok(()),
        }
    }

    async fn close(&self) {
        self.state.lock().closed = true;
    }

    fn description(&self) -> &str {
        &self.description
    }
}

fn collector_object(name: &str) -> String {
    format!("java.lang:type=GarbageCollector,name={}", name)
}

fn attributes<const N: usize>(entries: [(&str, AttributeValue); N]) -> AttributeMap {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Build a `MemoryUsage` composite. Pass `-1` for an undefined maximum.
pub fn usage_composite(used: i64, committed: i64, max: i64) -> AttributeValue {
    AttributeValue::Map(attributes([
        ("init", used.into()),
        ("used", used.into()),
        ("committed", committed.into()),
        ("max", max.into()),
    ]))
}

/// Build a `LastGcInfo` composite with per-pool used bytes before and after.
///
/// Usage tables are encoded as `{key, value}` rows, the tabular shape.
pub fn gc_info_composite(
    id: u64,
    start_offset_ms: u64,
    end_offset_ms: u64,
    before: &[(&str, i64)],
    after: &[(&str, i64)],
) -> AttributeMap {
    let table = |rows: &[(&str, i64)]| {
        AttributeValue::Sequence(
            rows.iter()
                .map(|(pool, used)| {
                    AttributeValue::Map(attributes([
                        ("key", (*pool).into()),
                        ("value", usage_composite(*used, *used, -1)),
                    ]))
                })
                .collect(),
        )
    };

    attributes([
        ("id", id.into()),
        ("duration", end_offset_ms.saturating_sub(start_offset_ms).into()),
        ("startTime", start_offset_ms.into()),
        ("endTime", end_offset_ms.into()),
        ("memoryUsageBeforeGc", table(before)),
        ("memoryUsageAfterGc", table(after)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use jvmwatch_types::AttributeMapExt;

    #[tokio::test]
    async fn test_query_one_returns_object() {
        let source = ScriptedSource::sample_jvm("test");
        let threading = source.query_one(objects::THREADING).await.unwrap();
        assert_eq!(threading.u64_attr("ThreadCount").unwrap(), 42);
    }

    #[tokio::test]
    async fn test_query_pattern_filters_by_name() {
        let source = ScriptedSource::sample_jvm("test");
        let pools = source.query_pattern(objects::MEMORY_POOLS).await.unwrap();
        assert_eq!(pools.len(), 4);
        let collectors = source
            .query_pattern(objects::GARBAGE_COLLECTORS)
            .await
            .unwrap();
        assert_eq!(collectors.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_object_fails() {
        let source = ScriptedSource::new("empty");
        let err = source.query_one(objects::MEMORY).await.unwrap_err();
        assert!(matches!(err, SourceError::Query { .. }));
    }

    #[tokio::test]
    async fn test_scripted_failure_and_recovery() {
        let source = ScriptedSource::sample_jvm("test");
        source.fail(objects::RUNTIME, "connection reset");
        assert!(source.query_one(objects::RUNTIME).await.is_err());

        source.recover(objects::RUNTIME);
        assert!(source.query_one(objects::RUNTIME).await.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_state_and_log_queries() {
        let source = ScriptedSource::sample_jvm("test");
        let handle = source.clone();

        handle.set_thread_count(99);
        let threading = source.query_one(objects::THREADING).await.unwrap();
        assert_eq!(threading.u64_attr("ThreadCount").unwrap(), 99);
        assert_eq!(handle.queries(), vec![objects::THREADING.to_string()]);
    }

    #[tokio::test]
    async fn test_connection_refusal_and_close() {
        let source = ScriptedSource::sample_jvm("test");
        assert!(source.test_connection().await.is_ok());

        source.refuse_connections(Some("no route to host"));
        assert!(matches!(
            source.test_connection().await,
            Err(SourceError::Connection(_))
        ));

        source.refuse_connections(None);
        source.close().await;
        assert!(source.is_closed());
        assert_eq!(
            source.query_one(objects::MEMORY).await,
            Err(SourceError::Closed)
        );
    }

    #[test]
    fn test_description() {
        let source = ScriptedSource::new("unit");
        assert_eq!(source.description(), "scripted: unit");
    }
}
