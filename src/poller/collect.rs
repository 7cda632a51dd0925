//! Section collectors.
//!
//! One tick walks [`SECTION_ORDER`] against a draft snapshot. The first
//! failing section aborts the tick and the draft is discarded.

use std::collections::BTreeMap;
use std::time::Duration;

use jvmwatch_types::{
    classify_collector, current_timestamp_ms, AttributeError, AttributeMap, AttributeMapExt,
    AttributeValue, CollectorStats, GcDetail, MemoryPool, MemoryUsage, Snapshot,
};
use tracing::warn;

use crate::error::SourceError;
use crate::source::{objects, SnapshotSource};

/// A section of the snapshot, filled by one collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Memory,
    Pools,
    Gc,
    Threading,
    ClassLoading,
    Os,
    Runtime,
}

/// Collectors run in this order, sequentially, every tick.
pub const SECTION_ORDER: [Section; 7] = [
    Section::Memory,
    Section::Pools,
    Section::Gc,
    Section::Threading,
    Section::ClassLoading,
    Section::Os,
    Section::Runtime,
];

impl Section {
    pub fn name(&self) -> &'static str {
        match self {
            Section::Memory => "memory",
            Section::Pools => "pools",
            Section::Gc => "gc",
            Section::Threading => "threading",
            Section::ClassLoading => "class-loading",
            Section::Os => "os",
            Section::Runtime => "runtime",
        }
    }

    async fn collect(&self, queries: &Queries<'_>, draft: &mut Snapshot) -> Result<(), SourceError> {
        match self {
            Section::Memory => collect_memory(queries, draft).await,
            Section::Pools => collect_pools(queries, draft).await,
            Section::Gc => collect_gc(queries, draft).await,
            Section::Threading => collect_threading(queries, draft).await,
            Section::ClassLoading => collect_class_loading(queries, draft).await,
            Section::Os => collect_os(queries, draft).await,
            Section::Runtime => collect_runtime(queries, draft).await,
        }
    }
}

/// Source calls bounded by a per-query timeout.
struct Queries<'a> {
    source: &'a dyn SnapshotSource,
    timeout: Duration,
}

impl Queries<'_> {
    async fn one(&self, object: &str) -> Result<AttributeMap, SourceError> {
        tokio::time::timeout(self.timeout, self.source.query_one(object))
            .await
            .map_err(|_| SourceError::Timeout(object.to_string()))?
    }

    async fn pattern(&self, pattern: &str) -> Result<Vec<AttributeMap>, SourceError> {
        tokio::time::timeout(self.timeout, self.source.query_pattern(pattern))
            .await
            .map_err(|_| SourceError::Timeout(pattern.to_string()))?
    }
}

/// Run every collector once and assemble the tick's snapshot.
///
/// Never fails: a source failure yields a disconnected snapshot carrying the
/// error message.
pub async fn collect_snapshot(source: &dyn SnapshotSource, query_timeout: Duration) -> Snapshot {
    let timestamp_ms = current_timestamp_ms();
    let queries = Queries {
        source,
        timeout: query_timeout,
    };

    let mut draft = Snapshot {
        timestamp_ms,
        connected: true,
        ..Default::default()
    };

    for section in SECTION_ORDER {
        if let Err(e) = section.collect(&queries, &mut draft).await {
            warn!(
                source = source.description(),
                section = section.name(),
                error = %e,
                "Snapshot collection failed"
            );
            return Snapshot::disconnected(timestamp_ms, Some(e.to_string()));
        }
    }

    draft
}

async fn collect_memory(queries: &Queries<'_>, draft: &mut Snapshot) -> Result<(), SourceError> {
    let attrs = queries.one(objects::MEMORY).await?;
    let parse = || -> Result<(MemoryUsage, MemoryUsage), AttributeError> {
        Ok((
            MemoryUsage::from_composite(attrs.map_attr("HeapMemoryUsage")?)?,
            MemoryUsage::from_composite(attrs.map_attr("NonHeapMemoryUsage")?)?,
        ))
    };
    let (heap, non_heap) = parse().map_err(|e| SourceError::attribute(objects::MEMORY, e))?;
    draft.memory.heap = heap;
    draft.memory.non_heap = non_heap;
    Ok(())
}

async fn collect_pools(queries: &Queries<'_>, draft: &mut Snapshot) -> Result<(), SourceError> {
    let found = queries.pattern(objects::MEMORY_POOLS).await?;

    let mut pools = Vec::with_capacity(found.len());
    for attrs in &found {
        let parse = || -> Result<Option<MemoryPool>, AttributeError> {
            let name = attrs.str_attr("Name")?;
            // Invalid pools report a null usage
            let Some(usage) = attrs.opt_map_attr("Usage")? else {
                return Ok(None);
            };
            Ok(Some(MemoryPool::new(name, MemoryUsage::from_composite(usage)?)))
        };
        if let Some(pool) = parse().map_err(|e| SourceError::attribute(objects::MEMORY_POOLS, e))? {
            pools.push(pool);
        }
    }

    pools.sort_by(|a, b| a.name.cmp(&b.name));
    draft.memory.pools = pools;
    Ok(())
}

async fn collect_gc(queries: &Queries<'_>, draft: &mut Snapshot) -> Result<(), SourceError> {
    let found = queries.pattern(objects::GARBAGE_COLLECTORS).await?;

    let mut collectors = Vec::with_capacity(found.len());
    let mut details = Vec::new();
    for attrs in &found {
        let parse = || -> Result<(CollectorStats, Option<GcDetail>), AttributeError> {
            let name = attrs.str_attr("Name")?;
            let stats = CollectorStats::new(
                name,
                attrs.u64_attr("CollectionCount")?,
                attrs.u64_attr("CollectionTime")?,
            );
            let detail = match attrs.opt_map_attr("LastGcInfo")? {
                Some(info) => Some(parse_gc_detail(name, info)?),
                None => None,
            };
            Ok((stats, detail))
        };
        let (stats, detail) =
            parse().map_err(|e| SourceError::attribute(objects::GARBAGE_COLLECTORS, e))?;
        collectors.push(stats);
        details.extend(detail);
    }

    collectors.sort_by(|a, b| a.name.cmp(&b.name));
    draft.gc.collectors = collectors;
    draft.gc.last_collection = details
        .into_iter()
        .filter(|d| d.generation.is_pause())
        .max_by_key(|d| d.end_offset_ms);
    Ok(())
}

/// Parse a `LastGcInfo` composite for the named collector.
fn parse_gc_detail(collector: &str, info: &AttributeMap) -> Result<GcDetail, AttributeError> {
    Ok(GcDetail {
        collector: collector.to_string(),
        generation: classify_collector(collector),
        id: info.u64_attr("id")?,
        duration_ms: info.u64_attr("duration")?,
        start_offset_ms: info.u64_attr("startTime")?,
        end_offset_ms: info.u64_attr("endTime")?,
        before: parse_usage_table("memoryUsageBeforeGc", info.attr("memoryUsageBeforeGc")?)?,
        after: parse_usage_table("memoryUsageAfterGc", info.attr("memoryUsageAfterGc")?)?,
    })
}

fn parse_usage_table(
    name: &str,
    table: &AttributeValue,
) -> Result<BTreeMap<String, MemoryUsage>, AttributeError> {
    table
        .tabular_rows(name)?
        .into_iter()
        .map(|(pool, usage)| -> Result<_, AttributeError> {
            Ok((pool, MemoryUsage::from_composite(usage.expect_map(name)?)?))
        })
        .collect()
}

async fn collect_threading(queries: &Queries<'_>, draft: &mut Snapshot) -> Result<(), SourceError> {
    let attrs = queries.one(objects::THREADING).await?;
    let err = |e| SourceError::attribute(objects::THREADING, e);
    let threading = &mut draft.threading;
    threading.thread_count = attrs.u64_attr("ThreadCount").map_err(err)?;
    threading.daemon_thread_count = attrs.u64_attr("DaemonThreadCount").map_err(err)?;
    threading.peak_thread_count = attrs.u64_attr("PeakThreadCount").map_err(err)?;
    threading.total_started_thread_count = attrs.u64_attr("TotalStartedThreadCount").map_err(err)?;
    Ok(())
}

async fn collect_class_loading(
    queries: &Queries<'_>,
    draft: &mut Snapshot,
) -> Result<(), SourceError> {
    let attrs = queries.one(objects::CLASS_LOADING).await?;
    let err = |e| SourceError::attribute(objects::CLASS_LOADING, e);
    let classes = &mut draft.class_loading;
    classes.loaded_class_count = attrs.u64_attr("LoadedClassCount").map_err(err)?;
    classes.total_loaded_class_count = attrs.u64_attr("TotalLoadedClassCount").map_err(err)?;
    classes.unloaded_class_count = attrs.u64_attr("UnloadedClassCount").map_err(err)?;
    Ok(())
}

async fn collect_os(queries: &Queries<'_>, draft: &mut Snapshot) -> Result<(), SourceError> {
    let attrs = queries.one(objects::OPERATING_SYSTEM).await?;
    let err = |e| SourceError::attribute(objects::OPERATING_SYSTEM, e);

    // Negative loads mean the platform cannot report them
    let load = |name: &str| -> Result<Option<f64>, SourceError> {
        Ok(attrs.opt_f64_attr(name).map_err(err)?.filter(|v| *v >= 0.0))
    };

    let os = &mut draft.os;
    os.process_cpu_load = load("ProcessCpuLoad")?;
    os.system_cpu_load = match load("SystemCpuLoad")? {
        Some(v) => Some(v),
        None => load("CpuLoad")?,
    };
    os.available_processors = attrs.u64_attr("AvailableProcessors").map_err(err)?;
    os.system_load_average = load("SystemLoadAverage")?;
    Ok(())
}

async fn collect_runtime(queries: &Queries<'_>, draft: &mut Snapshot) -> Result<(), SourceError> {
    let attrs = queries.one(objects::RUNTIME).await?;
    let err = |e| SourceError::attribute(objects::RUNTIME, e);
    let text = |name: &str| -> Result<String, SourceError> {
        Ok(attrs.opt_str_attr(name).map_err(err)?.unwrap_or_default().to_string())
    };

    let runtime = &mut draft.runtime;
    runtime.uptime_ms = attrs.u64_attr("Uptime").map_err(err)?;
    runtime.start_time_ms = attrs.u64_attr("StartTime").map_err(err)?;
    runtime.vm_name = text("VmName")?;
    runtime.vm_vendor = text("VmVendor")?;
    runtime.vm_version = text("VmVersion")?;
    Ok(())
}
