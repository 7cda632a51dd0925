//! Name-based classification of garbage collectors and memory pools.
//!
//! The JVM exposes collectors and pools by display name only, and every GC
//! algorithm names them differently. Classification is a case-insensitive
//! substring match against ordered tables; the first matching row wins.
//! Supporting a new collector is a table edit.

/// GC generation a collector or pool belongs to.
///
/// `Concurrent` collectors report background cycles that run alongside the
/// application, not stop-the-world pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Generation {
    Young,
    Old,
    Concurrent,
}

impl Generation {
    /// Generations whose collections pause the application.
    pub const PAUSING: [Generation; 2] = [Generation::Young, Generation::Old];

    pub fn label(&self) -> &'static str {
        match self {
            Generation::Young => "young",
            Generation::Old => "old",
            Generation::Concurrent => "concurrent",
        }
    }

    pub fn is_pause(&self) -> bool {
        !matches!(self, Generation::Concurrent)
    }
}

/// Role of a memory pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PoolKind {
    Eden,
    Survivor,
    Old,
    Metaspace,
    CompressedClassSpace,
    CodeCache,
    Other,
}

impl PoolKind {
    /// Generation this pool is collected with, if it lives in the heap.
    pub fn generation(&self) -> Option<Generation> {
        match self {
            PoolKind::Eden | PoolKind::Survivor => Some(Generation::Young),
            PoolKind::Old => Some(Generation::Old),
            _ => None,
        }
    }

    pub fn is_heap(&self) -> bool {
        self.generation().is_some()
    }
}

/// Collector name fragments, in match order.
pub const COLLECTOR_TABLE: &[(&str, Generation)] = &[
    // JDK 20+ G1 marking, ZGC and Shenandoah cycle beans
    ("concurrent gc", Generation::Concurrent),
    ("cycles", Generation::Concurrent),
    // Serial, Parallel, ParNew
    ("copy", Generation::Young),
    ("scavenge", Generation::Young),
    ("parnew", Generation::Young),
    // G1, generational ZGC and Shenandoah
    ("young", Generation::Young),
    ("minor", Generation::Young),
    ("old", Generation::Old),
    ("mixed", Generation::Old),
    ("major", Generation::Old),
    ("marksweep", Generation::Old),
];

/// Pool name fragments, in match order.
pub const POOL_TABLE: &[(&str, PoolKind)] = &[
    ("eden", PoolKind::Eden),
    ("survivor", PoolKind::Survivor),
    ("young gen", PoolKind::Eden),
    ("old gen", PoolKind::Old),
    ("tenured", PoolKind::Old),
    ("compressed class", PoolKind::CompressedClassSpace),
    ("metaspace", PoolKind::Metaspace),
    ("perm gen", PoolKind::Metaspace),
    ("code", PoolKind::CodeCache),
];

fn lookup<T: Copy>(name: &str, table: &[(&str, T)]) -> Option<T> {
    let lowered = name.to_ascii_lowercase();
    table
        .iter()
        .find(|(fragment, _)| lowered.contains(fragment))
        .map(|(_, value)| *value)
}

/// Classify a collector by name.
///
/// Cycle collectors ("G1 Concurrent GC", "ZGC Minor Cycles",
/// "Shenandoah Cycles") are concurrent. Unrecognized collectors (e.g.
/// "ZGC Pauses", "Shenandoah Pauses") pause for the whole heap and count as
/// old generation.
pub fn classify_collector(name: &str) -> Generation {
    lookup(name, COLLECTOR_TABLE).unwrap_or(Generation::Old)
}

/// Classify a memory pool by name.
pub fn classify_pool(name: &str) -> PoolKind {
    lookup(name, POOL_TABLE).unwrap_or(PoolKind::Other)
}
