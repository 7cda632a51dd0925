//! Snapshot source abstraction.
//!
//! A snapshot source is whatever speaks the target JVM's management protocol.
//! The pipeline treats it as an opaque capability: given an object name or
//! pattern it returns attribute trees, or fails. Two implementations ship
//! with the crate: [`ScriptedSource`] (in-memory, mutable from tests) and
//! [`ReplaySource`] (recorded frames read from a JSON file).

mod replay;
mod scripted;

pub use replay::{Frame, FrameEntry, ReplaySource};
pub use scripted::{gc_info_composite, usage_composite, ScriptedSource};

use std::fmt::Debug;

use async_trait::async_trait;
use jvmwatch_types::AttributeMap;

use crate::error::SourceError;

/// Well-known management object names, queried in this order every tick.
pub mod objects {
    pub const MEMORY: &str = "java.lang:type=Memory";
    pub const MEMORY_POOLS: &str = "java.lang:type=MemoryPool,name=*";
    pub const GARBAGE_COLLECTORS: &str = "java.lang:type=GarbageCollector,name=*";
    pub const THREADING: &str = "java.lang:type=Threading";
    pub const CLASS_LOADING: &str = "java.lang:type=ClassLoading";
    pub const OPERATING_SYSTEM: &str = "java.lang:type=OperatingSystem";
    pub const RUNTIME: &str = "java.lang:type=Runtime";
}

/// Trait for querying management data from a target JVM.
///
/// All calls for one tick are made sequentially from a single task, so
/// implementations may share one connection. Calls should be bounded by the
/// implementation's own timeout.
///
/// # Example
///
/// ```
/// use jvmwatch::{ScriptedSource, SnapshotSource};
///
/// # tokio_test::block_on(async {
/// let source = ScriptedSource::sample_jvm("test");
/// let memory = source.query_one("java.lang:type=Memory").await.unwrap();
/// assert!(memory.contains_key("HeapMemoryUsage"));
/// # });
/// ```
#[async_trait]
pub trait SnapshotSource: Send + Sync + Debug {
    /// Fetch every attribute of one named object.
    async fn query_one(&self, object: &str) -> Result<AttributeMap, SourceError>;

    /// Fetch the attributes of every object whose name matches `pattern`.
    async fn query_pattern(&self, pattern: &str) -> Result<Vec<AttributeMap>, SourceError>;

    /// Verify that the target is reachable.
    async fn test_connection(&self) -> Result<(), SourceError>;

    /// Release any resources held by the source.
    async fn close(&self);

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;
}

/// Match an object name against a pattern where `*` matches any run of
/// characters (including none).
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    let mut parts = pattern.split('*');
    let head = parts.next().unwrap_or("");
    let Some(mut rest) = name.strip_prefix(head) else {
        return false;
    };

    let parts: Vec<&str> = parts.collect();
    let Some((tail, middle)) = parts.split_last() else {
        // No wildcard at all
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.len() >= tail.len() && rest.ends_with(tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_without_wildcard_is_exact() {
        assert!(matches_pattern("java.lang:type=Memory", "java.lang:type=Memory"));
        assert!(!matches_pattern(
            "java.lang:type=Memory",
            "java.lang:type=MemoryPool,name=Metaspace"
        ));
    }

    #[test]
    fn trailing_wildcard_matches_any_suffix() {
        let pattern = objects::MEMORY_POOLS;
        assert!(matches_pattern(
            pattern,
            "java.lang:type=MemoryPool,name=G1 Eden Space"
        ));
        assert!(!matches_pattern(pattern, "java.lang:type=Memory"));
        assert!(!matches_pattern(
            pattern,
            "java.lang:type=GarbageCollector,name=G1 Young Generation"
        ));
    }

    #[test]
    fn inner_wildcards_match_in_order() {
        assert!(matches_pattern("a*c*e", "abcde"));
        assert!(matches_pattern("a*c*e", "ace"));
        assert!(!matches_pattern("a*c*e", "aec"));
        assert!(matches_pattern("*", ""));
    }
}
