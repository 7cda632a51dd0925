//! Replay data source.
//!
//! Reads a recording of management data from a JSON file and plays it back
//! one frame at a time. The file holds an array of frames; each frame maps
//! object names to either their attributes or a scripted failure:
//!
//! ```json
//! [
//!   { "java.lang:type=Memory": { "HeapMemoryUsage": { "used": 1024, "committed": 2048, "max": 4096 } } },
//!   { "java.lang:type=Memory": { "$error": "connection reset" } }
//! ]
//! ```
//!
//! The cursor advances when a name already queried in the current frame is
//! queried again, which is what happens when the next poll tick begins. The
//! last frame repeats forever.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jvmwatch_types::AttributeMap;
use parking_lot::Mutex;
use serde::Deserialize;

use super::{matches_pattern, SnapshotSource};
use crate::error::SourceError;

/// One recorded answer for an object name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FrameEntry {
    /// Queries for this name fail with the given message.
    Failed {
        #[serde(rename = "$error")]
        error: String,
    },
    Attributes(AttributeMap),
}

/// Object name (or pattern, for failures) to recorded answer.
pub type Frame = BTreeMap<String, FrameEntry>;

#[derive(Debug, Default)]
struct Cursor {
    index: usize,
    seen: BTreeSet<String>,
}

/// A data source that replays recorded frames.
#[derive(Debug)]
pub struct ReplaySource {
    path: Option<PathBuf>,
    description: String,
    frames: Vec<Frame>,
    cursor: Mutex<Cursor>,
    closed: Mutex<bool>,
}

impl ReplaySource {
    /// Load a recording from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path)
            .map_err(|e| SourceError::Connection(format!("Read error: {}", e)))?;
        let mut source = Self::from_json(&content)?;
        source.description = format!("replay: {}", path.display());
        source.path = Some(path);
        Ok(source)
    }

    /// Parse a recording from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, SourceError> {
        let frames: Vec<Frame> = serde_json::from_str(json)
            .map_err(|e| SourceError::Connection(format!("Parse error: {}", e)))?;
        Ok(Self::from_frames(frames))
    }

    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self {
            path: None,
            description: format!("replay: {} frames", frames.len()),
            frames,
            cursor: Mutex::new(Cursor::default()),
            closed: Mutex::new(false),
        }
    }

    /// Returns the recording path, if loaded from disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Index of the frame currently being served.
    pub fn frame_index(&self) -> usize {
        self.cursor.lock().index
    }

    /// Move the cursor for a query of `key` and return the frame to answer from.
    fn frame_for(&self, key: &str) -> Result<&Frame, SourceError> {
        if *self.closed.lock() {
            return Err(SourceError::Closed);
        }

        let mut cursor = self.cursor.lock();
        if cursor.seen.contains(key) && cursor.index + 1 < self.frames.len() {
            cursor.index += 1;
            cursor.seen.clear();
        }
        cursor.seen.insert(key.to_string());

        self.frames
            .get(cursor.index)
            .ok_or_else(|| SourceError::query(key, "recording is empty"))
    }
}

#[async_trait]
impl SnapshotSource for ReplaySource {
    async fn query_one(&self, object: &str) -> Result<AttributeMap, SourceError> {
        let frame = self.frame_for(object)?;
        match frame.get(object) {
            Some(FrameEntry::Attributes(attrs)) => Ok(attrs.clone()),
            Some(FrameEntry::Failed { error }) => Err(SourceError::query(object, error.clone())),
            None => Err(SourceError::query(object, "instance not found")),
        }
    }

    async fn query_pattern(&self, pattern: &str) -> Result<Vec<AttributeMap>, SourceError> {
        let frame = self.frame_for(pattern)?;
        if let Some(FrameEntry::Failed { error }) = frame.get(pattern) {
            return Err(SourceError::query(pattern, error.clone()));
        }

        let mut matched = Vec::new();
        for (name, entry) in frame.iter().filter(|(name, _)| matches_pattern(pattern, name)) {
            match entry {
                FrameEntry::Attributes(attrs) => matched.push(attrs.clone()),
                FrameEntry::Failed { error } => {
                    return Err(SourceError::query(name, error.clone()));
                }
            }
        }
        Ok(matched)
    }

    async fn test_connection(&self) -> Result<(), SourceError> {
        if *self.closed.lock() {
            return Err(SourceError::Closed);
        }
        if self.frames.is_empty() {
            return Err(SourceError::Connection("recording has no frames".into()));
        }
        Ok(())
    }

    async fn close(&self) {
        *self.closed.lock() = true;
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::objects;
    use jvmwatch_types::AttributeMapExt;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_json() -> &'static str {
        r#"[
            {
                "java.lang:type=Threading": { "ThreadCount": 10 },
                "java.lang:type=MemoryPool,name=Eden": { "Name": "Eden" },
                "java.lang:type=MemoryPool,name=Old": { "Name": "Old" }
            },
            {
                "java.lang:type=Threading": { "ThreadCount": 20 },
                "java.lang:type=MemoryPool,name=*": { "$error": "pool lookup failed" }
            }
        ]"#
    }

    #[tokio::test]
    async fn test_requery_advances_frame() {
        let source = ReplaySource::from_json(sample_json()).unwrap();
        assert_eq!(source.frame_count(), 2);

        let first = source.query_one(objects::THREADING).await.unwrap();
        assert_eq!(first.u64_attr("ThreadCount").unwrap(), 10);
        assert_eq!(source.frame_index(), 0);

        let second = source.query_one(objects::THREADING).await.unwrap();
        assert_eq!(second.u64_attr("ThreadCount").unwrap(), 20);

        // Last frame repeats
        let third = source.query_one(objects::THREADING).await.unwrap();
        assert_eq!(third.u64_attr("ThreadCount").unwrap(), 20);
        assert_eq!(source.frame_index(), 1);
    }

    #[tokio::test]
    async fn test_pattern_matches_frame_names() {
        let source = ReplaySource::from_json(sample_json()).unwrap();
        let pools = source.query_pattern(objects::MEMORY_POOLS).await.unwrap();
        let names: Vec<&str> = pools.iter().map(|p| p.str_attr("Name").unwrap()).collect();
        assert_eq!(names, vec!["Eden", "Old"]);
    }

    #[tokio::test]
    async fn test_recorded_failure() {
        let source = ReplaySource::from_json(sample_json()).unwrap();
        source.query_pattern(objects::MEMORY_POOLS).await.unwrap();

        let err = source
            .query_pattern(objects::MEMORY_POOLS)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SourceError::query(objects::MEMORY_POOLS, "pool lookup failed")
        );
    }

    #[tokio::test]
    async fn test_missing_object() {
        let source = ReplaySource::from_json(sample_json()).unwrap();
        let err = source.query_one(objects::RUNTIME).await.unwrap_err();
        assert!(matches!(err, SourceError::Query { .. }));
    }

    #[tokio::test]
    async fn test_empty_recording_refuses_connection() {
        let source = ReplaySource::from_frames(Vec::new());
        assert!(source.test_connection().await.is_err());
    }

    #[tokio::test]
    async fn test_closed_source() {
        let source = ReplaySource::from_json(sample_json()).unwrap();
        source.close().await;
        assert_eq!(
            source.query_one(objects::THREADING).await,
            Err(SourceError::Closed)
        );
    }

    #[test]
    fn test_open_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", sample_json()).unwrap();

        let source = ReplaySource::open(file.path()).unwrap();
        assert_eq!(source.path(), Some(file.path()));
        assert!(source.description().starts_with("replay: "));
    }

    #[test]
    fn test_open_missing_file() {
        let err = ReplaySource::open("/nonexistent/recording.json").unwrap_err();
        assert!(err.to_string().contains("Read error"));
    }

    #[test]
    fn test_open_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid json").unwrap();

        let err = ReplaySource::open(file.path()).unwrap_err();
        assert!(err.to_string().contains("Parse error"));
    }
}
