//! # jvmwatch-types
//!
//! Core data model for JVM health monitoring. This crate defines the shapes
//! that flow through the jvmwatch pipeline: the generic attribute trees a
//! management source hands back, the immutable [`Snapshot`] assembled from
//! them each tick, and the derived [`GcEvent`] and [`Alert`] records.
//!
//! ## Features
//!
//! - `serde`: JSON/etc. serialization via serde. Required to read replay
//!   files or write diagnostic logs.
//!
//! ## Example
//!
//! ```rust
//! use jvmwatch_types::{Generation, Snapshot};
//!
//! let snapshot = Snapshot::builder()
//!     .timestamp_ms(1_703_160_000_000)
//!     .heap(900 * 1024 * 1024, 1000 * 1024 * 1024)
//!     .collector("G1 Young Generation", 12, 140)
//!     .uptime_ms(60_000)
//!     .build();
//!
//! assert!(snapshot.connected);
//! assert_eq!(snapshot.gc.totals(Generation::Young).unwrap().count, 12);
//! ```

mod alert;
mod attribute;
mod classify;
mod event;
pub mod format;
mod snapshot;

pub use alert::*;
pub use attribute::*;
pub use classify::*;
pub use event::*;
pub use snapshot::*;

/// Milliseconds since the Unix epoch, per the system clock.
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
