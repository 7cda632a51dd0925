//! Reconstructed garbage-collection events.

use crate::Generation;

/// A discrete collection, reconstructed from cumulative counters.
///
/// Events are derived only; the JVM never reports them individually. When
/// the JVM supplied a fresh detail record for exactly one collection the
/// event is `precise` and carries real before/after figures. Otherwise the
/// duration is an average over the tick and `collected_bytes` is zero.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GcEvent {
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: u64,
    pub generation: Generation,
    pub duration_ms: f64,
    pub before_bytes: u64,
    pub after_bytes: u64,
    pub collected_bytes: u64,
    pub precise: bool,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub collector: Option<String>,
}

impl GcEvent {
    /// An averaged event with no memory delta.
    pub fn estimated(
        timestamp_ms: u64,
        generation: Generation,
        duration_ms: f64,
        current_bytes: u64,
    ) -> Self {
        Self {
            timestamp_ms,
            generation,
            duration_ms,
            before_bytes: current_bytes,
            after_bytes: current_bytes,
            collected_bytes: 0,
            precise: false,
            collector: None,
        }
    }
}
