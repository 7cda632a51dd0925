//! Reconstruction of discrete GC events from cumulative counters.
//!
//! The JVM only reports running totals (collection count and time) per
//! collector, plus a detail record for the single most recent collection.
//! Each tick the reconstructor diffs the totals against the previous tick and
//! emits one event per collection that happened in between.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use jvmwatch_types::{GcDetail, GcEvent, Generation, GenerationTotals, Snapshot};
use serde::Deserialize;
use tracing::debug;

/// Default retention for reconstructed events.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(300);

/// Default age beyond which a detail record is ignored.
pub const DEFAULT_DETAIL_STALENESS: Duration = Duration::from_secs(30);

/// Window used for pressure classification and per-minute rates.
pub const ONE_MINUTE: Duration = Duration::from_secs(60);

/// Coarse classification of how hard the collector is working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PressureLevel {
    #[default]
    Low,
    Moderate,
    High,
    Critical,
}

impl PressureLevel {
    pub fn label(&self) -> &'static str {
        match self {
            PressureLevel::Low => "low",
            PressureLevel::Moderate => "moderate",
            PressureLevel::High => "high",
            PressureLevel::Critical => "critical",
        }
    }
}

/// Limits for one pressure level. Reaching any one of them is enough.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PressureBand {
    /// GC time as a fraction of uptime.
    pub overhead: f64,
    /// Longest pause in the last minute.
    pub max_pause_ms: f64,
    /// Collections in the last minute, all generations.
    pub per_minute: f64,
}

impl PressureBand {
    fn reached(&self, overhead: f64, max_pause_ms: f64, per_minute: f64) -> bool {
        overhead >= self.overhead || max_pause_ms >= self.max_pause_ms || per_minute >= self.per_minute
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PressureThresholds {
    pub moderate: PressureBand,
    pub high: PressureBand,
    pub critical: PressureBand,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            moderate: PressureBand {
                overhead: 0.05,
                max_pause_ms: 200.0,
                per_minute: 10.0,
            },
            high: PressureBand {
                overhead: 0.10,
                max_pause_ms: 500.0,
                per_minute: 30.0,
            },
            critical: PressureBand {
                overhead: 0.20,
                max_pause_ms: 1000.0,
                per_minute: 60.0,
            },
        }
    }
}

/// Aggregate statistics over a window of events.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GcSummary {
    pub young_per_minute: f64,
    pub old_per_minute: f64,
    pub average_pause_ms: f64,
    pub longest_pause_ms: f64,
    pub young_efficiency: f64,
    pub old_efficiency: f64,
    pub overall_efficiency: f64,
    pub events_in_window: usize,
}

/// Turns per-tick cumulative GC counters into discrete [`GcEvent`]s.
///
/// State is per instance, so several targets can be tracked side by side.
#[derive(Debug, Clone)]
pub struct GcEventReconstructor {
    /// Last seen totals per generation.
    baselines: BTreeMap<Generation, GenerationTotals>,
    /// Detail ids already observed, per collector.
    seen_detail_ids: BTreeMap<String, u64>,
    events: VecDeque<GcEvent>,
    retention_ms: u64,
    detail_staleness_ms: u64,
}

impl Default for GcEventReconstructor {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION, DEFAULT_DETAIL_STALENESS)
    }
}

impl GcEventReconstructor {
    pub fn new(retention: Duration, detail_staleness: Duration) -> Self {
        Self {
            baselines: BTreeMap::new(),
            seen_detail_ids: BTreeMap::new(),
            events: VecDeque::new(),
            retention_ms: retention.as_millis() as u64,
            detail_staleness_ms: detail_staleness.as_millis() as u64,
        }
    }

    /// Diff `snapshot` against the previous one and append new events.
    ///
    /// Returns the number of events emitted. Disconnected snapshots are
    /// ignored and leave the baselines untouched.
    pub fn process_snapshot(&mut self, snapshot: &Snapshot) -> usize {
        if !snapshot.connected {
            return 0;
        }

        let now = snapshot.timestamp_ms;
        let fresh_detail = self.fresh_detail(snapshot);
        let mut emitted = 0;

        for generation in Generation::PAUSING {
            let Some(current) = snapshot.gc.totals(generation) else {
                continue;
            };
            let Some(previous) = self.baselines.insert(generation, current) else {
                // First observation only establishes the baseline
                continue;
            };

            if current.count < previous.count {
                debug!(
                    generation = generation.label(),
                    previous = previous.count,
                    current = current.count,
                    "GC counter decreased, resetting baseline"
                );
                continue;
            }
            if current.count == previous.count {
                continue;
            }

            let delta = current.count - previous.count;
            let precise = fresh_detail.filter(|d| delta == 1 && d.generation == generation);
            match precise {
                Some(detail) => {
                    self.events.push_back(precise_event(detail, snapshot.runtime.start_time_ms));
                    emitted += 1;
                }
                None => {
                    let time_delta = current.time_ms.saturating_sub(previous.time_ms);
                    let duration_ms = time_delta as f64 / delta as f64;
                    let current_bytes = snapshot.memory.generation_used(generation);
                    for _ in 0..delta {
                        self.events.push_back(GcEvent::estimated(
                            now,
                            generation,
                            duration_ms,
                            current_bytes,
                        ));
                    }
                    emitted += delta as usize;
                }
            }
        }

        if let Some(detail) = &snapshot.gc.last_collection {
            self.seen_detail_ids.insert(detail.collector.clone(), detail.id);
        }
        self.prune(now);
        emitted
    }

    /// The snapshot's detail record, if it is recent and not yet seen.
    fn fresh_detail<'a>(&self, snapshot: &'a Snapshot) -> Option<&'a GcDetail> {
        let detail = snapshot.gc.last_collection.as_ref()?;
        if self.seen_detail_ids.get(&detail.collector) == Some(&detail.id) {
            return None;
        }
        let end_ms = detail.end_timestamp_ms(snapshot.runtime.start_time_ms);
        (snapshot.timestamp_ms.saturating_sub(end_ms) <= self.detail_staleness_ms).then_some(detail)
    }

    fn prune(&mut self, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.retention_ms);
        self.events.retain(|e| e.timestamp_ms >= cutoff);
    }

    /// All retained events in the order they were emitted.
    pub fn events(&self) -> impl Iterator<Item = &GcEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The last `n` emitted events, oldest first.
    pub fn recent_events(&self, n: usize) -> Vec<GcEvent> {
        let skip = self.events.len().saturating_sub(n);
        self.events.iter().skip(skip).cloned().collect()
    }

    fn in_window(
        &self,
        now_ms: u64,
        window: Duration,
        generation: Option<Generation>,
    ) -> impl Iterator<Item = &GcEvent> {
        let cutoff = now_ms.saturating_sub(window.as_millis() as u64);
        self.events.iter().filter(move |e| {
            e.timestamp_ms >= cutoff && generation.map_or(true, |g| e.generation == g)
        })
    }

    /// Events per minute within `window`, for one generation or all.
    pub fn frequency(&self, now_ms: u64, window: Duration, generation: Option<Generation>) -> f64 {
        let minutes = window.as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            return 0.0;
        }
        self.in_window(now_ms, window, generation).count() as f64 / minutes
    }

    /// Mean pause within `window`, or 0 with no events.
    pub fn average_pause(&self, now_ms: u64, window: Duration, generation: Option<Generation>) -> f64 {
        let (total, count) = self
            .in_window(now_ms, window, generation)
            .fold((0.0, 0usize), |(total, count), e| (total + e.duration_ms, count + 1));
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }

    pub fn longest_pause(&self, now_ms: u64, window: Duration, generation: Option<Generation>) -> f64 {
        self.in_window(now_ms, window, generation)
            .map(|e| e.duration_ms)
            .fold(0.0, f64::max)
    }

    /// Number of pauses within `window` at least `threshold_ms` long.
    pub fn pauses_exceeding(&self, now_ms: u64, window: Duration, threshold_ms: f64) -> usize {
        self.in_window(now_ms, window, None)
            .filter(|e| e.duration_ms >= threshold_ms)
            .count()
    }

    /// Bytes collected over bytes in use before collection.
    ///
    /// Only precise events carry real before/after figures. Returns 0 when
    /// there is no "before" data in the window.
    pub fn efficiency(&self, now_ms: u64, window: Duration, generation: Option<Generation>) -> f64 {
        let (collected, before) = self
            .in_window(now_ms, window, generation)
            .filter(|e| e.precise)
            .fold((0u64, 0u64), |(collected, before), e| {
                (collected + e.collected_bytes, before + e.before_bytes)
            });
        if before == 0 {
            0.0
        } else {
            collected as f64 / before as f64
        }
    }

    pub fn summary(&self, now_ms: u64, window: Duration) -> GcSummary {
        GcSummary {
            young_per_minute: self.frequency(now_ms, window, Some(Generation::Young)),
            old_per_minute: self.frequency(now_ms, window, Some(Generation::Old)),
            average_pause_ms: self.average_pause(now_ms, window, None),
            longest_pause_ms: self.longest_pause(now_ms, window, None),
            young_efficiency: self.efficiency(now_ms, window, Some(Generation::Young)),
            old_efficiency: self.efficiency(now_ms, window, Some(Generation::Old)),
            overall_efficiency: self.efficiency(now_ms, window, None),
            events_in_window: self.in_window(now_ms, window, None).count(),
        }
    }

    /// Classify GC pressure from overhead and the last minute of events.
    ///
    /// Levels are checked from critical down, so exactly one is returned.
    pub fn pressure(&self, now_ms: u64, overhead: f64, thresholds: &PressureThresholds) -> PressureLevel {
        let max_pause = self.longest_pause(now_ms, ONE_MINUTE, None);
        let per_minute = self.frequency(now_ms, ONE_MINUTE, None);

        [
            (PressureLevel::Critical, &thresholds.critical),
            (PressureLevel::High, &thresholds.high),
            (PressureLevel::Moderate, &thresholds.moderate),
        ]
        .into_iter()
        .find(|(_, band)| band.reached(overhead, max_pause, per_minute))
        .map_or(PressureLevel::Low, |(level, _)| level)
    }
}

fn precise_event(detail: &GcDetail, jvm_start_ms: u64) -> GcEvent {
    let before_bytes = detail.heap_used_before();
    let after_bytes = detail.heap_used_after();
    GcEvent {
        timestamp_ms: detail.end_timestamp_ms(jvm_start_ms),
        generation: detail.generation,
        duration_ms: detail.duration_ms as f64,
        before_bytes,
        after_bytes,
        collected_bytes: before_bytes.saturating_sub(after_bytes),
        precise: true,
        collector: Some(detail.collector.clone()),
    }
}
