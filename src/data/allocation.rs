//! Allocation rate estimation from eden occupancy.

use jvmwatch_types::{PoolKind, Snapshot};

/// Estimates bytes allocated per second between consecutive snapshots.
///
/// New objects land in eden, so growth of eden usage between ticks is the
/// allocation. When eden shrank, a young collection emptied it in between
/// and the current usage is counted as allocated since then. This
/// undercounts ticks spanning a collection, never overcounts.
#[derive(Debug, Clone, Default)]
pub struct AllocationEstimator {
    last: Option<(u64, u64)>,
}

impl AllocationEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `snapshot` and return the rate since the previous one.
    ///
    /// `None` on the first observation, for disconnected snapshots, and for
    /// targets that expose no eden pool.
    pub fn observe(&mut self, snapshot: &Snapshot) -> Option<f64> {
        if !snapshot.connected {
            return None;
        }

        let mut eden_pools = snapshot.memory.pools_of(PoolKind::Eden).peekable();
        if eden_pools.peek().is_none() {
            self.last = None;
            return None;
        }
        let eden_used: u64 = eden_pools.map(|p| p.usage.used).sum();

        let (last_ts, last_used) = self.last.replace((snapshot.timestamp_ms, eden_used))?;
        let elapsed_ms = snapshot.timestamp_ms.checked_sub(last_ts).filter(|ms| *ms > 0)?;
        let allocated = if eden_used >= last_used {
            eden_used - last_used
        } else {
            eden_used
        };

        Some(allocated as f64 * 1000.0 / elapsed_ms as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;
    const MB: u64 = 1024 * 1024;

    fn with_eden(ts: u64, used: u64) -> Snapshot {
        Snapshot::builder()
            .timestamp_ms(ts)
            .pool("G1 Eden Space", used, None)
            .pool("G1 Old Gen", 100 * MB, Some(1024 * MB))
            .build()
    }

    #[test]
    fn test_rate_from_eden_growth() {
        let mut estimator = AllocationEstimator::new();
        assert_eq!(estimator.observe(&with_eden(T0, 10 * MB)), None);
        assert_eq!(
            estimator.observe(&with_eden(T0 + 2_000, 30 * MB)),
            Some(10.0 * MB as f64)
        );
    }

    #[test]
    fn test_collection_between_ticks() {
        let mut estimator = AllocationEstimator::new();
        estimator.observe(&with_eden(T0, 80 * MB));
        assert_eq!(
            estimator.observe(&with_eden(T0 + 1_000, 5 * MB)),
            Some(5.0 * MB as f64)
        );
    }

    #[test]
    fn test_no_eden_pool() {
        let mut estimator = AllocationEstimator::new();
        let snapshot = Snapshot::builder().timestamp_ms(T0).build();
        assert_eq!(estimator.observe(&snapshot), None);
        assert_eq!(estimator.observe(&snapshot), None);
    }

    #[test]
    fn test_disconnected_keeps_previous_observation() {
        let mut estimator = AllocationEstimator::new();
        estimator.observe(&with_eden(T0, 10 * MB));
        assert_eq!(
            estimator.observe(&Snapshot::disconnected(T0 + 1_000, None)),
            None
        );
        assert_eq!(
            estimator.observe(&with_eden(T0 + 4_000, 22 * MB)),
            Some(3.0 * MB as f64)
        );
    }
}
