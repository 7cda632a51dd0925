//! Snapshot poller.
//!
//! Drives the source on a fixed interval and publishes one immutable
//! [`Snapshot`] per tick. Readers clone the published `Arc` under a read lock
//! and never see a half-collected snapshot.

mod collect;

pub use collect::{collect_snapshot, Section, SECTION_ORDER};

use std::sync::Arc;
use std::time::Duration;

use jvmwatch_types::Snapshot;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::SourceError;
use crate::source::SnapshotSource;

/// Called on the poll task after every published snapshot.
pub trait SnapshotObserver: Send {
    fn on_snapshot(&mut self, snapshot: &Arc<Snapshot>);
}

/// Polls a [`SnapshotSource`] and publishes snapshots.
///
/// Clones share the published snapshot and the source.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use jvmwatch::{Poller, ScriptedSource};
///
/// # tokio_test::block_on(async {
/// let poller = Poller::new(Arc::new(ScriptedSource::sample_jvm("demo")));
/// assert!(!poller.snapshot().connected);
///
/// poller.connect().await.unwrap();
/// let snapshot = poller.tick().await;
/// assert!(snapshot.connected);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Poller {
    source: Arc<dyn SnapshotSource>,
    published: Arc<RwLock<Arc<Snapshot>>>,
    interval: Duration,
    query_timeout: Duration,
}

impl Poller {
    /// Create a poller with a one second interval and five second query timeout.
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            source,
            published: Arc::new(RwLock::new(Arc::new(Snapshot::placeholder()))),
            interval: Duration::from_secs(1),
            query_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn source(&self) -> &Arc<dyn SnapshotSource> {
        &self.source
    }

    /// Check the target is reachable before polling starts.
    pub async fn connect(&self) -> Result<(), SourceError> {
        match self.source.test_connection().await {
            Ok(()) => {
                info!(source = self.source.description(), "Connected to target");
                Ok(())
            }
            Err(e) => {
                warn!(source = self.source.description(), error = %e, "Connection test failed");
                Err(e)
            }
        }
    }

    /// The most recently published snapshot.
    ///
    /// Before the first tick this is a disconnected placeholder.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.published.read().clone()
    }

    /// Run one collection cycle and publish its snapshot.
    pub async fn tick(&self) -> Arc<Snapshot> {
        let snapshot = Arc::new(collect_snapshot(self.source.as_ref(), self.query_timeout).await);
        *self.published.write() = snapshot.clone();
        snapshot
    }

    /// Start polling in a background task.
    ///
    /// The first tick fires immediately. Returns a handle that stops the
    /// task; dropping the handle also stops it.
    pub fn start(&self, observer: Option<Box<dyn SnapshotObserver>>) -> PollHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let poller = self.clone();
        let mut observer = observer;

        let task = tokio::spawn(async move {
            info!(
                source = poller.source.description(),
                interval_ms = poller.interval.as_millis() as u64,
                "Poller started"
            );

            let mut interval_timer = tokio::time::interval(poller.interval);
            interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval_timer.tick() => {
                        let snapshot = poller.tick().await;
                        if let Some(observer) = observer.as_mut() {
                            observer.on_snapshot(&snapshot);
                        }
                    }
                }
            }

            poller.source.close().await;
            info!(source = poller.source.description(), "Poller stopped");
        });

        PollHandle { stop_tx, task }
    }
}

/// Handle to a running poll task.
#[derive(Debug)]
pub struct PollHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Stop polling and wait for the source to be released.
    ///
    /// A tick already in progress is allowed to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Poll task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{objects, ScriptedSource};
    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Arc<Snapshot>>>>);

    impl SnapshotObserver for Recorder {
        fn on_snapshot(&mut self, snapshot: &Arc<Snapshot>) {
            self.0.lock().push(snapshot.clone());
        }
    }

    #[test]
    fn test_placeholder_before_first_tick() {
        let poller = Poller::new(Arc::new(ScriptedSource::sample_jvm("test")));
        let snapshot = poller.snapshot();
        assert!(!snapshot.connected);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn test_connect_reports_setup_failure() {
        let source = ScriptedSource::sample_jvm("test");
        source.refuse_connections(Some("connection refused"));
        let poller = Poller::new(Arc::new(source));

        let err = poller.connect().await.unwrap_err();
        assert_eq!(err, SourceError::Connection("connection refused".into()));
    }

    #[tokio::test]
    async fn test_tick_publishes_snapshot() {
        let poller = Poller::new(Arc::new(ScriptedSource::sample_jvm("test")));
        let ticked = poller.tick().await;

        assert!(ticked.connected);
        assert!(Arc::ptr_eq(&ticked, &poller.snapshot()));
        // Repeated reads between ticks see the same snapshot
        assert!(Arc::ptr_eq(&poller.snapshot(), &poller.snapshot()));
    }

    #[tokio::test]
    async fn test_failed_tick_recovers_on_next_tick() {
        let source = ScriptedSource::sample_jvm("test");
        let poller = Poller::new(Arc::new(source.clone()));

        source.fail(objects::MEMORY, "broken pipe");
        assert!(!poller.tick().await.connected);

        source.recover(objects::MEMORY);
        assert!(poller.tick().await.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_ticks_and_stop_closes_source() {
        let source = ScriptedSource::sample_jvm("test");
        let poller =
            Poller::new(Arc::new(source.clone())).with_interval(Duration::from_millis(100));
        let recorder = Recorder::default();

        let handle = poller.start(Some(Box::new(recorder.clone())));
        tokio::time::sleep(Duration::from_millis(350)).await;
        handle.stop().await;

        let seen = recorder.0.lock().len();
        assert!(seen >= 3, "expected at least 3 ticks, saw {}", seen);
        assert!(source.is_closed());
        assert!(poller.snapshot().connected);

        // No ticks after stop
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(recorder.0.lock().len(), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let source = ScriptedSource::sample_jvm("test");
        let poller =
            Poller::new(Arc::new(source.clone())).with_interval(Duration::from_millis(100));

        drop(poller.start(None));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(source.is_closed());
    }
}
