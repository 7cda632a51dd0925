//! One monitored target: a poller wired to a metrics processor.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use jvmwatch_types::{Alert, GcEvent, Snapshot};
use tracing::info;

use crate::config::JvmwatchConfig;
use crate::data::{HistoricalPoint, Metrics, MetricsHandle, MetricsProcessor};
use crate::diagnostics::DiagnosticLog;
use crate::poller::{PollHandle, Poller, SnapshotObserver};
use crate::source::SnapshotSource;

/// Polls one JVM and keeps its derived metrics current.
///
/// Several monitors can run side by side in one process; they share no state.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use jvmwatch::{JvmwatchConfig, Monitor, ScriptedSource};
///
/// # tokio_test::block_on(async {
/// let source = Arc::new(ScriptedSource::sample_jvm("demo"));
/// let monitor = Monitor::connect(source, &JvmwatchConfig::default()).await.unwrap();
///
/// let metrics = monitor.tick().await.unwrap();
/// assert!(metrics.snapshot.connected);
/// assert_eq!(metrics.tick, 1);
/// # });
/// ```
#[derive(Debug)]
pub struct Monitor {
    poller: Poller,
    metrics: MetricsHandle,
    running: Option<PollHandle>,
}

impl Monitor {
    /// Test the connection and build the pipeline.
    ///
    /// Fails if the target is unreachable or the diagnostic log cannot be
    /// opened. Nothing is polled until [`start`](Self::start) or
    /// [`tick`](Self::tick) is called.
    pub async fn connect(source: Arc<dyn SnapshotSource>, config: &JvmwatchConfig) -> Result<Self> {
        config.validate()?;

        let poller = Poller::new(source)
            .with_interval(config.poller.interval())
            .with_query_timeout(config.poller.query_timeout());
        poller
            .connect()
            .await
            .with_context(|| format!("Could not connect to {}", poller.source().description()))?;

        let mut processor = MetricsProcessor::new(config);
        if let Some(path) = &config.diagnostic_log {
            let log = DiagnosticLog::open(path)
                .with_context(|| format!("Could not open diagnostic log {}", path.display()))?;
            info!(path = %path.display(), "Writing diagnostic log");
            processor = processor.with_diagnostic_log(log);
        }

        Ok(Self {
            poller,
            metrics: MetricsHandle::new(processor),
            running: None,
        })
    }

    /// Start background polling. Does nothing if already running.
    pub fn start(&mut self) {
        if self.running.is_none() {
            let observer: Box<dyn SnapshotObserver> = Box::new(self.metrics.clone());
            self.running = Some(self.poller.start(Some(observer)));
        }
    }

    /// Stop background polling and release the source.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop().await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| !r.is_finished())
    }

    /// Poll once on the calling task and process the result.
    ///
    /// Fails while background polling is running; [`stop`](Self::stop) it
    /// first.
    pub async fn tick(&self) -> Result<Arc<Metrics>> {
        ensure!(
            self.running.is_none(),
            "background polling is running, stop it before ticking manually"
        );
        let snapshot = self.poller.tick().await;
        Ok(self.metrics.process(snapshot))
    }

    pub fn interval(&self) -> Duration {
        self.poller.interval()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.poller.snapshot()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.metrics()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.metrics.alerts()
    }

    pub fn recent_events(&self, n: usize) -> Vec<GcEvent> {
        self.metrics.recent_events(n)
    }

    pub fn historical_series(&self, name: &str, window: Duration) -> Vec<HistoricalPoint> {
        self.metrics.historical_series(name, window)
    }

    /// A cloneable handle for readers on other tasks.
    pub fn handle(&self) -> MetricsHandle {
        self.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::series;
    use crate::error::SourceError;
    use crate::source::ScriptedSource;

    fn fast_config() -> JvmwatchConfig {
        let mut config = JvmwatchConfig::default();
        config.poller.interval_ms = 100;
        config
    }

    #[tokio::test]
    async fn test_connect_failure_is_setup_error() {
        let source = ScriptedSource::sample_jvm("test");
        source.refuse_connections(Some("connection refused"));

        let err = Monitor::connect(Arc::new(source), &fast_config())
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<SourceError>(),
            Some(&SourceError::Connection("connection refused".into()))
        );
    }

    #[tokio::test]
    async fn test_young_collections_become_events() {
        let source = ScriptedSource::sample_jvm("test");
        let monitor = Monitor::connect(Arc::new(source.clone()), &fast_config())
            .await
            .unwrap();

        monitor.tick().await.unwrap();
        source.set_collector("G1 Young Generation", 13, 80);
        let metrics = monitor.tick().await.unwrap();

        assert_eq!(metrics.events_emitted, 3);
        let events = monitor.recent_events(10);
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.duration_ms == 10.0));
        assert_eq!(monitor.historical_series(series::HEAP, Duration::from_secs(60)).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_polling_updates_metrics() {
        let source = ScriptedSource::sample_jvm("test");
        let mut monitor = Monitor::connect(Arc::new(source.clone()), &fast_config())
            .await
            .unwrap();

        monitor.start();
        assert!(monitor.is_running());
        tokio::time::sleep(Duration::from_millis(250)).await;
        monitor.stop().await;

        assert!(!monitor.is_running());
        assert!(monitor.metrics().tick >= 2);
        assert!(monitor.snapshot().connected);
        assert!(source.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_tick_refused_while_running() {
        let source = ScriptedSource::sample_jvm("test");
        let mut monitor = Monitor::connect(Arc::new(source), &fast_config())
            .await
            .unwrap();

        monitor.start();
        let err = monitor.tick().await.unwrap_err();
        assert!(err.to_string().contains("background polling is running"));

        monitor.stop().await;
        let ticked_in_background = monitor.metrics().tick;
        let metrics = monitor.tick().await.unwrap();
        assert_eq!(metrics.tick, ticked_in_background + 1);
    }

    #[tokio::test]
    async fn test_source_failure_surfaces_as_alert() {
        let source = ScriptedSource::sample_jvm("test");
        let monitor = Monitor::connect(Arc::new(source.clone()), &fast_config())
            .await
            .unwrap();

        source.fail(crate::source::objects::THREADING, "connection reset");
        let metrics = monitor.tick().await.unwrap();

        assert!(!metrics.snapshot.connected);
        assert_eq!(monitor.alerts().len(), 1);
        assert_eq!(monitor.alerts()[0].title, "Target disconnected");
    }

    #[tokio::test]
    async fn test_demo_recording_replays() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/recording.json");
        let source = crate::source::ReplaySource::open(path).unwrap();
        let monitor = Monitor::connect(Arc::new(source), &fast_config()).await.unwrap();

        let mut ticks = Vec::new();
        for _ in 0..20 {
            ticks.push(monitor.tick().await.unwrap());
        }

        // Frame 17 records a dropped connection
        let disconnected: Vec<u64> = ticks
            .iter()
            .filter(|m| !m.snapshot.connected)
            .map(|m| m.tick)
            .collect();
        assert_eq!(disconnected, vec![18]);

        // 25 young and 1 old collection across the recording, none lost to the gap
        let emitted: usize = ticks.iter().map(|m| m.events_emitted).sum();
        assert_eq!(emitted, 26);
        assert!(ticks[19].trends.contains_key(crate::data::trend::keys::HEAP_USED));
    }
}
