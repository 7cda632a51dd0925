use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use jvmwatch::{JvmwatchConfig, Metrics, Monitor, ReplaySource};
use jvmwatch_types::format::{format_byte_rate, format_bytes, format_millis, format_percent};

#[derive(Parser, Debug)]
#[command(name = "jvmwatch")]
#[command(about = "Continuous JVM diagnostics: GC events, memory trends and alerts")]
struct Args {
    /// Recording to replay, one frame per tick
    #[arg(short, long)]
    replay: PathBuf,

    /// Config file (TOML, YAML or JSON); JVMWATCH_* variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Poll this many times and exit instead of running until Ctrl-C
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Override the poll interval in milliseconds
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Write the final metrics to a JSON file on exit
    #[arg(short, long)]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = JvmwatchConfig::load(args.config.as_deref())?;
    if let Some(ms) = args.interval_ms {
        config.poller.interval_ms = ms;
    }

    let source = ReplaySource::open(&args.replay)
        .with_context(|| format!("Could not load recording {}", args.replay.display()))?;
    let mut monitor = Monitor::connect(Arc::new(source), &config).await?;

    let metrics = match args.ticks {
        Some(ticks) => run_ticks(&monitor, ticks).await?,
        None => run_until_interrupted(&mut monitor).await?,
    };

    if let Some(path) = args.export {
        export_to_file(&metrics, &path)?;
        println!("Exported metrics to {}", path.display());
    }

    Ok(())
}

/// Poll on the main task a fixed number of times.
async fn run_ticks(monitor: &Monitor, ticks: u64) -> Result<Arc<Metrics>> {
    let mut metrics = monitor.metrics();
    for i in 0..ticks {
        if i > 0 {
            tokio::time::sleep(monitor.interval()).await;
        }
        metrics = monitor.tick().await?;
        print_summary(&metrics);
    }
    Ok(metrics)
}

/// Poll in the background and print a summary every interval until Ctrl-C.
async fn run_until_interrupted(monitor: &mut Monitor) -> Result<Arc<Metrics>> {
    monitor.start();

    let mut interval = tokio::time::interval(monitor.interval());
    let mut last_tick = 0;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            _ = interval.tick() => {
                let metrics = monitor.metrics();
                if metrics.tick != last_tick {
                    last_tick = metrics.tick;
                    print_summary(&metrics);
                }
            }
        }
    }

    monitor.stop().await;
    Ok(monitor.metrics())
}

fn print_summary(metrics: &Metrics) {
    let snapshot = &metrics.snapshot;
    if !snapshot.connected {
        println!(
            "[{:>4}] disconnected: {}",
            metrics.tick,
            snapshot.error.as_deref().unwrap_or("no data")
        );
        return;
    }

    let heap = &snapshot.memory.heap;
    println!(
        "[{:>4}] heap {} / {} ({})  gc {}  alloc {}  pressure {}  events +{}",
        metrics.tick,
        format_bytes(heap.used),
        heap.max.map(format_bytes).unwrap_or_else(|| "-".into()),
        metrics.heap_ratio.map(format_percent).unwrap_or_else(|| "-".into()),
        format_percent(metrics.gc_overhead),
        metrics
            .allocation_rate
            .map(|r| format_byte_rate(r, "s"))
            .unwrap_or_else(|| "-".into()),
        metrics.pressure.label(),
        metrics.events_emitted,
    );

    if metrics.gc_summary.events_in_window > 0 {
        println!(
            "       young {:.1}/min  old {:.1}/min  avg pause {}  max pause {}",
            metrics.gc_summary.young_per_minute,
            metrics.gc_summary.old_per_minute,
            format_millis(metrics.gc_summary.average_pause_ms),
            format_millis(metrics.gc_summary.longest_pause_ms),
        );
    }

    for alert in &metrics.alerts {
        println!("       {} {}: {}", alert.level.symbol(), alert.title, alert.description);
    }
}

/// Export the final metrics to a JSON file.
fn export_to_file(metrics: &Metrics, path: &Path) -> Result<()> {
    let snapshot = &metrics.snapshot;

    let trends: serde_json::Map<String, serde_json::Value> = metrics
        .trends
        .iter()
        .map(|(name, trend)| {
            (
                name.clone(),
                serde_json::json!({
                    "slope_per_minute": trend.slope_per_minute,
                    "correlation": trend.correlation,
                    "samples": trend.samples,
                }),
            )
        })
        .collect();

    let summary = &metrics.gc_summary;
    let export = serde_json::json!({
        "tick": metrics.tick,
        "timestamp_ms": snapshot.timestamp_ms,
        "connected": snapshot.connected,
        "error": snapshot.error,
        "heap": {
            "used": snapshot.memory.heap.used,
            "committed": snapshot.memory.heap.committed,
            "max": snapshot.memory.heap.max,
            "ratio": metrics.heap_ratio,
        },
        "gc_overhead": metrics.gc_overhead,
        "allocation_rate": metrics.allocation_rate,
        "pressure": metrics.pressure.label(),
        "gc_summary": {
            "young_per_minute": summary.young_per_minute,
            "old_per_minute": summary.old_per_minute,
            "average_pause_ms": summary.average_pause_ms,
            "longest_pause_ms": summary.longest_pause_ms,
            "young_efficiency": summary.young_efficiency,
            "old_efficiency": summary.old_efficiency,
            "overall_efficiency": summary.overall_efficiency,
            "events_in_window": summary.events_in_window,
        },
        "trends": trends,
        "alerts": metrics.alerts,
        "recent_events": metrics.recent_events,
    });

    let content = serde_json::to_string_pretty(&export)?;
    std::fs::write(path, content)
        .with_context(|| format!("Could not write {}", path.display()))?;
    Ok(())
}
