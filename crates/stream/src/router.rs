//! Periodic batchers fanning the raw sample stream out to the chart and
//! metrics paths.
//!
//! Each path is one spawned task batching the shared broadcast stream by
//! wall-clock period.  Re-subscribing a path aborts its task and spawns a
//! fresh one — at most one pending partial micro-batch is lost, and the
//! other path is untouched.  Batching is the sole backpressure mechanism:
//! processing runs inline in the task, and a tick that lands while the
//! previous batch is still being processed is delayed, never dropped.

use crate::buffer::SampleBuffer;
use crate::downsample;
use crate::metrics::MetricsAggregator;
use rail_core::rate::smooth_rate;
use rail_core::{FilterMode, RailSeries, SampleSet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Trailing span the throughput estimate is smoothed over.
const SMOOTHING_SECS: f64 = 2.0;

/// Chart-side projection knobs.  Shared behind a mutex so factor/mode
/// changes take effect on the next chart tick without re-subscribing.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionSettings {
    pub factor: usize,
    pub mode: FilterMode,
}

/// Everything the chart path's batch task needs.
pub struct ChartPath {
    pub samples: broadcast::Receiver<SampleSet>,
    pub period_ms: u64,
    pub enabled: Arc<AtomicBool>,
    pub buffer: Arc<Mutex<SampleBuffer>>,
    pub projection: Arc<Mutex<ProjectionSettings>>,
    pub series_tx: watch::Sender<RailSeries>,
}

/// Everything the metrics path's batch task needs.
pub struct MetricsPath {
    pub samples: broadcast::Receiver<SampleSet>,
    pub period_ms: u64,
    pub enabled: Arc<AtomicBool>,
    pub aggregator: Arc<Mutex<MetricsAggregator>>,
}

/// Owns the three path tasks (chart, metrics, throughput).
///
/// Dropping the router aborts all of them.
#[derive(Default)]
pub struct StreamRouter {
    chart: Option<JoinHandle<()>>,
    metrics: Option<JoinHandle<()>>,
    throughput: Option<JoinHandle<()>>,
}

impl StreamRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re-)establish the chart path.  An existing chart task is aborted
    /// first; the metrics and throughput paths keep running.
    pub fn subscribe_chart(&mut self, path: ChartPath) {
        if let Some(task) = self.chart.take() {
            task.abort();
        }
        debug!("chart path subscribed, period {} ms", path.period_ms);
        self.chart = Some(tokio::spawn(chart_loop(path)));
    }

    /// (Re-)establish the metrics path, symmetric to the chart path.
    pub fn subscribe_metrics(&mut self, path: MetricsPath) {
        if let Some(task) = self.metrics.take() {
            task.abort();
        }
        debug!("metrics path subscribed, period {} ms", path.period_ms);
        self.metrics = Some(tokio::spawn(metrics_loop(path)));
    }

    /// (Re-)establish the throughput path: consumes the driver's raw-count
    /// stream and publishes a smoothed samples-per-second figure.
    pub fn subscribe_throughput(
        &mut self,
        counts: broadcast::Receiver<u32>,
        rate_tx: watch::Sender<u32>,
    ) {
        if let Some(task) = self.throughput.take() {
            task.abort();
        }
        self.throughput = Some(tokio::spawn(throughput_loop(counts, rate_tx)));
    }

    pub fn has_chart(&self) -> bool {
        self.chart.is_some()
    }

    pub fn has_metrics(&self) -> bool {
        self.metrics.is_some()
    }

    /// Tear down all paths.
    pub fn shutdown(&mut self) {
        for task in [
            self.chart.take(),
            self.metrics.take(),
            self.throughput.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}

impl Drop for StreamRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Accumulate raw sets between ticks; on each tick append the batch to the
/// buffer, prune, project, and publish the new series — all buffer work
/// inside the buffer's single critical section.
async fn chart_loop(mut path: ChartPath) {
    let period = Duration::from_millis(path.period_ms);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut batch: Vec<SampleSet> = Vec::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if batch.is_empty() {
                    continue;
                }
                if !path.enabled.load(Ordering::Relaxed) {
                    batch.clear();
                    continue;
                }

                let incoming = std::mem::take(&mut batch);
                let series = {
                    let mut buffer = path.buffer.lock().unwrap();
                    buffer.append(incoming);
                    buffer.prune();
                    let projection = *path.projection.lock().unwrap();
                    downsample::project_all(
                        buffer.snapshot(),
                        projection.factor,
                        projection.mode,
                    )
                };
                path.series_tx.send_replace(series);
            }
            received = path.samples.recv() => match received {
                Ok(set) => batch.push(set),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("chart path lagged, {n} sample sets skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Metrics twin of [`chart_loop`], feeding the aggregator's own store.
async fn metrics_loop(mut path: MetricsPath) {
    let period = Duration::from_millis(path.period_ms);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut batch: Vec<SampleSet> = Vec::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if batch.is_empty() {
                    continue;
                }
                if !path.enabled.load(Ordering::Relaxed) {
                    batch.clear();
                    continue;
                }
                let incoming = std::mem::take(&mut batch);
                path.aggregator.lock().unwrap().ingest(incoming);
            }
            received = path.samples.recv() => match received {
                Ok(set) => batch.push(set),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("metrics path lagged, {n} sample sets skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Fold the driver's periodic raw counts into an approximate
/// samples-per-second figure over a short trailing window.
///
/// Each count message covers the samples that arrived since the previous
/// message, so the retained counts together cover exactly the span from the
/// last *evicted* entry's instant to now — that span is the divisor, not a
/// fixed smoothing constant, which would overcount at steady state and
/// undercount after a publishing gap.
async fn throughput_loop(mut counts: broadcast::Receiver<u32>, rate_tx: watch::Sender<u32>) {
    let mut window: VecDeque<(Instant, u32)> = VecDeque::new();
    // Instant the retained window's coverage begins at.
    let mut window_start = Instant::now();

    loop {
        match counts.recv().await {
            Ok(count) => {
                let now = Instant::now();
                window.push_back((now, count));
                while window.len() > 1
                    && now.duration_since(window[0].0).as_secs_f64() >= SMOOTHING_SECS
                {
                    let (evicted_at, _) = window.pop_front().unwrap();
                    window_start = evicted_at;
                }

                let total: u32 = window.iter().map(|&(_, c)| c).sum();
                let span = now.duration_since(window_start).as_secs_f64().max(0.1);
                rate_tx.send_replace(smooth_rate(total as f64 / span));
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
