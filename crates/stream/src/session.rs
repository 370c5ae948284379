//! Capture lifecycle and reconfiguration.
//!
//! The session owns the windowed buffer, the metrics aggregator, the stream
//! router and the gating flags, and turns every configuration change into a
//! discrete command: tear down exactly the affected subscription, establish
//! the replacement, leave everything else running.

use crate::buffer::SampleBuffer;
use crate::metrics::{MetricsAggregator, RailMetrics};
use crate::router::{ChartPath, MetricsPath, ProjectionSettings, StreamRouter};
use rail_config::CaptureConfig;
use rail_core::{DriverStatus, FilterMode, Rail, RailSeries, Result};
use rail_driver::PowerDriver;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Capture status state machine.
///
/// `Idle -> Starting -> Active -> Stopping -> Idle`; `Error` is entered from
/// `Starting`/`Active` on a driver fault and left only through an explicit
/// [`SessionController::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
    Error,
}

/// Top-level orchestrator of the stream-processing pipeline.
pub struct SessionController {
    driver: Arc<dyn PowerDriver>,
    buffer: Arc<Mutex<SampleBuffer>>,
    aggregator: Arc<Mutex<MetricsAggregator>>,
    projection: Arc<Mutex<ProjectionSettings>>,
    chart_enabled: Arc<AtomicBool>,
    metrics_enabled: Arc<AtomicBool>,
    chart_refresh_ms: u64,
    router: StreamRouter,
    state: Arc<Mutex<CaptureState>>,
    status_task: Option<JoinHandle<()>>,
    series_tx: watch::Sender<RailSeries>,
    rate_tx: watch::Sender<u32>,
}

impl SessionController {
    pub fn new(driver: Arc<dyn PowerDriver>, config: &CaptureConfig) -> Self {
        let (series_tx, _) = watch::channel(RailSeries::new());
        let (rate_tx, _) = watch::channel(0u32);

        Self {
            driver,
            buffer: Arc::new(Mutex::new(SampleBuffer::new(config.window_seconds))),
            aggregator: Arc::new(Mutex::new(MetricsAggregator::new(
                config.metrics_window_seconds,
                config.metrics_refresh_ms,
            ))),
            projection: Arc::new(Mutex::new(ProjectionSettings {
                factor: config.downsampling_factor,
                mode: config.filter_mode,
            })),
            chart_enabled: Arc::new(AtomicBool::new(true)),
            metrics_enabled: Arc::new(AtomicBool::new(true)),
            chart_refresh_ms: config.chart_refresh_ms,
            router: StreamRouter::new(),
            state: Arc::new(Mutex::new(CaptureState::Idle)),
            status_task: None,
            series_tx,
            rate_tx,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Begin capture: clear all history, start the driver, establish the
    /// chart, metrics and throughput paths.  A no-op unless the session is
    /// `Idle` (recovery from `Error` goes through [`SessionController::stop`]
    /// first).
    pub fn start(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != CaptureState::Idle {
                info!("start ignored in state {:?}", *state);
                return Ok(());
            }
            *state = CaptureState::Starting;
        }

        self.buffer.lock().unwrap().clear();
        self.aggregator.lock().unwrap().reset_history();
        self.series_tx.send_replace(RailSeries::new());
        self.rate_tx.send_replace(0);

        if let Err(e) = self.driver.start() {
            *self.state.lock().unwrap() = CaptureState::Error;
            return Err(e);
        }

        self.subscribe_chart_path();
        self.subscribe_metrics_path();
        self.router
            .subscribe_throughput(self.driver.sample_counts(), self.rate_tx.clone());

        // Go active before the watcher spawns: the watcher checks the
        // current status immediately, and a fault it mirrors must not be
        // overwritten by a late `Active` assignment.
        *self.state.lock().unwrap() = CaptureState::Active;
        self.spawn_status_watcher();
        info!("capture active");
        Ok(())
    }

    /// End capture: tear down all router paths and stop the driver.  A
    /// no-op when already `Idle`; also the recovery path out of `Error`.
    pub fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == CaptureState::Idle {
                return Ok(());
            }
            *state = CaptureState::Stopping;
        }

        self.router.shutdown();
        if let Some(task) = self.status_task.take() {
            task.abort();
        }
        let stopped = self.driver.stop();

        *self.state.lock().unwrap() = CaptureState::Idle;
        info!("capture idle");
        stopped
    }

    // ── Reconfiguration commands ──────────────────────────────────────────────

    /// Change the chart window length in place, preserving the overlapping
    /// suffix of history.  The router paths keep running.
    pub fn set_window_seconds(&self, seconds: u32) {
        self.buffer.lock().unwrap().resize(seconds);
    }

    /// Change the metrics window length; takes effect on the next ingest.
    pub fn set_metrics_window_seconds(&self, seconds: u32) {
        let mut agg = self.aggregator.lock().unwrap();
        let period = agg.refresh_period_ms();
        agg.configure(seconds, period);
    }

    /// Change the chart batching period.  Re-establishes only the chart
    /// path; the pending partial batch of the old subscription is dropped.
    pub fn set_chart_refresh_period(&mut self, period_ms: u64) {
        self.chart_refresh_ms = period_ms;
        if self.router.has_chart() {
            self.subscribe_chart_path();
        }
    }

    /// Change the metrics batching period.  Re-establishes only the
    /// metrics path.
    pub fn set_metrics_refresh_period(&mut self, period_ms: u64) {
        {
            let mut agg = self.aggregator.lock().unwrap();
            let window = agg.window_seconds();
            agg.configure(window, period_ms);
        }
        if self.router.has_metrics() {
            self.subscribe_metrics_path();
        }
    }

    /// Chart down-sampling factor; the next chart tick picks it up.
    pub fn set_downsampling_factor(&self, factor: usize) {
        self.projection.lock().unwrap().factor = factor;
    }

    /// Chart down-sampling filter mode; the next chart tick picks it up.
    pub fn set_filter_mode(&self, mode: FilterMode) {
        self.projection.lock().unwrap().mode = mode;
    }

    /// Gate the chart path.  Disabling clears the published series and the
    /// buffered chart history so stale data is never shown on re-enable;
    /// the metrics path is unaffected.
    pub fn set_chart_updates_enabled(&self, enabled: bool) {
        self.chart_enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            self.series_tx.send_replace(RailSeries::new());
            self.buffer.lock().unwrap().clear();
        }
    }

    /// Gate the metrics path.  Batches are discarded while disabled;
    /// accumulated history is kept.
    pub fn set_metrics_updates_enabled(&self, enabled: bool) {
        self.metrics_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Clear the metrics history and all derived statistics.
    pub fn reset_metrics(&self) {
        self.aggregator.lock().unwrap().reset_history();
    }

    // ── Driver passthrough ────────────────────────────────────────────────────

    pub fn port_name(&self) -> Option<String> {
        self.driver.port_name()
    }

    pub fn set_port_name(&self, name: &str) -> Result<()> {
        self.driver.set_port_name(name)
    }

    pub fn port_names(&self) -> Vec<String> {
        self.driver.port_names()
    }

    /// Device-side down-sampling, distinct from the chart-side projector.
    pub fn set_device_downsampling(&self, size: usize, mode: FilterMode) -> Result<()> {
        self.driver.set_downsampling(size, mode)
    }

    pub fn device_downsampling(&self) -> (usize, FilterMode) {
        self.driver.downsampling()
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn capture_state(&self) -> CaptureState {
        *self.state.lock().unwrap()
    }

    pub fn driver_status(&self) -> DriverStatus {
        *self.driver.status().borrow()
    }

    /// Latest projected series; empty until the first chart refresh.
    pub fn current_series(&self) -> RailSeries {
        self.series_tx.borrow().clone()
    }

    /// Latest per-rail metric records; empty until the first ingest.
    pub fn current_metrics(&self) -> BTreeMap<Rail, RailMetrics> {
        self.aggregator.lock().unwrap().records().clone()
    }

    /// Smoothed raw-stream arrival rate, samples per second.
    pub fn throughput(&self) -> u32 {
        *self.rate_tx.borrow()
    }

    /// Observable series for a presentation layer that prefers push.
    pub fn series_watch(&self) -> watch::Receiver<RailSeries> {
        self.series_tx.subscribe()
    }

    /// Observable throughput figure.
    pub fn throughput_watch(&self) -> watch::Receiver<u32> {
        self.rate_tx.subscribe()
    }

    // ── Wiring ────────────────────────────────────────────────────────────────

    fn subscribe_chart_path(&mut self) {
        self.router.subscribe_chart(ChartPath {
            samples: self.driver.samples(),
            period_ms: self.chart_refresh_ms,
            enabled: Arc::clone(&self.chart_enabled),
            buffer: Arc::clone(&self.buffer),
            projection: Arc::clone(&self.projection),
            series_tx: self.series_tx.clone(),
        });
    }

    fn subscribe_metrics_path(&mut self) {
        let period_ms = self.aggregator.lock().unwrap().refresh_period_ms();
        self.router.subscribe_metrics(MetricsPath {
            samples: self.driver.samples(),
            period_ms,
            enabled: Arc::clone(&self.metrics_enabled),
            aggregator: Arc::clone(&self.aggregator),
        });
    }

    /// Mirror driver faults into the capture state machine.  In-flight
    /// batch processing is never interrupted; the paths simply stop seeing
    /// new data once the driver is gone.
    fn spawn_status_watcher(&mut self) {
        if let Some(task) = self.status_task.take() {
            task.abort();
        }

        let mut status_rx = self.driver.status();
        let state = Arc::clone(&self.state);
        self.status_task = Some(tokio::spawn(async move {
            // Check the value current at subscription time first: a fault
            // raised between `driver.start()` and the subscription would
            // otherwise never produce a `changed()` event.
            loop {
                if *status_rx.borrow_and_update() == DriverStatus::Error {
                    let mut state = state.lock().unwrap();
                    if matches!(*state, CaptureState::Starting | CaptureState::Active) {
                        warn!("driver fault — capture entering error state");
                        *state = CaptureState::Error;
                    }
                }
                if status_rx.changed().await.is_err() {
                    break;
                }
            }
        }));
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.router.shutdown();
        if let Some(task) = self.status_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rail_core::{RailSample, SampleSet};
    use tokio::sync::broadcast;
    use tokio::time::{self, Duration};

    /// Scriptable driver stub: tests push sample sets and status
    /// transitions by hand.
    struct TestDriver {
        sample_tx: broadcast::Sender<SampleSet>,
        count_tx: broadcast::Sender<u32>,
        status_tx: watch::Sender<DriverStatus>,
        /// When set, `start()` reports `Ok` but flags an immediate fault —
        /// the status is already `Error` by the time anyone subscribes.
        fail_on_start: AtomicBool,
    }

    impl TestDriver {
        fn new() -> Self {
            let (sample_tx, _) = broadcast::channel(256);
            let (count_tx, _) = broadcast::channel(16);
            let (status_tx, _) = watch::channel(DriverStatus::Disconnected);
            Self {
                sample_tx,
                count_tx,
                status_tx,
                fail_on_start: AtomicBool::new(false),
            }
        }

        fn push(&self, timestamp_ms: u64, watts: f64) {
            let _ = self.sample_tx.send(SampleSet {
                timestamp_ms,
                samples: vec![RailSample {
                    rail: Rail::Eps12V,
                    voltage: 1.0,
                    current: watts,
                }],
            });
        }

        fn fail(&self) {
            self.status_tx.send_replace(DriverStatus::Error);
        }

        fn fail_on_start(&self) {
            self.fail_on_start.store(true, Ordering::Relaxed);
        }
    }

    impl PowerDriver for TestDriver {
        fn start(&self) -> Result<()> {
            if self.fail_on_start.load(Ordering::Relaxed) {
                self.status_tx.send_replace(DriverStatus::Error);
            } else {
                self.status_tx.send_replace(DriverStatus::Streaming);
            }
            Ok(())
        }

        fn stop(&self) -> Result<()> {
            self.status_tx.send_replace(DriverStatus::Disconnected);
            Ok(())
        }

        fn samples(&self) -> broadcast::Receiver<SampleSet> {
            self.sample_tx.subscribe()
        }

        fn status(&self) -> watch::Receiver<DriverStatus> {
            self.status_tx.subscribe()
        }

        fn sample_counts(&self) -> broadcast::Receiver<u32> {
            self.count_tx.subscribe()
        }

        fn port_name(&self) -> Option<String> {
            None
        }

        fn set_port_name(&self, _name: &str) -> Result<()> {
            Ok(())
        }

        fn port_names(&self) -> Vec<String> {
            Vec::new()
        }

        fn set_downsampling(&self, _size: usize, _mode: FilterMode) -> Result<()> {
            Ok(())
        }

        fn downsampling(&self) -> (usize, FilterMode) {
            (1, FilterMode::Mean)
        }
    }

    fn config() -> CaptureConfig {
        CaptureConfig {
            chart_refresh_ms: 100,
            metrics_refresh_ms: 50,
            ..Default::default()
        }
    }

    fn session() -> (Arc<TestDriver>, SessionController) {
        let driver = Arc::new(TestDriver::new());
        let session = SessionController::new(driver.clone(), &config());
        (driver, session)
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_are_idempotent() {
        let (_driver, mut session) = session();
        assert_eq!(session.capture_state(), CaptureState::Idle);

        session.start().unwrap();
        session.start().unwrap();
        assert_eq!(session.capture_state(), CaptureState::Active);
        assert_eq!(session.driver_status(), DriverStatus::Streaming);

        session.stop().unwrap();
        session.stop().unwrap();
        assert_eq!(session.capture_state(), CaptureState::Idle);
        assert_eq!(session.driver_status(), DriverStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn chart_and_metrics_flow_end_to_end() {
        let (driver, mut session) = session();
        session.start().unwrap();

        driver.push(0, 10.0);
        driver.push(10, 20.0);
        driver.push(20, 30.0);
        time::sleep(Duration::from_millis(150)).await;

        let series = session.current_series();
        assert_eq!(series[&Rail::Eps12V].len(), 3);

        let metrics = session.current_metrics();
        let m = metrics[&Rail::Eps12V];
        assert_eq!(m.average, 20.0);
        assert_eq!(m.min, 10.0);
        assert_eq!(m.max, 30.0);
        assert_eq!(m.sample_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_fault_enters_error_until_stop() {
        let (driver, mut session) = session();
        session.start().unwrap();

        driver.fail();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(session.capture_state(), CaptureState::Error);

        // No recovery without an explicit stop.
        session.start().unwrap();
        assert_eq!(session.capture_state(), CaptureState::Error);

        session.stop().unwrap();
        assert_eq!(session.capture_state(), CaptureState::Idle);
        session.start().unwrap();
        assert_eq!(session.capture_state(), CaptureState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn chart_period_change_keeps_metrics_history() {
        let (driver, mut session) = session();
        session.start().unwrap();

        driver.push(0, 10.0);
        driver.push(10, 20.0);
        time::sleep(Duration::from_millis(80)).await;
        assert_eq!(session.current_metrics()[&Rail::Eps12V].sample_count, 2);

        session.set_chart_refresh_period(200);

        driver.push(20, 30.0);
        time::sleep(Duration::from_millis(80)).await;
        // Metrics cadence and history are untouched by the chart re-wire.
        assert_eq!(session.current_metrics()[&Rail::Eps12V].sample_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resize_preserves_history_without_rewire() {
        let (driver, mut session) = session();
        session.start().unwrap();

        driver.push(0, 1.0);
        driver.push(8_000, 2.0);
        driver.push(9_000, 3.0);
        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(session.current_series()[&Rail::Eps12V].len(), 3);

        session.set_window_seconds(5);

        // The suffix inside the new window survives; the path keeps running
        // and the next refresh projects the resized history.
        driver.push(9_100, 4.0);
        time::sleep(Duration::from_millis(150)).await;
        let series = session.current_series();
        assert_eq!(series[&Rail::Eps12V].len(), 3); // 8 000, 9 000, 9 100
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_charts_clears_but_leaves_metrics_running() {
        let (driver, mut session) = session();
        session.start().unwrap();

        driver.push(0, 10.0);
        time::sleep(Duration::from_millis(150)).await;
        assert!(!session.current_series()[&Rail::Eps12V].is_empty());

        session.set_chart_updates_enabled(false);
        assert!(session.current_series().is_empty());

        driver.push(100, 20.0);
        time::sleep(Duration::from_millis(150)).await;
        assert!(session.current_series().is_empty());
        // The metrics path saw both samples.
        assert_eq!(session.current_metrics()[&Rail::Eps12V].sample_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_metrics_clears_records() {
        let (driver, mut session) = session();
        session.start().unwrap();

        driver.push(0, 10.0);
        time::sleep(Duration::from_millis(80)).await;
        assert!(!session.current_metrics().is_empty());

        session.reset_metrics();
        assert!(session.current_metrics().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_period_change_keeps_chart_path_untouched() {
        let (driver, mut session) = session();
        session.start().unwrap();

        driver.push(0, 10.0);
        driver.push(10, 20.0);
        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(session.current_series()[&Rail::Eps12V].len(), 2);

        session.set_metrics_refresh_period(200);

        // The chart subscription keeps its receiver and its buffered
        // history through the metrics re-wire.
        driver.push(20, 30.0);
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.current_series()[&Rail::Eps12V].len(), 3);

        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(session.current_metrics()[&Rail::Eps12V].sample_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn projection_change_applies_without_rewire() {
        let (driver, mut session) = session();
        session.start().unwrap();

        driver.push(0, 1.0);
        driver.push(10, 2.0);
        driver.push(20, 3.0);
        driver.push(30, 4.0);
        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(session.current_series()[&Rail::Eps12V].len(), 4);

        session.set_downsampling_factor(2);
        session.set_filter_mode(FilterMode::Max);

        // The next tick re-projects the whole window under the new
        // settings; no re-subscription happens.
        driver.push(40, 0.5);
        time::sleep(Duration::from_millis(150)).await;
        let series = session.current_series();
        let points = &series[&Rail::Eps12V];
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].y, 2.0);
        assert_eq!(points[1].y, 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_gate_and_window_leave_chart_running() {
        let (driver, mut session) = session();
        session.start().unwrap();

        session.set_metrics_updates_enabled(false);
        driver.push(0, 10.0);
        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(session.current_series()[&Rail::Eps12V].len(), 1);
        assert!(session.current_metrics().is_empty());

        session.set_metrics_updates_enabled(true);
        driver.push(20_000, 20.0);
        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(session.current_metrics()[&Rail::Eps12V].sample_count, 1);

        // Shrinking the metrics window evicts on the next ingest.
        session.set_metrics_window_seconds(5);
        driver.push(40_000, 30.0);
        time::sleep(Duration::from_millis(150)).await;
        let m = session.current_metrics()[&Rail::Eps12V];
        assert_eq!(m.sample_count, 1);
        assert_eq!(m.current, 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn error_status_present_at_start_is_mirrored() {
        let (driver, mut session) = session();
        driver.fail_on_start();

        // The fault exists before the watcher subscribes; the initial
        // status check must still pick it up.
        session.start().unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(session.capture_state(), CaptureState::Error);

        session.stop().unwrap();
        assert_eq!(session.capture_state(), CaptureState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn queries_are_empty_before_any_data() {
        let (_driver, session) = session();
        assert!(session.current_series().is_empty());
        assert!(session.current_metrics().is_empty());
        assert_eq!(session.throughput(), 0);
    }
}
