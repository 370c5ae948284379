use rail_core::{DriverStatus, FilterMode, Rail, RailError, RailSample, Result, SampleSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::info;

/// Generator burst period — samples are synthesised in bursts, not one
/// timer tick per sample, so kHz nominal rates don't need kHz timers.
const BURST_PERIOD_MS: u64 = 10;

/// How often the raw sample count is published for the throughput readout.
const COUNT_PERIOD_MS: u64 = 500;

/// In-process stand-in for the serial measurement driver.
///
/// Synthesises a deterministic waveform per rail (sine plus a harmonic — no
/// RNG, so tests can rely on exact values being reproducible) at a
/// configurable nominal sample rate, and honours the same command surface a
/// hardware driver would: start/stop, port selection, device-side
/// down-sampling.
pub struct SimulatedDriver {
    rate_hz: u32,
    sample_tx: broadcast::Sender<SampleSet>,
    count_tx: broadcast::Sender<u32>,
    status_tx: watch::Sender<DriverStatus>,
    /// Device-side down-sampling, read by the generator task each burst.
    downsampling: Arc<Mutex<(usize, FilterMode)>>,
    state: Mutex<DriverState>,
}

#[derive(Default)]
struct DriverState {
    task: Option<JoinHandle<()>>,
    port: Option<String>,
}

impl SimulatedDriver {
    /// Create a driver producing `rate_hz` raw samples per second once
    /// started.
    pub fn new(rate_hz: u32) -> Self {
        let (sample_tx, _) = broadcast::channel(8192);
        let (count_tx, _) = broadcast::channel(16);
        let (status_tx, _) = watch::channel(DriverStatus::Disconnected);

        Self {
            rate_hz,
            sample_tx,
            count_tx,
            status_tx,
            downsampling: Arc::new(Mutex::new((1, FilterMode::Mean))),
            state: Mutex::new(DriverState::default()),
        }
    }
}

impl crate::PowerDriver for SimulatedDriver {
    fn start(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.task.is_some() {
            return Ok(()); // already streaming
        }

        self.status_tx.send_replace(DriverStatus::Connecting);

        let task = tokio::spawn(generate(
            self.rate_hz,
            self.sample_tx.clone(),
            self.count_tx.clone(),
            Arc::clone(&self.downsampling),
        ));
        state.task = Some(task);

        self.status_tx.send_replace(DriverStatus::Streaming);
        info!("Simulated driver streaming at {} Hz", self.rate_hz);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(task) = state.task.take() {
            task.abort();
            self.status_tx.send_replace(DriverStatus::Disconnected);
            info!("Simulated driver stopped");
        }
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
        self.state.lock().unwrap().port.clone()
    }

    fn set_port_name(&self, name: &str) -> Result<()> {
        if !self.port_names().iter().any(|p| p == name) {
            return Err(RailError::Driver(format!("unknown port '{name}'")));
        }
        self.state.lock().unwrap().port = Some(name.to_string());
        Ok(())
    }

    fn port_names(&self) -> Vec<String> {
        vec!["SIM0".to_string(), "SIM1".to_string()]
    }

    fn set_downsampling(&self, size: usize, mode: FilterMode) -> Result<()> {
        if size == 0 {
            return Err(RailError::Driver("down-sampling size must be >= 1".into()));
        }
        *self.downsampling.lock().unwrap() = (size, mode);
        Ok(())
    }

    fn downsampling(&self) -> (usize, FilterMode) {
        *self.downsampling.lock().unwrap()
    }
}

/// Generator loop: synthesise a burst of raw sample sets every
/// [`BURST_PERIOD_MS`], apply device-side down-sampling, and publish the
/// emitted count every [`COUNT_PERIOD_MS`].
async fn generate(
    rate_hz: u32,
    sample_tx: broadcast::Sender<SampleSet>,
    count_tx: broadcast::Sender<u32>,
    downsampling: Arc<Mutex<(usize, FilterMode)>>,
) {
    let mut ticker = time::interval(Duration::from_millis(BURST_PERIOD_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let per_burst = ((rate_hz as u64 * BURST_PERIOD_MS) / 1000).max(1);
    let step_ms = 1000.0 / rate_hz as f64;

    let mut clock_ms = 0.0_f64;
    let mut emitted: u32 = 0;
    let mut pending: Vec<SampleSet> = Vec::new();
    let mut last_count = Instant::now();

    loop {
        ticker.tick().await;
        let (size, mode) = *downsampling.lock().unwrap();

        for _ in 0..per_burst {
            pending.push(synth_set(clock_ms));
            clock_ms += step_ms;

            if pending.len() >= size {
                let set = reduce_run(&pending, mode);
                pending.clear();
                // Err just means nobody is subscribed yet.
                let _ = sample_tx.send(set);
                emitted += 1;
            }
        }

        if last_count.elapsed() >= Duration::from_millis(COUNT_PERIOD_MS) {
            let _ = count_tx.send(emitted);
            emitted = 0;
            last_count = Instant::now();
        }
    }
}

/// Deterministic per-rail waveform at driver-clock time `t_ms`.
fn synth_set(t_ms: f64) -> SampleSet {
    let t = t_ms / 1000.0;
    let samples = Rail::ALL
        .iter()
        .map(|&rail| {
            let (voltage, base_current, f1, f2) = match rail {
                Rail::Eps12V     => (12.0, 8.0, 0.7, 3.1),
                Rail::PciExpress => (12.0, 12.0, 0.5, 2.3),
                Rail::Atx12V     => (12.0, 2.0, 0.9, 1.7),
                Rail::Atx5V      => (5.0, 3.0, 0.4, 2.9),
                Rail::Atx3_3V    => (3.3, 1.5, 0.6, 2.1),
            };
            let swing = 0.25 * (std::f64::consts::TAU * f1 * t).sin()
                + 0.10 * (std::f64::consts::TAU * f2 * t).sin();
            RailSample {
                rail,
                voltage,
                current: base_current * (1.0 + swing),
            }
        })
        .collect();

    SampleSet {
        timestamp_ms: t_ms as u64,
        samples,
    }
}

/// Device-side reduction of a run of raw sets to one emitted set.
///
/// Voltage and current are reduced independently; the emitted timestamp is
/// the run's last, i.e. the instant the run completed.
fn reduce_run(run: &[SampleSet], mode: FilterMode) -> SampleSet {
    debug_assert!(!run.is_empty());
    if run.len() == 1 || mode == FilterMode::Last {
        return run[run.len() - 1].clone();
    }

    let samples = Rail::ALL
        .iter()
        .filter_map(|&rail| {
            let readings: Vec<&RailSample> =
                run.iter().filter_map(|set| set.rail(rail)).collect();
            if readings.is_empty() {
                return None;
            }
            let (voltage, current) = match mode {
                FilterMode::Mean => {
                    let n = readings.len() as f64;
                    (
                        readings.iter().map(|r| r.voltage).sum::<f64>() / n,
                        readings.iter().map(|r| r.current).sum::<f64>() / n,
                    )
                }
                FilterMode::Min => (
                    readings.iter().map(|r| r.voltage).fold(f64::INFINITY, f64::min),
                    readings.iter().map(|r| r.current).fold(f64::INFINITY, f64::min),
                ),
                FilterMode::Max => (
                    readings.iter().map(|r| r.voltage).fold(f64::NEG_INFINITY, f64::max),
                    readings.iter().map(|r| r.current).fold(f64::NEG_INFINITY, f64::max),
                ),
                FilterMode::Last => unreachable!(),
            };
            Some(RailSample { rail, voltage, current })
        })
        .collect();

    SampleSet {
        timestamp_ms: run[run.len() - 1].timestamp_ms,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PowerDriver;
    use tokio::time::timeout;

    #[tokio::test]
    async fn streams_monotonic_sample_sets() {
        let driver = SimulatedDriver::new(1000);
        let mut rx = driver.samples();
        driver.start().unwrap();

        let mut last_ts = 0;
        for _ in 0..20 {
            let set = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("driver produced no samples")
                .unwrap();
            assert!(set.timestamp_ms >= last_ts);
            assert_eq!(set.samples.len(), Rail::ALL.len());
            last_ts = set.timestamp_ms;
        }

        driver.stop().unwrap();
        assert_eq!(*driver.status().borrow(), DriverStatus::Disconnected);
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let driver = SimulatedDriver::new(100);
        driver.start().unwrap();
        driver.start().unwrap();
        assert_eq!(*driver.status().borrow(), DriverStatus::Streaming);
        driver.stop().unwrap();
        driver.stop().unwrap();
        assert_eq!(*driver.status().borrow(), DriverStatus::Disconnected);
    }

    #[test]
    fn rejects_unknown_port() {
        let driver = SimulatedDriver::new(100);
        assert!(driver.set_port_name("COM7").is_err());
        assert!(driver.set_port_name("SIM1").is_ok());
        assert_eq!(driver.port_name().as_deref(), Some("SIM1"));
    }

    #[test]
    fn device_downsampling_mean_averages_run() {
        let a = synth_set(0.0);
        let b = synth_set(1.0);
        let reduced = reduce_run(&[a.clone(), b.clone()], FilterMode::Mean);

        let expect = (a.power(Rail::Eps12V).unwrap() + b.power(Rail::Eps12V).unwrap()) / 2.0;
        // Mean of (v, i) pairs with constant voltage is the mean power.
        let got = reduced.power(Rail::Eps12V).unwrap();
        assert!((got - expect).abs() < 1e-9);
        assert_eq!(reduced.timestamp_ms, b.timestamp_ms);
    }
}
