use rail_core::{Rail, SampleSet};
use std::collections::BTreeMap;

/// Rolling statistics for one rail over the aggregator's trailing window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RailMetrics {
    /// Most recent sample's power, watts.
    pub current: f64,
    /// Arithmetic mean over the retained window.
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub sample_count: usize,
}

/// Rolling per-rail statistics over an independently configured trailing
/// window.
///
/// Keeps its own time-windowed history with the same eviction discipline as
/// the chart buffer, deliberately decoupled from it: the metrics window
/// length and refresh cadence change without touching the visualization
/// path, and the faster path never blocks on the slower one's lock.
///
/// Statistics are recomputed from the full retained window on every ingest —
/// windows are bounded and refresh periods are long relative to the scan, so
/// the simple full recomputation is the contract (an incremental scheme
/// would have to be numerically equivalent to it).
#[derive(Debug)]
pub struct MetricsAggregator {
    window_seconds: u32,
    refresh_period_ms: u64,
    history: Vec<SampleSet>,
    records: BTreeMap<Rail, RailMetrics>,
}

impl MetricsAggregator {
    pub fn new(window_seconds: u32, refresh_period_ms: u64) -> Self {
        Self {
            window_seconds,
            refresh_period_ms,
            history: Vec::new(),
            records: BTreeMap::new(),
        }
    }

    /// Update both knobs.  A shrunk window takes effect on the next
    /// ingest's eviction pass.
    pub fn configure(&mut self, window_seconds: u32, refresh_period_ms: u64) {
        self.window_seconds = window_seconds;
        self.refresh_period_ms = refresh_period_ms;
    }

    pub fn window_seconds(&self) -> u32 {
        self.window_seconds
    }

    pub fn refresh_period_ms(&self) -> u64 {
        self.refresh_period_ms
    }

    /// Ingest one batch: append, evict outside the window, recompute all
    /// records.  Empty batches are skipped — absence of samples within a
    /// period is expected at low driver rates, not an error.
    pub fn ingest(&mut self, batch: Vec<SampleSet>) {
        if batch.is_empty() {
            return;
        }
        self.history.extend(batch);
        self.evict();
        self.recompute();
    }

    /// Current per-rail records.  Empty before the first ingest and after
    /// [`MetricsAggregator::reset_history`].
    pub fn records(&self) -> &BTreeMap<Rail, RailMetrics> {
        &self.records
    }

    /// Clear retained samples and all derived statistics together.
    pub fn reset_history(&mut self) {
        self.history.clear();
        self.records.clear();
    }

    fn evict(&mut self) {
        let Some(newest) = self.history.last() else {
            return;
        };
        let newest_ts = newest.timestamp_ms;
        let horizon_ms = self.window_seconds as u64 * 1000;

        let mut evict = 0;
        while evict < self.history.len()
            && newest_ts.saturating_sub(self.history[evict].timestamp_ms) > horizon_ms
        {
            evict += 1;
        }
        if evict > 0 {
            self.history.drain(..evict);
        }
    }

    fn recompute(&mut self) {
        self.records.clear();
        for rail in Rail::ALL {
            let mut sum = 0.0;
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            let mut current = 0.0;
            let mut count = 0usize;

            for set in &self.history {
                if let Some(watts) = set.power(rail) {
                    sum += watts;
                    min = min.min(watts);
                    max = max.max(watts);
                    current = watts;
                    count += 1;
                }
            }

            if count > 0 {
                self.records.insert(
                    rail,
                    RailMetrics {
                        current,
                        average: sum / count as f64,
                        min,
                        max,
                        sample_count: count,
                    },
                );
            }
        }
    }
}
