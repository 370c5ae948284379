use rail_core::SampleSet;

/// Nominal raw sample rate, used only to pre-size allocations.
const NOMINAL_RATE_HZ: usize = 1000;

/// Time-ordered store of the trailing `window_seconds` of sample sets.
///
/// The buffer itself is single-threaded; the session wraps it in
/// `Arc<Mutex<…>>` and every mutation *and* every [`SampleBuffer::snapshot`]
/// for projection happens inside that one critical section, so readers never
/// observe a partially pruned or appended state.  Lock hold time is bounded
/// by the drain/copy of the evicted or retained prefix.
#[derive(Debug)]
pub struct SampleBuffer {
    sets: Vec<SampleSet>,
    window_seconds: u32,
}

impl SampleBuffer {
    pub fn new(window_seconds: u32) -> Self {
        Self {
            sets: Vec::with_capacity(window_seconds as usize * NOMINAL_RATE_HZ),
            window_seconds,
        }
    }

    pub fn window_seconds(&self) -> u32 {
        self.window_seconds
    }

    /// Append a batch at the tail.  Batches arrive in non-decreasing
    /// timestamp order from the batching path; the buffer does not re-sort.
    pub fn append(&mut self, batch: Vec<SampleSet>) {
        self.sets.extend(batch);
    }

    /// Evict everything older than the window, measured against the newest
    /// retained timestamp.  One cursor scan plus one bulk `drain`, so the
    /// cost is amortized O(1) per sample over the buffer's lifetime.
    pub fn prune(&mut self) {
        let Some(newest) = self.sets.last() else {
            return;
        };
        let newest_ts = newest.timestamp_ms;
        let horizon_ms = self.window_seconds as u64 * 1000;

        let mut evict = 0;
        while evict < self.sets.len()
            && newest_ts.saturating_sub(self.sets[evict].timestamp_ms) > horizon_ms
        {
            evict += 1;
        }
        if evict > 0 {
            self.sets.drain(..evict);
        }
    }

    /// Change the window length, rebuilding into a freshly sized store.
    ///
    /// Shrinking keeps only the trailing suffix that fits the new window;
    /// growing keeps everything already retained — coverage only extends
    /// through future appends, never by fabricating history.
    pub fn resize(&mut self, new_window_seconds: u32) {
        let mut fresh = Vec::with_capacity(new_window_seconds as usize * NOMINAL_RATE_HZ);

        if let Some(newest) = self.sets.last() {
            let newest_ts = newest.timestamp_ms;
            let horizon_ms = new_window_seconds as u64 * 1000;

            let mut keep_from = 0;
            while keep_from < self.sets.len()
                && newest_ts.saturating_sub(self.sets[keep_from].timestamp_ms) > horizon_ms
            {
                keep_from += 1;
            }
            fresh.extend(self.sets.drain(keep_from..));
        }

        self.sets = fresh;
        self.window_seconds = new_window_seconds;
    }

    /// Consistent read-only view for projection.  Callers hold the same
    /// lock as the mutators.
    pub fn snapshot(&self) -> &[SampleSet] {
        &self.sets
    }

    /// Drop all contents; the window length is unchanged.
    pub fn clear(&mut self) {
        self.sets.clear();
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
