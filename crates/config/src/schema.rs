use rail_core::FilterMode;
use rail_core::{RailError, Result};
use serde::{Deserialize, Serialize};

/// Window lengths offered to the user, in seconds.
pub const WINDOW_SECONDS: [u32; 7] = [5, 10, 20, 30, 60, 300, 600];

/// Refresh periods offered to the user, in milliseconds.
pub const REFRESH_PERIODS_MS: [u64; 10] = [1, 2, 5, 10, 20, 50, 100, 200, 250, 500];

/// Valid chart down-sampling factors.
pub const DOWNSAMPLING_FACTORS: std::ops::RangeInclusive<usize> = 1..=10;

/// Capture configuration parsed from `railscope.toml`.
///
/// The presentation boundary is expected to offer only the enumerated values
/// above; [`CaptureConfig::validate`] is the backstop for hand-edited files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Serial port of the measurement device, `None` = first available.
    pub port: Option<String>,
    /// Trailing history shown on the charts, seconds.
    pub window_seconds: u32,
    /// Trailing history the metrics are computed over, seconds.
    /// Independent of `window_seconds`.
    pub metrics_window_seconds: u32,
    /// Chart path batching period, milliseconds.
    pub chart_refresh_ms: u64,
    /// Metrics path batching period, milliseconds.
    pub metrics_refresh_ms: u64,
    /// Chart down-sampling factor (1 = no reduction).
    pub downsampling_factor: usize,
    /// Reduction applied to each down-sampled run.
    pub filter_mode: FilterMode,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            port: None,
            window_seconds: 10,
            metrics_window_seconds: 10,
            chart_refresh_ms: 200,
            metrics_refresh_ms: 500,
            downsampling_factor: 1,
            filter_mode: FilterMode::Mean,
        }
    }
}

impl CaptureConfig {
    /// Check every field against its enumerated value set.
    pub fn validate(&self) -> Result<()> {
        if !WINDOW_SECONDS.contains(&self.window_seconds) {
            return Err(RailError::Config(format!(
                "window_seconds {} not in {WINDOW_SECONDS:?}",
                self.window_seconds
            )));
        }
        if !WINDOW_SECONDS.contains(&self.metrics_window_seconds) {
            return Err(RailError::Config(format!(
                "metrics_window_seconds {} not in {WINDOW_SECONDS:?}",
                self.metrics_window_seconds
            )));
        }
        if !REFRESH_PERIODS_MS.contains(&self.chart_refresh_ms) {
            return Err(RailError::Config(format!(
                "chart_refresh_ms {} not in {REFRESH_PERIODS_MS:?}",
                self.chart_refresh_ms
            )));
        }
        if !REFRESH_PERIODS_MS.contains(&self.metrics_refresh_ms) {
            return Err(RailError::Config(format!(
                "metrics_refresh_ms {} not in {REFRESH_PERIODS_MS:?}",
                self.metrics_refresh_ms
            )));
        }
        if !DOWNSAMPLING_FACTORS.contains(&self.downsampling_factor) {
            return Err(RailError::Config(format!(
                "downsampling_factor {} not in {DOWNSAMPLING_FACTORS:?}",
                self.downsampling_factor
            )));
        }
        Ok(())
    }
}
