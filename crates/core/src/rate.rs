/// Round a raw samples-per-second estimate to the nearest 10 for display.
///
/// The measured arrival rate jitters by a few samples between refreshes;
/// rounding keeps the readout stable without hiding real rate changes.
pub fn smooth_rate(samples_per_second: f64) -> u32 {
    ((samples_per_second / 10.0).round() * 10.0).max(0.0) as u32
}

/// Format a throughput figure as the user-facing string, e.g. `"1200 [1/s]"`.
pub fn format_sample_rate(samples_per_second: u32) -> String {
    format!("{samples_per_second} [1/s]")
}
