use crate::sample::Rail;
use std::collections::BTreeMap;

/// One point of a projected chart series.
///
/// Points are recomputed from the windowed buffer on every chart refresh and
/// never stored long-term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotPoint {
    /// Seconds since the start of the visible window.
    pub x: f64,
    /// Watts.
    pub y: f64,
}

/// Per-rail projected series — the visualization output of the chart path.
pub type RailSeries = BTreeMap<Rail, Vec<PlotPoint>>;
