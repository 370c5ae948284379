use serde::{Deserialize, Serialize};

/// A named power rail measured by the capture hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rail {
    /// EPS 12V connector group (CPU power).
    Eps12V,
    /// PCI-Express connector group (GPU power).
    PciExpress,
    /// ATX 12V motherboard rail.
    Atx12V,
    /// ATX 5V motherboard rail.
    Atx5V,
    /// ATX 3.3V motherboard rail.
    Atx3_3V,
}

impl Rail {
    /// All rails in display order.
    pub const ALL: [Rail; 5] = [
        Rail::Eps12V,
        Rail::PciExpress,
        Rail::Atx12V,
        Rail::Atx5V,
        Rail::Atx3_3V,
    ];

    /// Human-readable label, e.g. for chart legends and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Rail::Eps12V     => "EPS12V",
            Rail::PciExpress => "PCI-Express",
            Rail::Atx12V     => "ATX 12V",
            Rail::Atx5V      => "ATX 5V",
            Rail::Atx3_3V    => "ATX 3.3V",
        }
    }
}

impl std::fmt::Display for Rail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One voltage/current reading on a single rail.
///
/// Immutable once created — readings are produced by the driver boundary and
/// flow through the pipeline by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RailSample {
    pub rail: Rail,
    /// Volts.
    pub voltage: f64,
    /// Amperes.
    pub current: f64,
}

impl RailSample {
    /// Instantaneous power draw in watts.
    pub fn power(&self) -> f64 {
        self.voltage * self.current
    }
}

/// The group of per-rail readings captured at one driver-clock instant.
///
/// This is the unit the driver emits and the unit the windowed buffer and
/// metrics aggregator retain.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    /// Milliseconds on the driver's monotonic clock.
    pub timestamp_ms: u64,
    /// One reading per rail, same rail order for every set in a stream.
    pub samples: Vec<RailSample>,
}

impl SampleSet {
    /// The reading for `rail`, if this set carries one.
    pub fn rail(&self, rail: Rail) -> Option<&RailSample> {
        self.samples.iter().find(|s| s.rail == rail)
    }

    /// Instantaneous power on `rail`, if present.
    pub fn power(&self, rail: Rail) -> Option<f64> {
        self.rail(rail).map(RailSample::power)
    }
}

/// How a run of consecutive samples is reduced to one point when
/// down-sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Arithmetic mean of the run.
    #[default]
    Mean,
    /// Smallest value in the run.
    Min,
    /// Largest value in the run.
    Max,
    /// Last value in the run.
    Last,
}
