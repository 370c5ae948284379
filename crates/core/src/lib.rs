pub mod error;
pub mod point;
pub mod rate;
pub mod sample;
pub mod status;

pub use error::{RailError, Result};
pub use point::{PlotPoint, RailSeries};
pub use sample::{FilterMode, Rail, RailSample, SampleSet};
pub use status::DriverStatus;
