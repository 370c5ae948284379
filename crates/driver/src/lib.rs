//! Driver boundary for railscope.
//!
//! The measurement hardware lives behind [`PowerDriver`]: a push stream of
//! [`SampleSet`]s, a status observable, a raw-count stream for throughput
//! display, and a handful of device commands.  The stream-processing core
//! (`rail-stream`) only ever talks to this trait, so a serial-port driver
//! and the in-process [`SimulatedDriver`] are interchangeable.

pub mod sim;

pub use sim::SimulatedDriver;

use rail_core::{DriverStatus, FilterMode, Result, SampleSet};
use tokio::sync::{broadcast, watch};

/// Commands and streams exposed by a measurement driver.
///
/// Streams are hot: `samples()` hands out an independent
/// [`broadcast::Receiver`] per call, so the chart and metrics paths can
/// consume the same raw stream at different cadences without coordinating.
pub trait PowerDriver: Send + Sync {
    /// Begin streaming.  Status moves through `Connecting` to `Streaming`;
    /// a failure surfaces as `Error` on the status stream and as the
    /// returned error.
    fn start(&self) -> Result<()>;

    /// Stop streaming and release the device.  Safe to call when already
    /// stopped.
    fn stop(&self) -> Result<()>;

    /// Subscribe to the raw sample stream.
    fn samples(&self) -> broadcast::Receiver<SampleSet>;

    /// Observable connection status.
    fn status(&self) -> watch::Receiver<DriverStatus>;

    /// Subscribe to the raw sample counts the driver publishes periodically
    /// (used only for the throughput readout).
    fn sample_counts(&self) -> broadcast::Receiver<u32>;

    /// Currently selected serial port, if any.
    fn port_name(&self) -> Option<String>;

    /// Select the serial port to use on the next [`PowerDriver::start`].
    fn set_port_name(&self, name: &str) -> Result<()>;

    /// Enumerate ports the driver could attach to.
    fn port_names(&self) -> Vec<String>;

    /// Device-side down-sampling applied before samples leave the driver:
    /// runs of `size` raw readings are reduced per `mode`.  Independent of
    /// the chart-side down-sampling in the projector.
    fn set_downsampling(&self, size: usize, mode: FilterMode) -> Result<()>;

    /// Current device-side down-sampling settings.
    fn downsampling(&self) -> (usize, FilterMode);
}
