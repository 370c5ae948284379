//! Stream-processing core for railscope.
//!
//! Turns the driver's raw kHz-rate sample stream into a bounded
//! time-windowed history, down-sampled per-rail chart series, and rolling
//! per-rail statistics:
//!
//! - [`buffer::SampleBuffer`] — trailing-window history for the charts
//! - [`downsample`] — pure projection from buffered sets to point series
//! - [`metrics::MetricsAggregator`] — rolling stats over its own window
//! - [`router::StreamRouter`] — periodic batchers fanning the raw stream
//!   out to the chart and metrics paths at independent cadences
//! - [`session::SessionController`] — capture lifecycle and reconfiguration

pub mod buffer;
pub mod downsample;
pub mod metrics;
pub mod router;
pub mod session;

pub use buffer::SampleBuffer;
pub use metrics::{MetricsAggregator, RailMetrics};
pub use router::{ProjectionSettings, StreamRouter};
pub use session::{CaptureState, SessionController};
