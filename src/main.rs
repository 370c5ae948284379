//! railscope — stream-processing core for power-rail telemetry.
//!
//! Wires the simulated driver into a capture session and logs live metrics.
//! Run with:  `RUST_LOG=info railscope`

use anyhow::Result;
use rail_core::rate::format_sample_rate;
use rail_driver::SimulatedDriver;
use rail_stream::SessionController;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing_subscriber::EnvFilter;

/// Nominal raw sample rate of the simulated device.
const SIM_RATE_HZ: u32 = 1_000;

#[tokio::main]
async fn main() -> Result<()> {
    // Structured logging — RUST_LOG controls verbosity (default: info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("railscope v{} starting", env!("CARGO_PKG_VERSION"));

    let config = rail_config::load(rail_config::default_path())?;
    let driver = Arc::new(SimulatedDriver::new(SIM_RATE_HZ));
    let mut session = SessionController::new(driver, &config);
    session.start()?;

    let mut ticker = time::interval_at(
        Instant::now() + Duration::from_secs(1),
        Duration::from_secs(1),
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::info!("throughput: {}", format_sample_rate(session.throughput()));
                for (rail, m) in session.current_metrics() {
                    tracing::info!(
                        "{rail}: {:6.1} W  (avg {:6.1}, min {:6.1}, max {:6.1}, n={})",
                        m.current, m.average, m.min, m.max, m.sample_count,
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    session.stop()?;
    Ok(())
}
