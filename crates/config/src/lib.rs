pub mod schema;

pub use schema::{CaptureConfig, DOWNSAMPLING_FACTORS, REFRESH_PERIODS_MS, WINDOW_SECONDS};

use rail_core::{RailError, Result};
use std::path::{Path, PathBuf};

/// Load capture configuration from a TOML file.  Returns
/// `CaptureConfig::default()` if the file doesn't exist so the pipeline
/// always has sensible defaults.
pub fn load(path: impl AsRef<Path>) -> Result<CaptureConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!(
            "Config file not found at '{}'; using defaults.",
            path.display()
        );
        return Ok(CaptureConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| RailError::Config(format!("cannot read '{}': {e}", path.display())))?;

    let config: CaptureConfig =
        toml::from_str(&raw).map_err(|e| RailError::Config(format!("TOML parse error: {e}")))?;
    config.validate()?;
    Ok(config)
}

/// Return the default config path, honouring `$XDG_CONFIG_HOME`.
pub fn default_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("railscope").join("railscope.toml")
}
