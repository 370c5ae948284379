use thiserror::Error;

/// Top-level error type used across the entire pipeline.
#[derive(Debug, Error)]
pub enum RailError {
    #[error("config error: {0}")]
    Config(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

pub type Result<T, E = RailError> = std::result::Result<T, E>;
