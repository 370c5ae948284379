/// Connection state reported by the measurement driver.
///
/// The pipeline only reacts to transitions; it never drives reconnection
/// itself. A transition to [`DriverStatus::Error`] is recovered from by an
/// explicit stop/start cycle on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverStatus {
    #[default]
    Disconnected,
    Connecting,
    Streaming,
    Error,
}

impl std::fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DriverStatus::Disconnected => "disconnected",
            DriverStatus::Connecting   => "connecting",
            DriverStatus::Streaming    => "streaming",
            DriverStatus::Error        => "error",
        };
        f.write_str(s)
    }
}
