use thiserror::Error;

/// Synchronous command rejections. Media engine failures never come back
/// through here; they surface as `connection_failed` or `local_*_failed`
/// events.
#[derive(Debug, Error)]
pub enum ParleyError {
    #[error("invalid argument: {0}")]
    ArgumentInvalid(String),
    #[error("missing identity for remote view")]
    MissingIdentity,
    #[error("a session is already active")]
    AlreadyConnected,
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Capture device failures. Reported through `local_*_failed` events
/// during connect; returned directly by device commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("no camera found")]
    NoDeviceFound,
    #[error("no other camera found")]
    NoAlternateDevice,
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),
}
