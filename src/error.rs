//! Error taxonomy for session, capture, and collaborator failures.

use thiserror::Error;

/// Error type for camera session operations.
///
/// Permission and configuration failures are terminal for the current open
/// attempt and are never retried by the core; retry policy belongs to the
/// caller. `CaptureBusy` is recoverable once the outstanding capture
/// completes. Audit mismatches are advisories and never surface here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    /// Capture capability was not granted by the platform.
    #[error("capture permission not granted")]
    PermissionDenied,

    /// Transient hardware or driver-level failure.
    #[error("device access failed: {0}")]
    DeviceAccess(String),

    /// Stream or session configuration was rejected by the device.
    #[error("session configuration failed: {0}")]
    ConfigurationFailed(String),

    /// A still capture is already in flight; retry after it completes.
    #[error("a capture is already in flight")]
    CaptureBusy,

    /// The device became unavailable while a capture was outstanding.
    #[error("capture aborted: {0}")]
    CaptureAborted(String),

    /// The persistence collaborator rejected the captured bytes.
    #[error("storage failed: {0}")]
    Storage(String),

    /// A command was issued in a state that forbids it.
    #[error("{command} not allowed in state {state}")]
    InvalidState {
        /// The rejected command.
        command: &'static str,
        /// The session state at the time of the command.
        state: &'static str,
    },
}

impl CameraError {
    /// Short machine-readable kind tag, used in session error events.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::DeviceAccess(_) => "device_access",
            Self::ConfigurationFailed(_) => "configuration_failed",
            Self::CaptureBusy => "capture_busy",
            Self::CaptureAborted(_) => "capture_aborted",
            Self::Storage(_) => "storage",
            Self::InvalidState { .. } => "invalid_state",
        }
    }
}

/// Result type for camera session operations.
pub type Result<T> = std::result::Result<T, CameraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_stable() {
        assert_eq!(CameraError::PermissionDenied.kind(), "permission_denied");
        assert_eq!(CameraError::CaptureBusy.kind(), "capture_busy");
        let err = CameraError::InvalidState {
            command: "capture",
            state: "Closed",
        };
        assert_eq!(err.kind(), "invalid_state");
        assert_eq!(err.to_string(), "capture not allowed in state Closed");
    }
}
