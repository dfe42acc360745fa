//! External collaborator interfaces and session configuration.
//!
//! The session consumes these as trait objects so tests can substitute
//! doubles; the core never owns their lifecycles beyond the calls below.

use crate::error::Result;

/// Platform capability check consulted before opening a device.
pub trait CapabilityProvider: Send + Sync {
    /// Whether the process currently holds the capture capability.
    fn has_capture_capability(&self) -> bool;
}

/// Persistence collaborator storing captured image bytes.
///
/// Invoked once per completed capture; the returned locator is an opaque
/// string the UI can resolve. Field names persisted alongside the bytes
/// (ISO, exposure, white balance, mode tag, GPS) are a contract with this
/// collaborator, not a format the core owns.
pub trait CaptureStore: Send + Sync {
    /// Store one capture and return its locator.
    fn store(&self, bytes: &[u8], suggested_name: &str, mode_tag: &str) -> Result<String>;
}

/// Location collaborator used by the audit trail to annotate captures.
pub trait LocationProvider: Send + Sync {
    /// Current coordinates as (latitude, longitude), if a fix exists.
    fn current_coordinates(&self) -> Option<(f64, f64)>;
}

/// Configuration for a capture session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    command_capacity: usize,
    event_capacity: usize,
    stillness_threshold: f64,
    activity_threshold: f64,
    jpeg_orientation: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_capacity: 16,
            event_capacity: 32,
            stillness_threshold: 0.01,
            activity_threshold: 0.1,
            jpeg_orientation: 0,
        }
    }
}

impl SessionConfig {
    /// Set the depth of the command channel feeding the session worker.
    #[must_use]
    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }

    /// Set the depth of the outbound event channel.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set the motion-sensor magnitude below which the device counts as still.
    #[must_use]
    pub fn with_stillness_threshold(mut self, threshold: f64) -> Self {
        self.stillness_threshold = threshold;
        self
    }

    /// Set the effect-offset magnitude above which the effect counts as active.
    #[must_use]
    pub fn with_activity_threshold(mut self, threshold: f64) -> Self {
        self.activity_threshold = threshold;
        self
    }

    /// Set the JPEG orientation applied to still captures, degrees clockwise.
    #[must_use]
    pub fn with_jpeg_orientation(mut self, degrees: u16) -> Self {
        self.jpeg_orientation = degrees;
        self
    }

    // Getters

    /// Depth of the command channel feeding the session worker.
    pub fn command_capacity(&self) -> usize {
        self.command_capacity
    }

    /// Depth of the outbound event channel.
    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    /// Motion-sensor magnitude below which the device counts as still.
    pub fn stillness_threshold(&self) -> f64 {
        self.stillness_threshold
    }

    /// Effect-offset magnitude above which the effect counts as active.
    pub fn activity_threshold(&self) -> f64 {
        self.activity_threshold
    }

    /// JPEG orientation applied to still captures, degrees clockwise.
    pub fn jpeg_orientation(&self) -> u16 {
        self.jpeg_orientation
    }
}
