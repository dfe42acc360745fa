//! Hardware abstraction: backend trait, request and result records.
//!
//! A [`CameraBackend`] is the manual-exposure hardware interface the session
//! worker drives. Backends are synchronous and single-threaded by contract:
//! every call arrives on the session's dedicated worker thread, never
//! concurrently. Production code uses the V4L2 backend; tests use the mock.

use std::time::SystemTime;

use crate::error::Result;

/// Opaque handle for a preview output surface registered by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

/// White balance control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteBalanceMode {
    /// Hardware chooses the color temperature.
    Auto,
    /// Caller-pinned color temperature in Kelvin.
    Manual {
        /// Color temperature in Kelvin, within [2000, 10000].
        kelvin: u32,
    },
}

/// Flash firing policy for a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashMode {
    /// Never fire.
    Off,
    /// Hardware decides based on scene brightness.
    Auto,
    /// Always fire.
    On,
}

/// Focus control state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FocusMode {
    /// Continuous autofocus.
    Continuous,
    /// Manual focus at a fixed distance.
    Manual {
        /// Focus distance in diopters; 0.0 is infinity.
        distance: f64,
    },
}

/// A fully built capture request.
///
/// Built fresh for every preview refresh or still capture and never mutated
/// after submission. `None` sensitivity or exposure means the corresponding
/// automatic control owns the parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    /// Output surfaces the frames are delivered to.
    pub targets: Vec<SurfaceId>,
    /// Requested ISO sensitivity, or `None` for auto exposure.
    pub iso: Option<u32>,
    /// Requested exposure time in nanoseconds, or `None` for auto exposure.
    pub exposure_nanos: Option<u64>,
    /// Requested white balance state.
    pub white_balance: WhiteBalanceMode,
    /// Requested focus state.
    pub focus: FocusMode,
    /// Requested flash policy.
    pub flash: FlashMode,
    /// JPEG orientation in degrees clockwise.
    pub jpeg_orientation: u16,
}

/// Authoritative parameter values the hardware reports after a capture.
///
/// Produced exactly once per completed capture; read-only once created. The
/// audit trail compares these against the requested values.
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareResult {
    /// Sensitivity the sensor actually used.
    pub iso: u32,
    /// Exposure time actually applied, in nanoseconds.
    pub exposure_nanos: u64,
    /// White balance state actually applied.
    pub white_balance: WhiteBalanceMode,
    /// Focus state actually applied.
    pub focus: FocusMode,
    /// Flash policy actually applied.
    pub flash: FlashMode,
    /// Completion timestamp.
    pub timestamp: SystemTime,
}

/// A completed still capture: the image bytes plus the hardware's report.
#[derive(Debug, Clone)]
pub struct StillCapture {
    /// Raw image bytes, handed to the persistence collaborator.
    pub bytes: Vec<u8>,
    /// The hardware-returned confirmation record.
    pub result: HardwareResult,
}

/// Abstraction over a manual-exposure camera device.
///
/// All methods are invoked from the session worker thread, one at a time.
/// Implementations own the device handle exclusively; no other component
/// holds a second live reference.
pub trait CameraBackend: Send {
    /// Configure streams after the device has been opened.
    ///
    /// Failure leaves the session in its error state; the caller must close
    /// and reopen to recover.
    fn configure(&mut self) -> Result<()>;

    /// Start or atomically replace the repeating preview request.
    fn start_repeating(&mut self, request: &CaptureRequest) -> Result<()>;

    /// Stop the repeating preview request.
    fn stop_repeating(&mut self) -> Result<()>;

    /// Submit a single still capture and block until the hardware confirms
    /// completion or reports failure.
    ///
    /// Every call produces exactly one [`StillCapture`] or one error, never
    /// neither.
    fn capture_still(&mut self, request: &CaptureRequest) -> Result<StillCapture>;

    /// Release the device handle. Called exactly once before the backend is
    /// dropped.
    fn release(&mut self);
}

/// Factory opening a backend for a device identifier.
pub trait BackendOpener: Send + Sync {
    /// Open the device and return a backend owning its handle.
    fn open(&self, device_id: &str) -> Result<Box<dyn CameraBackend>>;
}
