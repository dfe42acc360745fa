//! Cam-Audit: a manual-exposure capture session with a hardware audit trail
//!
//! This library drives a camera through an explicit session state machine,
//! maps physical control-dial angles to exposure parameters, and records an
//! append-only audit trail comparing every requested parameter against what
//! the hardware reports back. Backends are trait-based, enabling both
//! production use with V4L2 devices and testing with mock backends.

pub mod audit;
pub mod collab;
pub mod dial;
pub mod error;
pub mod hardware;
pub mod mock;
pub mod modes;
pub mod session;
pub mod v4l2;

pub use audit::{AuditCategory, AuditRecord, AuditSink, AuditTrail, LogSink, MemorySink, Verdict};
pub use collab::{CapabilityProvider, CaptureStore, LocationProvider, SessionConfig};
pub use dial::{DialBank, DialKind};
pub use error::{CameraError, Result};
pub use hardware::{
    BackendOpener, CameraBackend, CaptureRequest, FlashMode, FocusMode, HardwareResult,
    StillCapture, SurfaceId, WhiteBalanceMode,
};
pub use modes::{CaptureMode, FocusPolicy, ModeProfile, Tunable};
pub use session::{SessionController, SessionEvent, SessionPhase};
pub use v4l2::{V4l2Backend, V4l2Opener};
