//! Test doubles: mock backend and collaborator stand-ins.
//!
//! The mock backend echoes requests back as hardware results by default and
//! can be skewed to report values that differ from what was requested, which
//! is exactly the condition the audit trail exists to catch. Also used by
//! the demo binary, so it lives outside `#[cfg(test)]`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use crate::collab::{CapabilityProvider, CaptureStore, LocationProvider};
use crate::error::{CameraError, Result};
use crate::hardware::{
    BackendOpener, CameraBackend, CaptureRequest, HardwareResult, StillCapture,
};

/// Sensitivity the mock "auto exposure" settles on.
const AUTO_ISO: u32 = 400;

/// Exposure time the mock "auto exposure" settles on (1/100 s).
const AUTO_EXPOSURE_NANOS: u64 = 10_000_000;

/// Everything a mock backend was asked to do, for test assertions.
#[derive(Debug, Default)]
pub struct MockJournal {
    /// Repeating requests in submission order.
    pub repeating: Vec<CaptureRequest>,
    /// Still requests in submission order.
    pub stills: Vec<CaptureRequest>,
    /// Number of `configure` calls.
    pub configured: u32,
    /// Number of `stop_repeating` calls.
    pub stopped: u32,
    /// Whether `release` was called.
    pub released: bool,
}

/// Mock backend for testing without hardware.
#[derive(Clone)]
pub struct MockBackend {
    journal: Arc<Mutex<MockJournal>>,
    skew_iso: Option<u32>,
    skew_exposure: Option<u64>,
    fail_configure: bool,
    fail_repeating: bool,
    fail_capture: bool,
    capture_delay: Duration,
    frame_len: usize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a faithful mock: hardware results echo the request.
    #[must_use]
    pub fn new() -> Self {
        Self {
            journal: Arc::new(Mutex::new(MockJournal::default())),
            skew_iso: None,
            skew_exposure: None,
            fail_configure: false,
            fail_repeating: false,
            fail_capture: false,
            capture_delay: Duration::ZERO,
            frame_len: 1024,
        }
    }

    /// Report this ISO in hardware results regardless of the request.
    #[must_use]
    pub fn with_skewed_iso(mut self, iso: u32) -> Self {
        self.skew_iso = Some(iso);
        self
    }

    /// Report this exposure time in hardware results regardless of the
    /// request.
    #[must_use]
    pub fn with_skewed_exposure(mut self, nanos: u64) -> Self {
        self.skew_exposure = Some(nanos);
        self
    }

    /// Fail stream configuration.
    #[must_use]
    pub fn with_configure_failure(mut self) -> Self {
        self.fail_configure = true;
        self
    }

    /// Fail every repeating-request submission.
    #[must_use]
    pub fn with_repeating_failure(mut self) -> Self {
        self.fail_repeating = true;
        self
    }

    /// Simulate the device disconnecting mid-capture.
    #[must_use]
    pub fn with_capture_failure(mut self) -> Self {
        self.fail_capture = true;
        self
    }

    /// Hold each still capture for this long before completing.
    #[must_use]
    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    /// Size of the fake image buffer returned per capture.
    #[must_use]
    pub fn with_frame_len(mut self, len: usize) -> Self {
        self.frame_len = len;
        self
    }

    /// Shared journal handle; clones of this backend write to the same one.
    #[must_use]
    pub fn journal(&self) -> Arc<Mutex<MockJournal>> {
        Arc::clone(&self.journal)
    }

    fn result_for(&self, request: &CaptureRequest) -> HardwareResult {
        HardwareResult {
            iso: self.skew_iso.or(request.iso).unwrap_or(AUTO_ISO),
            exposure_nanos: self
                .skew_exposure
                .or(request.exposure_nanos)
                .unwrap_or(AUTO_EXPOSURE_NANOS),
            white_balance: request.white_balance,
            focus: request.focus,
            flash: request.flash,
            timestamp: SystemTime::now(),
        }
    }

    fn record<F: FnOnce(&mut MockJournal)>(&self, apply: F) {
        apply(&mut self.journal.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl CameraBackend for MockBackend {
    fn configure(&mut self) -> Result<()> {
        self.record(|journal| journal.configured += 1);
        if self.fail_configure {
            return Err(CameraError::DeviceAccess(
                "mock stream configuration rejected".to_owned(),
            ));
        }
        Ok(())
    }

    fn start_repeating(&mut self, request: &CaptureRequest) -> Result<()> {
        if self.fail_repeating {
            return Err(CameraError::DeviceAccess(
                "mock repeating request rejected".to_owned(),
            ));
        }
        self.record(|journal| journal.repeating.push(request.clone()));
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<()> {
        self.record(|journal| journal.stopped += 1);
        Ok(())
    }

    fn capture_still(&mut self, request: &CaptureRequest) -> Result<StillCapture> {
        if !self.capture_delay.is_zero() {
            std::thread::sleep(self.capture_delay);
        }
        if self.fail_capture {
            return Err(CameraError::DeviceAccess(
                "mock device disconnected mid-capture".to_owned(),
            ));
        }
        self.record(|journal| journal.stills.push(request.clone()));
        Ok(StillCapture {
            bytes: vec![0u8; self.frame_len],
            result: self.result_for(request),
        })
    }

    fn release(&mut self) {
        self.record(|journal| journal.released = true);
    }
}

/// Opener handing out clones of a template mock backend.
pub struct MockOpener {
    template: MockBackend,
    fail_open: bool,
}

impl MockOpener {
    /// Opener for the given backend template.
    #[must_use]
    pub fn new(template: MockBackend) -> Self {
        Self {
            template,
            fail_open: false,
        }
    }

    /// Fail every open attempt with a device-level error.
    #[must_use]
    pub fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

impl BackendOpener for MockOpener {
    fn open(&self, device_id: &str) -> Result<Box<dyn CameraBackend>> {
        if self.fail_open {
            return Err(CameraError::DeviceAccess(format!(
                "mock device {device_id} not found"
            )));
        }
        Ok(Box::new(self.template.clone()))
    }
}

/// Capability provider with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticCapability(pub bool);

impl CapabilityProvider for StaticCapability {
    fn has_capture_capability(&self) -> bool {
        self.0
    }
}

/// Location provider with a fixed fix.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Option<(f64, f64)>);

impl LocationProvider for FixedLocation {
    fn current_coordinates(&self) -> Option<(f64, f64)> {
        self.0
    }
}

/// One capture handed to the in-memory store.
#[derive(Debug, Clone)]
pub struct StoredCapture {
    /// Suggested name supplied by the pipeline.
    pub name: String,
    /// Mode tag supplied by the pipeline.
    pub mode_tag: String,
    /// Byte length of the stored image.
    pub len: usize,
}

/// In-memory persistence collaborator.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<StoredCapture>>,
    fail: bool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every store call.
    #[must_use]
    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Copy of everything stored so far.
    #[must_use]
    pub fn saved(&self) -> Vec<StoredCapture> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CaptureStore for MemoryStore {
    fn store(&self, bytes: &[u8], suggested_name: &str, mode_tag: &str) -> Result<String> {
        if self.fail {
            return Err(CameraError::Storage("simulated storage failure".to_owned()));
        }
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoredCapture {
                name: suggested_name.to_owned(),
                mode_tag: mode_tag.to_owned(),
                len: bytes.len(),
            });
        Ok(format!("mem:{suggested_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{FlashMode, FocusMode, WhiteBalanceMode};

    fn manual_request() -> CaptureRequest {
        CaptureRequest {
            targets: vec![],
            iso: Some(3200),
            exposure_nanos: Some(100_000_000),
            white_balance: WhiteBalanceMode::Manual { kelvin: 5600 },
            focus: FocusMode::Manual { distance: 1.5 },
            flash: FlashMode::Off,
            jpeg_orientation: 0,
        }
    }

    #[test]
    fn test_faithful_mock_echoes_request() {
        let mut backend = MockBackend::new();
        let still = backend
            .capture_still(&manual_request())
            .expect("capture should succeed");
        assert_eq!(still.result.iso, 3200);
        assert_eq!(still.result.exposure_nanos, 100_000_000);
        assert_eq!(
            still.result.white_balance,
            WhiteBalanceMode::Manual { kelvin: 5600 }
        );
        assert_eq!(still.bytes.len(), 1024);
    }

    #[test]
    fn test_skewed_mock_overrides_requested_values() {
        let mut backend = MockBackend::new().with_skewed_iso(800);
        let still = backend
            .capture_still(&manual_request())
            .expect("capture should succeed");
        assert_eq!(still.result.iso, 800);
        assert_eq!(still.result.exposure_nanos, 100_000_000);
    }

    #[test]
    fn test_auto_request_gets_auto_values() {
        let mut backend = MockBackend::new();
        let mut request = manual_request();
        request.iso = None;
        request.exposure_nanos = None;
        let still = backend
            .capture_still(&request)
            .expect("capture should succeed");
        assert_eq!(still.result.iso, AUTO_ISO);
        assert_eq!(still.result.exposure_nanos, AUTO_EXPOSURE_NANOS);
    }

    #[test]
    fn test_journal_is_shared_across_clones() {
        let template = MockBackend::new();
        let journal = template.journal();

        let opener = MockOpener::new(template);
        let mut opened = opener.open("0").expect("open should succeed");
        opened.configure().expect("configure should succeed");
        opened.release();

        let journal = journal.lock().expect("journal lock");
        assert_eq!(journal.configured, 1);
        assert!(journal.released);
    }

    #[test]
    fn test_memory_store_records_and_fails_on_demand() {
        let store = MemoryStore::new();
        let locator = store
            .store(&[1, 2, 3], "night_123", "night")
            .expect("store should succeed");
        assert_eq!(locator, "mem:night_123");
        assert_eq!(store.saved()[0].mode_tag, "night");
        assert_eq!(store.saved()[0].len, 3);

        let failing = MemoryStore::new().with_failure();
        assert!(matches!(
            failing.store(&[], "x", "photo"),
            Err(CameraError::Storage(_))
        ));
    }
}
