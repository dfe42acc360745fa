//! V4L2 backend using the v4l crate.
//!
//! Manual parameters are applied through V4L2 control ioctls and read back
//! after each capture to build the hardware result. Drivers differ widely in
//! which camera-class controls they expose (the vivid virtual driver exposes
//! almost none); control writes are therefore best-effort, and the audit
//! trail is what surfaces a control that silently never reached the sensor.

use v4l::buffer::Type;
use v4l::control::{Control, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use crate::error::{CameraError, Result};
use crate::hardware::{
    BackendOpener, CameraBackend, CaptureRequest, FocusMode, HardwareResult, StillCapture,
    WhiteBalanceMode,
};

// V4L2 control ids (user and camera control classes).
const V4L2_CID_AUTO_WHITE_BALANCE: u32 = 0x0098_090c;
const V4L2_CID_WHITE_BALANCE_TEMPERATURE: u32 = 0x0098_091a;
const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = 0x009a_0902;
const V4L2_CID_FOCUS_ABSOLUTE: u32 = 0x009a_090a;
const V4L2_CID_FOCUS_AUTO: u32 = 0x009a_090c;
const V4L2_CID_ISO_SENSITIVITY: u32 = 0x009a_0917;
const V4L2_CID_ISO_SENSITIVITY_AUTO: u32 = 0x009a_0918;

/// `V4L2_EXPOSURE_MANUAL`.
const EXPOSURE_MANUAL: i64 = 1;
/// `V4L2_EXPOSURE_AUTO`; UVC devices usually only accept aperture priority.
const EXPOSURE_AUTO: i64 = 0;
/// `V4L2_EXPOSURE_APERTURE_PRIORITY`.
const EXPOSURE_APERTURE_PRIORITY: i64 = 3;

/// `V4L2_CID_EXPOSURE_ABSOLUTE` is expressed in 100 microsecond units.
const EXPOSURE_UNIT_NANOS: u64 = 100_000;

/// Scale between diopters and `V4L2_CID_FOCUS_ABSOLUTE` driver units.
const FOCUS_UNITS_PER_DIOPTER: f64 = 100.0;

/// Frames discarded after stream start so exposure settles.
const WARMUP_FRAMES: usize = 2;

/// Capture format requested during configuration.
const CAPTURE_WIDTH: u32 = 1280;
const CAPTURE_HEIGHT: u32 = 720;

/// Opener for V4L2 devices by index (`"0"`) or path (`"/dev/video0"`).
#[derive(Debug, Clone, Copy, Default)]
pub struct V4l2Opener;

impl BackendOpener for V4l2Opener {
    fn open(&self, device_id: &str) -> Result<Box<dyn CameraBackend>> {
        Ok(Box::new(V4l2Backend::open(device_id)?))
    }
}

/// V4L2 camera backend wrapping the v4l crate.
pub struct V4l2Backend {
    device: Device,
    card: String,
}

impl V4l2Backend {
    /// Open a device by index or path and verify capture capabilities.
    pub fn open(device_id: &str) -> Result<Self> {
        let device = match device_id.parse::<usize>() {
            Ok(index) => Device::new(index),
            Err(_) => Device::with_path(device_id),
        }
        .map_err(|err| CameraError::DeviceAccess(err.to_string()))?;

        let caps = device
            .query_caps()
            .map_err(|err| CameraError::DeviceAccess(err.to_string()))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE)
            || !caps.capabilities.contains(v4l::capability::Flags::STREAMING)
        {
            return Err(CameraError::DeviceAccess(format!(
                "{} cannot stream video capture",
                caps.card
            )));
        }

        log::debug!("opened {} ({})", caps.card, caps.driver);
        Ok(Self {
            device,
            card: caps.card,
        })
    }

    /// Device card name reported by the driver.
    #[must_use]
    pub fn card(&self) -> &str {
        &self.card
    }

    /// Apply the manual controls a request pins; leave the rest on auto.
    ///
    /// Individual control writes that the driver rejects are logged and
    /// skipped. The post-capture read-back, not the write, is authoritative.
    fn apply_controls(&self, request: &CaptureRequest) {
        match request.exposure_nanos {
            Some(nanos) => {
                self.write_control(V4L2_CID_EXPOSURE_AUTO, Value::Integer(EXPOSURE_MANUAL));
                #[allow(clippy::cast_possible_wrap)]
                let units = (nanos / EXPOSURE_UNIT_NANOS).max(1) as i64;
                self.write_control(V4L2_CID_EXPOSURE_ABSOLUTE, Value::Integer(units));
            }
            None => {
                if !self.try_write_control(V4L2_CID_EXPOSURE_AUTO, Value::Integer(EXPOSURE_AUTO)) {
                    self.write_control(
                        V4L2_CID_EXPOSURE_AUTO,
                        Value::Integer(EXPOSURE_APERTURE_PRIORITY),
                    );
                }
            }
        }

        match request.iso {
            Some(iso) => {
                self.write_control(V4L2_CID_ISO_SENSITIVITY_AUTO, Value::Integer(0));
                self.write_control(V4L2_CID_ISO_SENSITIVITY, Value::Integer(i64::from(iso)));
            }
            None => {
                self.write_control(V4L2_CID_ISO_SENSITIVITY_AUTO, Value::Integer(1));
            }
        }

        match request.white_balance {
            WhiteBalanceMode::Manual { kelvin } => {
                self.write_control(V4L2_CID_AUTO_WHITE_BALANCE, Value::Boolean(false));
                self.write_control(
                    V4L2_CID_WHITE_BALANCE_TEMPERATURE,
                    Value::Integer(i64::from(kelvin)),
                );
            }
            WhiteBalanceMode::Auto => {
                self.write_control(V4L2_CID_AUTO_WHITE_BALANCE, Value::Boolean(true));
            }
        }

        match request.focus {
            FocusMode::Manual { distance } => {
                self.write_control(V4L2_CID_FOCUS_AUTO, Value::Boolean(false));
                #[allow(clippy::cast_possible_truncation)]
                let units = (distance * FOCUS_UNITS_PER_DIOPTER).round() as i64;
                self.write_control(V4L2_CID_FOCUS_ABSOLUTE, Value::Integer(units));
            }
            FocusMode::Continuous => {
                self.write_control(V4L2_CID_FOCUS_AUTO, Value::Boolean(true));
            }
        }

        // Flash has no portable V4L2 control; the result echoes the request.
    }

    fn write_control(&self, id: u32, value: Value) {
        if let Err(err) = self.device.set_control(Control { id, value }) {
            log::debug!("{}: control {id:#x} not applied: {err}", self.card);
        }
    }

    fn try_write_control(&self, id: u32, value: Value) -> bool {
        self.device.set_control(Control { id, value }).is_ok()
    }

    fn read_int(&self, id: u32) -> Option<i64> {
        match self.device.control(id) {
            Ok(control) => match control.value {
                Value::Integer(value) => Some(value),
                Value::Boolean(value) => Some(i64::from(value)),
                _ => None,
            },
            Err(err) => {
                log::debug!("{}: control {id:#x} not readable: {err}", self.card);
                None
            }
        }
    }

    /// Read the applied control state back into a hardware result.
    fn read_back(&self, request: &CaptureRequest) -> HardwareResult {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let iso = self
            .read_int(V4L2_CID_ISO_SENSITIVITY)
            .map(|value| value.max(0) as u32)
            .or(request.iso)
            .unwrap_or(0);

        #[allow(clippy::cast_sign_loss)]
        let exposure_nanos = self
            .read_int(V4L2_CID_EXPOSURE_ABSOLUTE)
            .map(|units| units.max(0) as u64 * EXPOSURE_UNIT_NANOS)
            .or(request.exposure_nanos)
            .unwrap_or(0);

        let white_balance = match self.read_int(V4L2_CID_AUTO_WHITE_BALANCE) {
            Some(0) => {
                let kelvin = self
                    .read_int(V4L2_CID_WHITE_BALANCE_TEMPERATURE)
                    .map_or_else(
                        || match request.white_balance {
                            WhiteBalanceMode::Manual { kelvin } => kelvin,
                            WhiteBalanceMode::Auto => 0,
                        },
                        |value| {
                            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                            {
                                value.max(0) as u32
                            }
                        },
                    );
                WhiteBalanceMode::Manual { kelvin }
            }
            Some(_) => WhiteBalanceMode::Auto,
            None => request.white_balance,
        };

        let focus = match self.read_int(V4L2_CID_FOCUS_AUTO) {
            Some(0) => {
                #[allow(clippy::cast_precision_loss)]
                let distance = self
                    .read_int(V4L2_CID_FOCUS_ABSOLUTE)
                    .map_or(0.0, |units| units as f64 / FOCUS_UNITS_PER_DIOPTER);
                FocusMode::Manual { distance }
            }
            Some(_) => FocusMode::Continuous,
            None => request.focus,
        };

        HardwareResult {
            iso,
            exposure_nanos,
            white_balance,
            focus,
            flash: request.flash,
            timestamp: std::time::SystemTime::now(),
        }
    }
}

impl CameraBackend for V4l2Backend {
    fn configure(&mut self) -> Result<()> {
        let format = Format::new(CAPTURE_WIDTH, CAPTURE_HEIGHT, FourCC::new(b"YUYV"));
        let actual = Capture::set_format(&self.device, &format)
            .map_err(|err| CameraError::ConfigurationFailed(err.to_string()))?;

        if actual.fourcc != FourCC::new(b"YUYV") {
            return Err(CameraError::ConfigurationFailed(format!(
                "{} does not support YUYV capture",
                self.card
            )));
        }

        log::debug!(
            "{}: configured {}x{} YUYV",
            self.card,
            actual.width,
            actual.height
        );
        Ok(())
    }

    fn start_repeating(&mut self, request: &CaptureRequest) -> Result<()> {
        // V4L2 has no per-frame request queue; the repeating request is the
        // control state applied to the free-running device.
        self.apply_controls(request);
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<()> {
        Ok(())
    }

    fn capture_still(&mut self, request: &CaptureRequest) -> Result<StillCapture> {
        self.apply_controls(request);

        let mut stream = Stream::with_buffers(&self.device, Type::VideoCapture, 4)
            .map_err(|err| CameraError::DeviceAccess(err.to_string()))?;

        // Discard warmup frames so the applied exposure settles.
        for _ in 0..WARMUP_FRAMES {
            stream
                .next()
                .map_err(|err| CameraError::DeviceAccess(err.to_string()))?;
        }

        let (buffer, meta) = stream
            .next()
            .map_err(|err| CameraError::DeviceAccess(err.to_string()))?;
        let bytes = buffer
            .get(..meta.bytesused as usize)
            .unwrap_or(buffer)
            .to_vec();

        Ok(StillCapture {
            bytes,
            result: self.read_back(request),
        })
    }

    fn release(&mut self) {
        // The device node closes when the backend is dropped.
        log::debug!("{}: released", self.card);
    }
}
