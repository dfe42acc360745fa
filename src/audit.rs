//! Audit trail: requested-versus-hardware verification and anomaly flags.
//!
//! The trail consumes two independent streams: hardware-returned
//! confirmation records from completed captures, and paired (motion sample,
//! effect offset) readings during preview. Every comparison is appended as
//! an [`AuditRecord`] through an injected [`AuditSink`]; records are
//! tamper-evidence, never rewritten or deleted. Verdicts are advisories for
//! operators and never fail the capture flow.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::collab::SessionConfig;
use crate::dial::{format_iso, format_kelvin, format_shutter};
use crate::hardware::{CaptureRequest, FocusMode, HardwareResult, WhiteBalanceMode};

/// Relative tolerance when comparing requested and returned sensitivity.
const ISO_TOLERANCE: f64 = 0.05;

/// Relative tolerance when comparing requested and returned exposure time.
const EXPOSURE_TOLERANCE: f64 = 0.05;

/// Absolute tolerance in Kelvin for manual white balance comparisons.
const KELVIN_TOLERANCE: u32 = 100;

/// Absolute tolerance in diopters for manual focus comparisons.
const FOCUS_TOLERANCE: f64 = 0.01;

/// Outcome of one requested-versus-hardware comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Hardware confirmed the requested value within tolerance.
    Match,
    /// Hardware reports a different value than was requested.
    Mismatch,
    /// Heuristic anomaly, e.g. a motion-linked effect on a still device.
    Suspicious,
}

/// Which signal a record audits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditCategory {
    /// Sensor sensitivity.
    Iso,
    /// Exposure time.
    Exposure,
    /// White balance.
    WhiteBalance,
    /// Focus state.
    Focus,
    /// Flash policy.
    Flash,
    /// Preview-time motion/effect pairing.
    Motion,
    /// Location annotation of a saved capture.
    Location,
}

/// One append-only comparison between a requested and a hardware value.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    /// The audited signal.
    pub category: AuditCategory,
    /// Canonical display form of the requested value.
    pub requested: String,
    /// Canonical display form of the hardware-reported value.
    pub hardware: String,
    /// Comparison outcome.
    pub verdict: Verdict,
    /// Record creation time.
    pub timestamp: SystemTime,
}

impl AuditRecord {
    fn new(category: AuditCategory, requested: String, hardware: String, verdict: Verdict) -> Self {
        Self {
            category,
            requested,
            hardware,
            verdict,
            timestamp: SystemTime::now(),
        }
    }
}

/// Destination for audit records.
///
/// Injected into the session at construction so tests can capture records
/// and deployments can route them to their own operator channel.
pub trait AuditSink: Send + Sync {
    /// Append one record. Implementations must never drop or reorder
    /// records for a single session.
    fn record(&self, record: AuditRecord);
}

/// Sink forwarding records to the `log` facade.
///
/// `Match` verdicts log at debug, everything else at warn.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AuditSink for LogSink {
    fn record(&self, record: AuditRecord) {
        match record.verdict {
            Verdict::Match => log::debug!(
                "audit {:?}: requested {} hardware {} -> match",
                record.category,
                record.requested,
                record.hardware
            ),
            Verdict::Mismatch | Verdict::Suspicious => log::warn!(
                "audit {:?}: requested {} hardware {} -> {:?}",
                record.category,
                record.requested,
                record.hardware,
                record.verdict
            ),
        }
    }
}

/// In-memory sink retaining every record, for tests and the demo binary.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record appended so far, in append order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl AuditSink for MemorySink {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(record);
    }
}

/// The audit trail itself: comparison rules plus the injected sink.
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    stillness_threshold: f64,
    activity_threshold: f64,
}

impl AuditTrail {
    /// Create a trail writing to `sink` with thresholds from `config`.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, config: &SessionConfig) -> Self {
        Self {
            sink,
            stillness_threshold: config.stillness_threshold(),
            activity_threshold: config.activity_threshold(),
        }
    }

    /// Cross-check a completed capture against what was requested.
    ///
    /// Only explicitly requested parameters are compared; parameters left to
    /// automatic control carry no requested value to audit. Mismatches are
    /// recorded, never raised.
    pub fn verify_capture(&self, requested: &CaptureRequest, hardware: &HardwareResult) {
        if let Some(iso) = requested.iso {
            let verdict = if within_relative(f64::from(iso), f64::from(hardware.iso), ISO_TOLERANCE)
            {
                Verdict::Match
            } else {
                Verdict::Mismatch
            };
            self.sink.record(AuditRecord::new(
                AuditCategory::Iso,
                format_iso(iso),
                format_iso(hardware.iso),
                verdict,
            ));
        }

        if let Some(exposure) = requested.exposure_nanos {
            #[allow(clippy::cast_precision_loss)]
            let verdict = if within_relative(
                exposure as f64,
                hardware.exposure_nanos as f64,
                EXPOSURE_TOLERANCE,
            ) {
                Verdict::Match
            } else {
                Verdict::Mismatch
            };
            self.sink.record(AuditRecord::new(
                AuditCategory::Exposure,
                format_shutter(exposure),
                format_shutter(hardware.exposure_nanos),
                verdict,
            ));
        }

        self.sink.record(AuditRecord::new(
            AuditCategory::WhiteBalance,
            format_white_balance(requested.white_balance),
            format_white_balance(hardware.white_balance),
            white_balance_verdict(requested.white_balance, hardware.white_balance),
        ));

        self.sink.record(AuditRecord::new(
            AuditCategory::Focus,
            format_focus(requested.focus),
            format_focus(hardware.focus),
            focus_verdict(requested.focus, hardware.focus),
        ));

        let flash_verdict = if requested.flash == hardware.flash {
            Verdict::Match
        } else {
            Verdict::Mismatch
        };
        self.sink.record(AuditRecord::new(
            AuditCategory::Flash,
            format!("{:?}", requested.flash),
            format!("{:?}", hardware.flash),
            flash_verdict,
        ));
    }

    /// Inspect one preview-time (motion sample, effect offset) pair.
    ///
    /// The sample is flagged `Suspicious` iff the first two sensor axes are
    /// both below the stillness threshold while the offset magnitude exceeds
    /// the activity threshold: a motion-linked visual effect moving while
    /// the device is stationary. Returns whether the sample was flagged;
    /// unflagged samples produce no record.
    pub fn observe_motion(&self, sensor: [f64; 3], offset: [f64; 2]) -> bool {
        let device_still = sensor[0].abs() < self.stillness_threshold
            && sensor[1].abs() < self.stillness_threshold;
        let effect_active = offset[0].hypot(offset[1]) > self.activity_threshold;

        if device_still && effect_active {
            self.sink.record(AuditRecord::new(
                AuditCategory::Motion,
                format!("accel ({:.3}, {:.3}, {:.3})", sensor[0], sensor[1], sensor[2]),
                format!("effect offset ({:.3}, {:.3})", offset[0], offset[1]),
                Verdict::Suspicious,
            ));
            true
        } else {
            false
        }
    }

    /// Annotate a saved capture with the current location fix.
    ///
    /// A missing fix, or the (0, 0) null island placeholder, is flagged
    /// `Suspicious`; it never fails the capture.
    pub fn annotate_location(&self, locator: &str, coordinates: Option<(f64, f64)>) {
        let (hardware, verdict) = match coordinates {
            Some((lat, lon)) if lat != 0.0 || lon != 0.0 => {
                (format!("({lat:.5}, {lon:.5})"), Verdict::Match)
            }
            Some(_) => ("(0, 0) placeholder fix".to_owned(), Verdict::Suspicious),
            None => ("no location fix".to_owned(), Verdict::Suspicious),
        };
        self.sink.record(AuditRecord::new(
            AuditCategory::Location,
            locator.to_owned(),
            hardware,
            verdict,
        ));
    }
}

/// Whether `actual` is within `tolerance` (relative) of `expected`.
fn within_relative(expected: f64, actual: f64, tolerance: f64) -> bool {
    if expected == 0.0 {
        return actual == 0.0;
    }
    ((actual - expected) / expected).abs() <= tolerance
}

fn white_balance_verdict(requested: WhiteBalanceMode, hardware: WhiteBalanceMode) -> Verdict {
    match (requested, hardware) {
        (WhiteBalanceMode::Auto, WhiteBalanceMode::Auto) => Verdict::Match,
        (WhiteBalanceMode::Manual { kelvin: want }, WhiteBalanceMode::Manual { kelvin: got }) => {
            if want.abs_diff(got) <= KELVIN_TOLERANCE {
                Verdict::Match
            } else {
                Verdict::Mismatch
            }
        }
        _ => Verdict::Mismatch,
    }
}

fn focus_verdict(requested: FocusMode, hardware: FocusMode) -> Verdict {
    match (requested, hardware) {
        (FocusMode::Continuous, FocusMode::Continuous) => Verdict::Match,
        (FocusMode::Manual { distance: want }, FocusMode::Manual { distance: got }) => {
            if (want - got).abs() <= FOCUS_TOLERANCE {
                Verdict::Match
            } else {
                Verdict::Mismatch
            }
        }
        _ => Verdict::Mismatch,
    }
}

fn format_white_balance(mode: WhiteBalanceMode) -> String {
    match mode {
        WhiteBalanceMode::Auto => "auto".to_owned(),
        WhiteBalanceMode::Manual { kelvin } => format_kelvin(kelvin),
    }
}

fn format_focus(mode: FocusMode) -> String {
    match mode {
        FocusMode::Continuous => "continuous".to_owned(),
        FocusMode::Manual { distance } => format!("{distance:.2} dpt"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::FlashMode;
    use std::time::SystemTime;

    fn trail() -> (AuditTrail, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let trail = AuditTrail::new(sink.clone(), &SessionConfig::default());
        (trail, sink)
    }

    fn request(iso: Option<u32>, exposure: Option<u64>) -> CaptureRequest {
        CaptureRequest {
            targets: vec![],
            iso,
            exposure_nanos: exposure,
            white_balance: WhiteBalanceMode::Auto,
            focus: FocusMode::Continuous,
            flash: FlashMode::Off,
            jpeg_orientation: 0,
        }
    }

    fn result(iso: u32, exposure: u64) -> HardwareResult {
        HardwareResult {
            iso,
            exposure_nanos: exposure,
            white_balance: WhiteBalanceMode::Auto,
            focus: FocusMode::Continuous,
            flash: FlashMode::Off,
            timestamp: SystemTime::now(),
        }
    }

    fn records_for(sink: &MemorySink, category: AuditCategory) -> Vec<AuditRecord> {
        sink.snapshot()
            .into_iter()
            .filter(|r| r.category == category)
            .collect()
    }

    #[test]
    fn test_iso_mismatch_is_recorded_not_raised() {
        let (trail, sink) = trail();
        trail.verify_capture(&request(Some(3200), None), &result(800, 10_000_000));

        let records = records_for(&sink, AuditCategory::Iso);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].verdict, Verdict::Mismatch);
        assert_eq!(records[0].requested, "ISO 3200");
        assert_eq!(records[0].hardware, "ISO 800");
    }

    #[test]
    fn test_iso_within_tolerance_matches() {
        let (trail, sink) = trail();
        trail.verify_capture(&request(Some(3200), None), &result(3260, 10_000_000));
        let records = records_for(&sink, AuditCategory::Iso);
        assert_eq!(records[0].verdict, Verdict::Match);
    }

    #[test]
    fn test_auto_exposure_fields_are_not_compared() {
        let (trail, sink) = trail();
        trail.verify_capture(&request(None, None), &result(400, 16_000_000));
        assert!(records_for(&sink, AuditCategory::Iso).is_empty());
        assert!(records_for(&sink, AuditCategory::Exposure).is_empty());
        // White balance, focus, and flash are always audited.
        assert_eq!(records_for(&sink, AuditCategory::WhiteBalance).len(), 1);
    }

    #[test]
    fn test_exposure_mismatch_recorded() {
        let (trail, sink) = trail();
        trail.verify_capture(
            &request(None, Some(100_000_000)),
            &result(400, 16_000_000),
        );
        let records = records_for(&sink, AuditCategory::Exposure);
        assert_eq!(records[0].verdict, Verdict::Mismatch);
        assert_eq!(records[0].requested, "1/10");
        assert_eq!(records[0].hardware, "1/63");
    }

    #[test]
    fn test_white_balance_mode_disagreement_is_mismatch() {
        let (trail, sink) = trail();
        let mut req = request(None, None);
        req.white_balance = WhiteBalanceMode::Manual { kelvin: 5600 };
        trail.verify_capture(&req, &result(400, 16_000_000));
        let records = records_for(&sink, AuditCategory::WhiteBalance);
        assert_eq!(records[0].verdict, Verdict::Mismatch);
        assert_eq!(records[0].requested, "5600K");
        assert_eq!(records[0].hardware, "auto");
    }

    #[test]
    fn test_still_device_with_active_effect_is_suspicious() {
        let (trail, sink) = trail();
        // Worked example: sensor below threshold on both axes, offset active.
        assert!(trail.observe_motion([0.005, 0.004, 0.01], [0.15, 0.02]));

        let records = records_for(&sink, AuditCategory::Motion);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].verdict, Verdict::Suspicious);
    }

    #[test]
    fn test_moving_device_is_not_flagged() {
        let (trail, sink) = trail();
        // Worked example: motion present on the first axis.
        assert!(!trail.observe_motion([0.02, 0.0, 0.0], [0.15, 0.02]));
        assert!(records_for(&sink, AuditCategory::Motion).is_empty());
    }

    #[test]
    fn test_still_device_with_quiet_effect_is_not_flagged() {
        let (trail, _sink) = trail();
        assert!(!trail.observe_motion([0.005, 0.004, 0.01], [0.05, 0.02]));
    }

    #[test]
    fn test_location_absence_and_null_island_are_flagged() {
        let (trail, sink) = trail();
        trail.annotate_location("mem:a", None);
        trail.annotate_location("mem:b", Some((0.0, 0.0)));
        trail.annotate_location("mem:c", Some((48.20817, 16.37382)));

        let records = records_for(&sink, AuditCategory::Location);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].verdict, Verdict::Suspicious);
        assert_eq!(records[1].verdict, Verdict::Suspicious);
        assert_eq!(records[2].verdict, Verdict::Match);
    }

    #[test]
    fn test_memory_sink_preserves_append_order() {
        let (trail, sink) = trail();
        trail.annotate_location("first", None);
        trail.annotate_location("second", None);
        let records = sink.snapshot();
        assert_eq!(records[0].requested, "first");
        assert_eq!(records[1].requested, "second");
    }
}
