//! Dial-to-parameter mapping and display formatting.
//!
//! A dial is a 0-360 degree user-facing control. Every mapper here is a pure
//! total function over `angle ∈ [0, 360)` returning a value inside its
//! documented physical range; callers clamp or wrap the angle before
//! invocation. Each mapper has a paired formatter producing the canonical
//! display string, round-trip consistent with the numeric output to one
//! decimal of precision.

/// The physical parameter a dial controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialKind {
    /// Sensor sensitivity, geometric progression over six stops.
    Iso,
    /// Exposure time, 19 discrete stops from 1/8000 s to 30 s.
    Shutter,
    /// F-number, 10 discrete stops from f/1.4 to f/22.
    Aperture,
    /// Color temperature in Kelvin, linear.
    WhiteBalance,
    /// Magnification factor, linear.
    Zoom,
    /// Exposure compensation in EV, linear.
    ExposureComp,
}

/// Nanoseconds per second, for shutter conversions.
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Shutter stop times in seconds, slowest last.
///
/// The dial is bucketed over these 19 stops; there is no interpolation
/// between them. Ties at bucket boundaries always round down.
const SHUTTER_STOPS: [f64; 19] = [
    1.0 / 8000.0,
    1.0 / 4000.0,
    1.0 / 2000.0,
    1.0 / 1000.0,
    1.0 / 500.0,
    1.0 / 250.0,
    1.0 / 125.0,
    1.0 / 60.0,
    1.0 / 30.0,
    1.0 / 15.0,
    1.0 / 8.0,
    1.0 / 4.0,
    1.0 / 2.0,
    1.0,
    2.0,
    4.0,
    8.0,
    15.0,
    30.0,
];

/// Aperture f-number stops, widest first.
const APERTURE_STOPS: [f64; 10] = [1.4, 1.8, 2.0, 2.8, 4.0, 5.6, 8.0, 11.0, 16.0, 22.0];

/// ISO range endpoints (six stops).
const ISO_MIN: f64 = 100.0;
const ISO_MAX: f64 = 6400.0;

/// Bucket a dial angle into one of `stops` table entries.
///
/// Index = `floor(angle / 360 * (stops - 1))`, clamped to `[0, stops - 1]`.
fn stop_index(angle: f64, stops: usize) -> usize {
    #[allow(clippy::cast_precision_loss)]
    let raw = (angle / 360.0 * (stops - 1) as f64).floor();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let idx = raw.max(0.0) as usize;
    idx.min(stops - 1)
}

/// Map a dial angle to a white balance color temperature in Kelvin.
///
/// Linear over [2000, 10000]: 0 degrees is 2000 K, 180 degrees is 6000 K.
#[must_use]
pub fn white_balance_kelvin(angle: f64) -> u32 {
    let kelvin = 8000.0f64.mul_add(angle / 360.0, 2000.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        kelvin.round().clamp(2000.0, 10000.0) as u32
    }
}

/// Map a dial angle to an exposure time in nanoseconds.
///
/// Table lookup over the 19 shutter stops; not continuous.
#[must_use]
pub fn shutter_nanos(angle: f64) -> u64 {
    let seconds = SHUTTER_STOPS[stop_index(angle, SHUTTER_STOPS.len())];
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        #[allow(clippy::cast_precision_loss)]
        let nanos = (seconds * NANOS_PER_SEC as f64).round();
        nanos as u64
    }
}

/// Map a dial angle to an ISO sensitivity value.
///
/// Exponential, `100 * 2^(6 * angle / 360)`, clamped to [100, 6400]. The
/// progression is geometric across six stops and monotonically
/// non-decreasing in the angle.
#[must_use]
pub fn iso_value(angle: f64) -> u32 {
    let iso = ISO_MIN * (6.0 * angle / 360.0).exp2();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        iso.clamp(ISO_MIN, ISO_MAX).round() as u32
    }
}

/// Map a dial angle to an aperture f-number.
///
/// Table lookup over the 10 aperture stops, same bucketing rule as the
/// shutter dial.
#[must_use]
pub fn aperture_f_number(angle: f64) -> f64 {
    APERTURE_STOPS[stop_index(angle, APERTURE_STOPS.len())]
}

/// Map a dial angle to a zoom factor.
///
/// Linear over [0.5, 10.0].
#[must_use]
pub fn zoom_factor(angle: f64) -> f64 {
    9.5f64.mul_add(angle / 360.0, 0.5)
}

/// Map a dial angle to an exposure compensation value in EV.
///
/// Linear over [-3.0, +3.0].
#[must_use]
pub fn exposure_comp_ev(angle: f64) -> f64 {
    6.0f64.mul_add(angle / 360.0, -3.0)
}

/// Canonical display string for a white balance temperature, e.g. `6000K`.
#[must_use]
pub fn format_kelvin(kelvin: u32) -> String {
    format!("{kelvin}K")
}

/// Canonical display string for an exposure time.
///
/// Sub-second exposures render as `1/N`, one second and longer as `Ns`.
/// The two forms never mix for the same input.
#[must_use]
pub fn format_shutter(nanos: u64) -> String {
    if nanos < NANOS_PER_SEC {
        #[allow(clippy::cast_precision_loss)]
        let denominator = (NANOS_PER_SEC as f64 / nanos as f64).round();
        format!("1/{denominator:.0}")
    } else {
        #[allow(clippy::cast_precision_loss)]
        let seconds = (nanos as f64 / NANOS_PER_SEC as f64).round();
        format!("{seconds:.0}s")
    }
}

/// Canonical display string for an ISO value, e.g. `ISO 800`.
#[must_use]
pub fn format_iso(iso: u32) -> String {
    format!("ISO {iso}")
}

/// Canonical display string for an aperture, e.g. `f/1.4`.
#[must_use]
pub fn format_aperture(f_number: f64) -> String {
    format!("f/{f_number:.1}")
}

/// Canonical display string for a zoom factor, e.g. `2.4x`.
#[must_use]
pub fn format_zoom(zoom: f64) -> String {
    format!("{zoom:.1}x")
}

/// Canonical display string for exposure compensation, e.g. `+1.3 EV`.
#[must_use]
pub fn format_exposure_comp(ev: f64) -> String {
    format!("{ev:+.1} EV")
}

/// Current angle of every dial, as last set by the caller.
///
/// Angles are stored in degrees within [0, 360); `set` wraps out-of-range
/// finite inputs onto the circle since the physical control is circular.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DialBank {
    iso: f64,
    shutter: f64,
    aperture: f64,
    white_balance: f64,
    zoom: f64,
    exposure_comp: f64,
}

impl DialBank {
    /// Create a dial bank with every dial at 0 degrees.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one dial, wrapping the angle into [0, 360).
    ///
    /// Non-finite angles are ignored; the dial keeps its previous position.
    pub fn set(&mut self, kind: DialKind, angle: f64) {
        if !angle.is_finite() {
            log::warn!("ignoring non-finite {kind:?} dial angle");
            return;
        }
        let wrapped = angle.rem_euclid(360.0);
        match kind {
            DialKind::Iso => self.iso = wrapped,
            DialKind::Shutter => self.shutter = wrapped,
            DialKind::Aperture => self.aperture = wrapped,
            DialKind::WhiteBalance => self.white_balance = wrapped,
            DialKind::Zoom => self.zoom = wrapped,
            DialKind::ExposureComp => self.exposure_comp = wrapped,
        }
    }

    /// Current angle of one dial in degrees.
    #[must_use]
    pub const fn angle(&self, kind: DialKind) -> f64 {
        match kind {
            DialKind::Iso => self.iso,
            DialKind::Shutter => self.shutter,
            DialKind::Aperture => self.aperture,
            DialKind::WhiteBalance => self.white_balance,
            DialKind::Zoom => self.zoom,
            DialKind::ExposureComp => self.exposure_comp,
        }
    }

    /// Mapped ISO sensitivity for the current ISO dial position.
    #[must_use]
    pub fn iso(&self) -> u32 {
        iso_value(self.iso)
    }

    /// Mapped exposure time for the current shutter dial position.
    #[must_use]
    pub fn shutter_nanos(&self) -> u64 {
        shutter_nanos(self.shutter)
    }

    /// Mapped f-number for the current aperture dial position.
    #[must_use]
    pub fn aperture(&self) -> f64 {
        aperture_f_number(self.aperture)
    }

    /// Mapped color temperature for the current white balance dial position.
    #[must_use]
    pub fn white_balance_kelvin(&self) -> u32 {
        white_balance_kelvin(self.white_balance)
    }

    /// Mapped zoom factor for the current zoom dial position.
    #[must_use]
    pub fn zoom(&self) -> f64 {
        zoom_factor(self.zoom)
    }

    /// Mapped exposure compensation for the current EV dial position.
    #[must_use]
    pub fn exposure_comp(&self) -> f64 {
        exposure_comp_ev(self.exposure_comp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sweep step small enough to hit every bucket boundary neighborhood.
    const SWEEP_STEP: f64 = 0.25;

    fn sweep() -> impl Iterator<Item = f64> {
        (0..).map(|i| f64::from(i) * SWEEP_STEP).take_while(|a| *a < 360.0)
    }

    #[test]
    fn test_kelvin_anchors() {
        assert_eq!(white_balance_kelvin(0.0), 2000);
        assert_eq!(white_balance_kelvin(180.0), 6000);
    }

    #[test]
    fn test_kelvin_in_range_over_sweep() {
        for angle in sweep() {
            let kelvin = white_balance_kelvin(angle);
            assert!((2000..=10000).contains(&kelvin), "angle {angle} -> {kelvin}");
        }
    }

    #[test]
    fn test_iso_in_range_and_monotonic() {
        let mut previous = 0;
        for angle in sweep() {
            let iso = iso_value(angle);
            assert!((100..=6400).contains(&iso), "angle {angle} -> {iso}");
            assert!(iso >= previous, "ISO decreased at angle {angle}");
            previous = iso;
        }
        assert_eq!(iso_value(0.0), 100);
    }

    #[test]
    fn test_shutter_in_range_and_bucket_monotonic() {
        let mut previous_idx = 0;
        for angle in sweep() {
            let nanos = shutter_nanos(angle);
            assert!(nanos >= 125_000, "angle {angle} -> {nanos}ns below 1/8000s");
            assert!(nanos <= 30 * NANOS_PER_SEC, "angle {angle} -> {nanos}ns above 30s");

            let idx = stop_index(angle, SHUTTER_STOPS.len());
            assert!(idx >= previous_idx, "bucket index decreased at angle {angle}");
            previous_idx = idx;
        }
    }

    #[test]
    fn test_shutter_bucket_rounds_down_at_boundary() {
        // One bucket spans 360 / 18 = 20 degrees. Exactly at the boundary the
        // index steps up; immediately below it stays down.
        assert_eq!(stop_index(0.0, SHUTTER_STOPS.len()), 0);
        assert_eq!(stop_index(19.999, SHUTTER_STOPS.len()), 0);
        assert_eq!(stop_index(20.0, SHUTTER_STOPS.len()), 1);
        assert_eq!(shutter_nanos(0.0), 125_000);
    }

    #[test]
    fn test_aperture_in_range_and_bucket_monotonic() {
        let mut previous_idx = 0;
        for angle in sweep() {
            let f_number = aperture_f_number(angle);
            assert!(
                APERTURE_STOPS.contains(&f_number),
                "angle {angle} -> f/{f_number} not a stop"
            );

            let idx = stop_index(angle, APERTURE_STOPS.len());
            assert!(idx >= previous_idx, "bucket index decreased at angle {angle}");
            previous_idx = idx;
        }
        assert!((aperture_f_number(0.0) - 1.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zoom_and_ev_in_range() {
        for angle in sweep() {
            let zoom = zoom_factor(angle);
            assert!((0.5..=10.0).contains(&zoom), "angle {angle} -> {zoom}");

            let ev = exposure_comp_ev(angle);
            assert!((-3.0..=3.0).contains(&ev), "angle {angle} -> {ev}");
        }
        assert!((zoom_factor(0.0) - 0.5).abs() < f64::EPSILON);
        assert!((exposure_comp_ev(0.0) + 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shutter_formatting_forms_never_mix() {
        for angle in sweep() {
            let nanos = shutter_nanos(angle);
            let text = format_shutter(nanos);
            if nanos < NANOS_PER_SEC {
                assert!(text.starts_with("1/"), "sub-second form: {text}");
            } else {
                assert!(text.ends_with('s') && !text.starts_with("1/"), "seconds form: {text}");
            }
            // Determinism: formatting the same value twice is identical.
            assert_eq!(text, format_shutter(nanos));
        }
    }

    #[test]
    fn test_formatter_canonical_strings() {
        assert_eq!(format_shutter(shutter_nanos(0.0)), "1/8000");
        assert_eq!(format_shutter(30 * NANOS_PER_SEC), "30s");
        assert_eq!(format_kelvin(6000), "6000K");
        assert_eq!(format_iso(800), "ISO 800");
        assert_eq!(format_aperture(1.4), "f/1.4");
        assert_eq!(format_aperture(22.0), "f/22.0");
        assert_eq!(format_zoom(2.4), "2.4x");
        assert_eq!(format_exposure_comp(1.3), "+1.3 EV");
        assert_eq!(format_exposure_comp(-3.0), "-3.0 EV");
    }

    #[test]
    fn test_dial_bank_wraps_and_ignores_non_finite() {
        let mut dials = DialBank::new();
        dials.set(DialKind::WhiteBalance, 540.0);
        assert!((dials.angle(DialKind::WhiteBalance) - 180.0).abs() < 1e-9);
        assert_eq!(dials.white_balance_kelvin(), 6000);

        dials.set(DialKind::WhiteBalance, f64::NAN);
        assert!((dials.angle(DialKind::WhiteBalance) - 180.0).abs() < 1e-9);

        dials.set(DialKind::Iso, -90.0);
        assert!((dials.angle(DialKind::Iso) - 270.0).abs() < 1e-9);
    }
}
