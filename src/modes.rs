//! Capture mode policy table.
//!
//! Every capture mode maps to an immutable [`ModeProfile`] describing which
//! parameters are pinned, which the user may tune, and whether auto exposure
//! and autofocus drive the rest. The mode set is a closed enum so adding or
//! removing a mode is a compile-time-checked change.

use crate::dial::DialBank;
use crate::hardware::{CaptureRequest, FlashMode, FocusMode, SurfaceId, WhiteBalanceMode};

/// Fixed ISO applied by Night mode.
const NIGHT_ISO: u32 = 3200;

/// Fixed exposure applied by Night mode (100 ms).
const NIGHT_EXPOSURE_NANOS: u64 = 100_000_000;

/// The set of capture modes the session understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureMode {
    /// General stills, fully automatic exposure.
    Photo,
    /// Stills with the softening post-filter requested.
    Portrait,
    /// Long fixed exposure at high sensitivity, auto exposure off.
    Night,
    /// Full manual control over sensitivity, exposure, color, and focus.
    Professional,
    /// Continuous-capture template, otherwise behaves like Photo.
    Video,
}

impl CaptureMode {
    /// All modes, in presentation order.
    pub const ALL: [Self; 5] = [
        Self::Photo,
        Self::Portrait,
        Self::Night,
        Self::Professional,
        Self::Video,
    ];

    /// Short tag used when naming persisted captures.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Portrait => "portrait",
            Self::Night => "night",
            Self::Professional => "pro",
            Self::Video => "video",
        }
    }

    /// The parameter policy for this mode.
    #[must_use]
    pub const fn profile(self) -> ModeProfile {
        match self {
            Self::Photo => ModeProfile {
                mode: self,
                auto_exposure: true,
                autofocus: FocusPolicy::Continuous,
                fixed_iso: None,
                fixed_exposure_nanos: None,
                softening_filter: false,
                continuous_template: false,
                tunable: &[Tunable::Flash],
            },
            Self::Portrait => ModeProfile {
                mode: self,
                auto_exposure: true,
                autofocus: FocusPolicy::Continuous,
                fixed_iso: None,
                fixed_exposure_nanos: None,
                softening_filter: true,
                continuous_template: false,
                tunable: &[Tunable::Flash],
            },
            Self::Night => ModeProfile {
                mode: self,
                auto_exposure: false,
                autofocus: FocusPolicy::Continuous,
                fixed_iso: Some(NIGHT_ISO),
                fixed_exposure_nanos: Some(NIGHT_EXPOSURE_NANOS),
                softening_filter: false,
                continuous_template: false,
                tunable: &[],
            },
            Self::Professional => ModeProfile {
                mode: self,
                auto_exposure: false,
                autofocus: FocusPolicy::Manual,
                fixed_iso: None,
                fixed_exposure_nanos: None,
                softening_filter: false,
                continuous_template: false,
                tunable: &[
                    Tunable::Iso,
                    Tunable::Exposure,
                    Tunable::WhiteBalance,
                    Tunable::FocusDistance,
                ],
            },
            Self::Video => ModeProfile {
                mode: self,
                auto_exposure: true,
                autofocus: FocusPolicy::Continuous,
                fixed_iso: None,
                fixed_exposure_nanos: None,
                softening_filter: false,
                continuous_template: true,
                tunable: &[Tunable::Flash],
            },
        }
    }
}

/// Autofocus policy of a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPolicy {
    /// Hardware keeps focus continuously.
    Continuous,
    /// Focus distance comes from the user.
    Manual,
}

/// Parameters the user may tune in a given mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tunable {
    /// Flash mode.
    Flash,
    /// Sensor sensitivity.
    Iso,
    /// Exposure time.
    Exposure,
    /// White balance color temperature.
    WhiteBalance,
    /// Manual focus distance.
    FocusDistance,
}

/// Immutable parameter policy for one capture mode.
///
/// Constructed once per mode via [`CaptureMode::profile`]; never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfile {
    /// The mode this profile belongs to.
    pub mode: CaptureMode,
    /// Whether auto exposure drives sensitivity and exposure time.
    pub auto_exposure: bool,
    /// Autofocus policy.
    pub autofocus: FocusPolicy,
    /// Pinned ISO, overriding both auto exposure and the dial.
    pub fixed_iso: Option<u32>,
    /// Pinned exposure time, overriding both auto exposure and the dial.
    pub fixed_exposure_nanos: Option<u64>,
    /// Whether the softening post-filter is requested.
    pub softening_filter: bool,
    /// Whether requests use the continuous-capture template.
    pub continuous_template: bool,
    tunable: &'static [Tunable],
}

impl ModeProfile {
    /// Whether the user may tune the given parameter in this mode.
    #[must_use]
    pub fn is_tunable(&self, parameter: Tunable) -> bool {
        self.tunable.contains(&parameter)
    }

    /// Build a capture request from this profile and the current controls.
    ///
    /// Fixed parameters win over dial values; dial values apply only where
    /// this profile marks the parameter tunable; everything else is left to
    /// the hardware's automatic control. The request is built fresh on every
    /// call and never mutated after submission.
    #[must_use]
    pub fn build_request(
        &self,
        dials: &DialBank,
        flash: FlashMode,
        focus_distance: f64,
        targets: Vec<SurfaceId>,
        jpeg_orientation: u16,
    ) -> CaptureRequest {
        let iso = self.fixed_iso.or_else(|| {
            (!self.auto_exposure && self.is_tunable(Tunable::Iso)).then(|| dials.iso())
        });
        let exposure_nanos = self.fixed_exposure_nanos.or_else(|| {
            (!self.auto_exposure && self.is_tunable(Tunable::Exposure))
                .then(|| dials.shutter_nanos())
        });
        let white_balance = if self.is_tunable(Tunable::WhiteBalance) {
            WhiteBalanceMode::Manual {
                kelvin: dials.white_balance_kelvin(),
            }
        } else {
            WhiteBalanceMode::Auto
        };
        let focus = match self.autofocus {
            FocusPolicy::Continuous => FocusMode::Continuous,
            FocusPolicy::Manual => FocusMode::Manual {
                distance: focus_distance,
            },
        };
        let flash = if self.is_tunable(Tunable::Flash) {
            flash
        } else {
            FlashMode::Off
        };

        CaptureRequest {
            targets,
            iso,
            exposure_nanos,
            white_balance,
            focus,
            flash,
            jpeg_orientation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dial::DialKind;

    #[test]
    fn test_night_profile_pins_iso_and_exposure() {
        let profile = CaptureMode::Night.profile();
        assert!(!profile.auto_exposure);
        assert_eq!(profile.fixed_iso, Some(3200));
        assert_eq!(profile.fixed_exposure_nanos, Some(100_000_000));
        assert!(!profile.is_tunable(Tunable::Iso));
        assert!(!profile.is_tunable(Tunable::Flash));
    }

    #[test]
    fn test_auto_modes_leave_exposure_to_hardware() {
        for mode in [CaptureMode::Photo, CaptureMode::Portrait, CaptureMode::Video] {
            let profile = mode.profile();
            let request =
                profile.build_request(&DialBank::new(), FlashMode::Auto, 0.0, vec![], 0);
            assert_eq!(request.iso, None, "{mode:?}");
            assert_eq!(request.exposure_nanos, None, "{mode:?}");
            assert_eq!(request.white_balance, WhiteBalanceMode::Auto, "{mode:?}");
            assert_eq!(request.flash, FlashMode::Auto, "{mode:?}");
        }
    }

    #[test]
    fn test_professional_request_follows_dials() {
        let mut dials = DialBank::new();
        dials.set(DialKind::Iso, 180.0);
        dials.set(DialKind::Shutter, 180.0);
        dials.set(DialKind::WhiteBalance, 180.0);

        let profile = CaptureMode::Professional.profile();
        let request = profile.build_request(&dials, FlashMode::On, 2.5, vec![SurfaceId(7)], 90);

        assert_eq!(request.iso, Some(dials.iso()));
        assert_eq!(request.exposure_nanos, Some(dials.shutter_nanos()));
        assert_eq!(
            request.white_balance,
            WhiteBalanceMode::Manual { kelvin: 6000 }
        );
        assert_eq!(request.focus, FocusMode::Manual { distance: 2.5 });
        // Flash is not tunable in Professional mode.
        assert_eq!(request.flash, FlashMode::Off);
        assert_eq!(request.jpeg_orientation, 90);
        assert_eq!(request.targets, vec![SurfaceId(7)]);
    }

    #[test]
    fn test_portrait_softening_and_video_template() {
        assert!(CaptureMode::Portrait.profile().softening_filter);
        assert!(CaptureMode::Video.profile().continuous_template);
        assert!(!CaptureMode::Photo.profile().softening_filter);
    }

    #[test]
    fn test_mode_tags_are_unique() {
        for (i, a) in CaptureMode::ALL.iter().enumerate() {
            for b in CaptureMode::ALL.iter().skip(i + 1) {
                assert_ne!(a.tag(), b.tag());
            }
        }
    }
}
