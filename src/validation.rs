//! Request validation against the capability snapshot.
//!
//! Checks run before any native command is issued so a rejected request
//! never disturbs the device.

use crate::error::{CameraError, Result};
use crate::session::CapabilitySnapshot;
use crate::shutter::TOLERANCE_FLOOR_S;

/// Longest bulb exposure accepted, in seconds.
pub const MAX_BULB_EXPOSURE_S: f64 = 86_400.0;

/// Validates a requested exposure duration.
///
/// # Errors
///
/// Returns `ExposureOutOfRange` if the duration is not finite, not positive,
/// shorter than the device minimum, or longer than [`MAX_BULB_EXPOSURE_S`],
/// and `UnsupportedExposureDuration` if it exceeds the timed maximum on a
/// body without bulb.
pub fn validate_exposure(duration_s: f64, caps: &CapabilitySnapshot) -> Result<()> {
    let out_of_range = || CameraError::ExposureOutOfRange {
        requested: duration_s,
        min: caps.min_exposure,
        max: caps.max_exposure,
    };

    if !duration_s.is_finite() || duration_s <= 0.0 {
        return Err(out_of_range());
    }
    if duration_s + TOLERANCE_FLOOR_S < caps.min_exposure {
        return Err(out_of_range());
    }
    if duration_s > caps.max_exposure + TOLERANCE_FLOOR_S && !caps.bulb_capable {
        return Err(CameraError::UnsupportedExposureDuration(duration_s));
    }
    let ceiling = MAX_BULB_EXPOSURE_S.max(caps.max_exposure);
    if duration_s > ceiling {
        return Err(CameraError::ExposureOutOfRange {
            requested: duration_s,
            min: caps.min_exposure,
            max: ceiling,
        });
    }

    Ok(())
}

/// Validates a requested ISO sensitivity.
///
/// # Errors
///
/// Returns `GainOutOfRange` if `iso` lies outside the advertised range.
pub fn validate_gain(iso: i32, caps: &CapabilitySnapshot) -> Result<()> {
    if iso < caps.min_sensitivity || iso > caps.max_sensitivity {
        return Err(CameraError::GainOutOfRange {
            requested: iso,
            min: caps.min_sensitivity,
            max: caps.max_sensitivity,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(bulb_capable: bool) -> CapabilitySnapshot {
        CapabilitySnapshot {
            min_sensitivity: 160,
            max_sensitivity: 12_800,
            min_exposure: 1.0 / 180_000.0,
            max_exposure: 60.0,
            bulb_capable,
        }
    }

    #[test]
    fn test_exposure_in_range() {
        assert!(validate_exposure(0.01, &caps(false)).is_ok());
        assert!(validate_exposure(60.0, &caps(false)).is_ok());
        assert!(validate_exposure(1.0 / 180_000.0, &caps(false)).is_ok());
    }

    #[test]
    fn test_exposure_rejects_non_positive() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = validate_exposure(bad, &caps(true));
            assert!(
                matches!(result, Err(CameraError::ExposureOutOfRange { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_exposure_beyond_max() {
        assert!(validate_exposure(120.0, &caps(true)).is_ok());
        assert!(matches!(
            validate_exposure(120.0, &caps(false)),
            Err(CameraError::UnsupportedExposureDuration(_))
        ));
    }

    #[test]
    fn test_bulb_ceiling() {
        assert!(validate_exposure(MAX_BULB_EXPOSURE_S, &caps(true)).is_ok());
        for huge in [MAX_BULB_EXPOSURE_S * 2.0, 1e20, f64::MAX] {
            assert!(
                matches!(
                    validate_exposure(huge, &caps(true)),
                    Err(CameraError::ExposureOutOfRange { .. })
                ),
                "{huge} should be rejected"
            );
        }
    }

    #[test]
    fn test_gain_range() {
        assert!(validate_gain(800, &caps(true)).is_ok());
        assert!(validate_gain(160, &caps(true)).is_ok());
        assert!(matches!(
            validate_gain(100, &caps(true)),
            Err(CameraError::GainOutOfRange { requested: 100, .. })
        ));
        assert!(validate_gain(25_600, &caps(true)).is_err());
    }
}
