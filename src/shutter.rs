//! Shutter-speed table: device codes to exposure durations and back.
//!
//! Device codes are the exposure time in microseconds of the exact third-stop
//! power of two (1/100 s is 2^(-20/3) s = 9843 us), while durations are the
//! nominal values printed on the dial. The mapping is therefore non-linear and
//! lookups go through a nearest-match search with a small tolerance.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{CameraError, Result};
use crate::traits::BULB_CODE;

/// Absolute floor of the lookup tolerance, in seconds.
pub const TOLERANCE_FLOOR_S: f64 = 0.0001;

/// Relative lookup tolerance.
const TOLERANCE_RATIO: f64 = 0.001;

/// Reference list of `(code, nominal seconds)`, electronic shutter extremes
/// first. Sentinels are part of the vendor enumeration and skipped on build.
pub const REFERENCE_SPEEDS: &[(i32, f64)] = &[
    (0, 0.0),
    (BULB_CODE, 0.0),
    (5, 1.0 / 180_000.0),
    (6, 1.0 / 160_000.0),
    (8, 1.0 / 128_000.0),
    (10, 1.0 / 100_000.0),
    (12, 1.0 / 80_000.0),
    (15, 1.0 / 64_000.0),
    (19, 1.0 / 50_000.0),
    (24, 1.0 / 40_000.0),
    (31, 1.0 / 32_000.0),
    (38, 1.0 / 25_000.0),
    (48, 1.0 / 20_000.0),
    (61, 1.0 / 16_000.0),
    (77, 1.0 / 13_000.0),
    (97, 1.0 / 10_000.0),
    (122, 1.0 / 8_000.0),
    (154, 1.0 / 6_400.0),
    (194, 1.0 / 5_000.0),
    (244, 1.0 / 4_000.0),
    (308, 1.0 / 3_200.0),
    (388, 1.0 / 2_500.0),
    (488, 1.0 / 2_000.0),
    (615, 1.0 / 1_600.0),
    (775, 1.0 / 1_250.0),
    (976, 1.0 / 1_000.0),
    (1_230, 1.0 / 800.0),
    (1_550, 1.0 / 640.0),
    (1_953, 1.0 / 500.0),
    (2_460, 1.0 / 400.0),
    (3_100, 1.0 / 320.0),
    (3_906, 1.0 / 250.0),
    (4_921, 1.0 / 200.0),
    (6_200, 1.0 / 160.0),
    (7_812, 1.0 / 125.0),
    (9_843, 1.0 / 100.0),
    (12_401, 1.0 / 80.0),
    (15_625, 1.0 / 60.0),
    (19_686, 1.0 / 50.0),
    (24_803, 1.0 / 40.0),
    (31_250, 1.0 / 30.0),
    (39_372, 1.0 / 25.0),
    (49_606, 1.0 / 20.0),
    (62_500, 1.0 / 15.0),
    (78_745, 1.0 / 13.0),
    (99_212, 1.0 / 10.0),
    (125_000, 1.0 / 8.0),
    (157_490, 1.0 / 6.0),
    (198_425, 1.0 / 5.0),
    (250_000, 1.0 / 4.0),
    (314_980, 1.0 / 3.0),
    (396_850, 1.0 / 2.5),
    (500_000, 1.0 / 2.0),
    (629_960, 1.0 / 1.6),
    (793_700, 1.0 / 1.3),
    (1_000_000, 1.0),
    (1_259_921, 1.3),
    (1_587_401, 1.6),
    (2_000_000, 2.0),
    (2_519_842, 2.5),
    (3_174_802, 3.0),
    (4_000_000, 4.0),
    (5_039_684, 5.0),
    (6_349_604, 6.0),
    (8_000_000, 8.0),
    (10_079_368, 10.0),
    (12_699_208, 13.0),
    (16_000_000, 15.0),
    (20_158_736, 20.0),
    (25_398_416, 25.0),
    (32_000_000, 30.0),
    (40_317_473, 40.0),
    (50_796_833, 50.0),
    (64_000_000, 60.0),
];

/// Bidirectional code/duration mapping.
///
/// `code -> duration` is complete. `duration -> code` keeps the first code
/// seen for a given duration, so a later code sharing a duration is reachable
/// only through [`ShutterSpeedTable::duration_for`].
#[derive(Debug, Clone, Default)]
pub struct ShutterSpeedTable {
    by_code: BTreeMap<i32, f64>,
    /// Sorted by duration.
    by_duration: Vec<(f64, i32)>,
}

impl ShutterSpeedTable {
    /// Build the table from [`REFERENCE_SPEEDS`].
    pub fn reference() -> Self {
        Self::from_entries(REFERENCE_SPEEDS)
    }

    /// Build a table from `(code, seconds)` pairs.
    pub fn from_entries(entries: &[(i32, f64)]) -> Self {
        let mut table = Self::default();

        for &(code, duration) in entries {
            if code == 0 || code == BULB_CODE {
                continue;
            }
            if table.by_code.contains_key(&code) {
                debug!(code, "duplicate shutter code ignored");
                continue;
            }
            table.by_code.insert(code, duration);

            if let Some(&(_, existing)) = table
                .by_duration
                .iter()
                .find(|(d, _)| d.to_bits() == duration.to_bits())
            {
                debug!(code, existing, duration, "duration already mapped, keeping first code");
                continue;
            }
            table.by_duration.push((duration, code));
        }

        table.by_duration.sort_by(|a, b| a.0.total_cmp(&b.0));
        table
    }

    /// Number of distinct codes.
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    /// Whether the table holds no codes.
    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Shortest tabulated duration, or 0 for an empty table.
    pub fn min_exposure(&self) -> f64 {
        self.by_duration.first().map_or(0.0, |&(d, _)| d)
    }

    /// Longest tabulated duration, or 0 for an empty table.
    pub fn max_exposure(&self) -> f64 {
        self.by_duration.last().map_or(0.0, |&(d, _)| d)
    }

    /// Duration of a device code.
    pub fn duration_for(&self, code: i32) -> Option<f64> {
        self.by_code.get(&code).copied()
    }

    /// Iterate `(code, seconds)` in code order.
    pub fn entries(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.by_code.iter().map(|(&c, &d)| (c, d))
    }

    /// Resolve a duration to a device code.
    ///
    /// Picks the nearest tabulated duration and accepts it within
    /// `max(nearest * 0.001, 0.0001)` seconds. Past the table maximum a
    /// bulb-capable device gets [`BULB_CODE`].
    pub fn code_for(&self, duration: f64, bulb_capable: bool) -> Result<i32> {
        let nearest = self
            .by_duration
            .iter()
            .min_by(|a, b| (a.0 - duration).abs().total_cmp(&(b.0 - duration).abs()));

        if let Some(&(closest, code)) = nearest {
            let tolerance = (closest * TOLERANCE_RATIO).max(TOLERANCE_FLOOR_S);
            if (closest - duration).abs() <= tolerance {
                return Ok(code);
            }
        }

        if bulb_capable && !self.is_empty() && duration > self.max_exposure() {
            return Ok(BULB_CODE);
        }

        Err(CameraError::UnsupportedExposureDuration(duration))
    }
}
