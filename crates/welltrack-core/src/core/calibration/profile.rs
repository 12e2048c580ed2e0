use super::interp::ClampedLinear;
use super::{CalibrationError, check_rows};
use crate::core::models::well::VolumeUncertainty;

/// Volume-dependent transfer error for one pipette model.
///
/// Built from measured `(random_error, systematic_error, volume)` triples. Systematic errors are
/// signed (a pipette may consistently under- or over-deliver). Below the smallest calibrated
/// volume each error saturates at its largest measured value; above the nominal capacity it
/// reads as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct PipetteErrorProfile {
    random_given_volume: ClampedLinear,
    systematic_given_volume: ClampedLinear,
}

impl PipetteErrorProfile {
    /// Builds the profile from rows of exactly three values each.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidProfileShape`] for a row that is not a triple,
    /// [`CalibrationError::Empty`] for no rows and [`CalibrationError::NonFinite`] for NaN or
    /// infinite samples.
    pub fn build<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, CalibrationError> {
        check_rows(rows, 3, |row, found| CalibrationError::InvalidProfileShape {
            row,
            found,
        })?;

        let rows: Vec<[f64; 3]> = rows
            .iter()
            .map(|r| {
                let r = r.as_ref();
                [r[0], r[1], r[2]]
            })
            .collect();
        let max_random = rows.iter().map(|r| r[0]).fold(f64::MIN, f64::max);
        let max_systematic = rows.iter().map(|r| r[1]).fold(f64::MIN, f64::max);

        let random_given_volume =
            ClampedLinear::new(rows.iter().map(|r| (r[2], r[0])).collect(), max_random, 0.0)?;
        let systematic_given_volume = ClampedLinear::new(
            rows.iter().map(|r| (r[2], r[1])).collect(),
            max_systematic,
            0.0,
        )?;

        Ok(Self {
            random_given_volume,
            systematic_given_volume,
        })
    }

    /// A profile that reports no error at any volume.
    pub fn exact() -> Self {
        Self {
            random_given_volume: ClampedLinear::constant(0.0),
            systematic_given_volume: ClampedLinear::constant(0.0),
        }
    }

    pub fn random_given_volume(&self, volume: f64) -> f64 {
        self.random_given_volume.eval(volume)
    }

    pub fn systematic_given_volume(&self, volume: f64) -> f64 {
        self.systematic_given_volume.eval(volume)
    }

    pub fn uncertainty_for(&self, volume: f64) -> VolumeUncertainty {
        VolumeUncertainty {
            random: self.random_given_volume(volume),
            systematic: self.systematic_given_volume(volume),
        }
    }

    /// Calibrated volume range `(min, max)`.
    pub fn calibrated_range(&self) -> (f64, f64) {
        self.random_given_volume.domain()
    }
}
