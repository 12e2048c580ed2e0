use super::interp::ClampedLinear;
use super::{CalibrationError, check_rows};

/// Bidirectional headroom/volume mapping for one container type.
///
/// Built from measured `(headroom_mm, volume_uL)` gradations. Headroom is the distance from the
/// rim down to the meniscus, so volume decreases as headroom grows.
///
/// The two directions are independent linear interpolants over the same samples: they agree at
/// every sample point but a round trip between samples is only approximately the identity.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    volume_given_headroom: ClampedLinear,
    headroom_given_volume: ClampedLinear,
    max_volume: f64,
    max_headroom: f64,
}

impl CalibrationTable {
    /// Builds the table from rows of exactly two values each.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidCalibrationShape`] for a row that is not a pair,
    /// [`CalibrationError::Empty`] for no rows and [`CalibrationError::NonFinite`] for NaN or
    /// infinite samples.
    pub fn build<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, CalibrationError> {
        check_rows(rows, 2, |row, found| {
            CalibrationError::InvalidCalibrationShape { row, found }
        })?;

        let samples: Vec<(f64, f64)> = rows
            .iter()
            .map(|r| {
                let r = r.as_ref();
                (r[0], r[1])
            })
            .collect();

        let max_headroom = samples.iter().map(|s| s.0).fold(f64::MIN, f64::max);
        let max_volume = samples.iter().map(|s| s.1).fold(f64::MIN, f64::max);

        // Past the deepest gradation the well reads as full; past the shallowest it reads as empty.
        let volume_given_headroom = ClampedLinear::new(samples.clone(), max_volume, 0.0)?;
        let headroom_given_volume = ClampedLinear::new(
            samples.into_iter().map(|(h, v)| (v, h)).collect(),
            max_headroom,
            0.0,
        )?;

        Ok(Self {
            volume_given_headroom,
            headroom_given_volume,
            max_volume,
            max_headroom,
        })
    }

    pub fn volume_given_headroom(&self, headroom: f64) -> f64 {
        self.volume_given_headroom.eval(headroom)
    }

    pub fn headroom_given_volume(&self, volume: f64) -> f64 {
        self.headroom_given_volume.eval(volume)
    }

    /// Largest volume recorded in the gradations.
    pub fn max_volume(&self) -> f64 {
        self.max_volume
    }

    /// Largest headroom recorded in the gradations.
    pub fn max_headroom(&self) -> f64 {
        self.max_headroom
    }

    /// Headroom of the empty container, i.e. the usable depth down to the bottom.
    pub fn full_depth_headroom(&self) -> f64 {
        self.headroom_given_volume(0.0)
    }

    pub fn sample_count(&self) -> usize {
        self.volume_given_headroom.len()
    }
}
