//! # Calibration Module
//!
//! Measurement-driven interpolants for the two non-linear relationships the tracker depends on:
//! liquid column height against volume for a container type, and transfer error against volume
//! for a pipette model.
//!
//! ## Key Components
//!
//! - [`interp`] - Clamped piecewise-linear interpolant shared by both tables
//! - [`table`] - Container gradations (headroom ↔ volume)
//! - [`profile`] - Pipette random/systematic error profiles
//! - [`library`] - Built-in measurement sets and the read-only [`library::CalibrationRegistry`]

use thiserror::Error;

pub mod interp;
pub mod library;
pub mod profile;
pub mod table;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Calibration row {row} has {found} values, expected (headroom, volume)")]
    InvalidCalibrationShape { row: usize, found: usize },

    #[error("Error profile row {row} has {found} values, expected (random, systematic, volume)")]
    InvalidProfileShape { row: usize, found: usize },

    #[error("Cannot build an interpolant from an empty sample set")]
    Empty,

    #[error("Sample row {row} contains a non-finite value")]
    NonFinite { row: usize },
}

fn check_rows<R: AsRef<[f64]>>(
    rows: &[R],
    width: usize,
    shape_error: fn(usize, usize) -> CalibrationError,
) -> Result<(), CalibrationError> {
    if rows.is_empty() {
        return Err(CalibrationError::Empty);
    }
    for (row, values) in rows.iter().enumerate() {
        let values = values.as_ref();
        if values.len() != width {
            return Err(shape_error(row, values.len()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CalibrationError::NonFinite { row });
        }
    }
    Ok(())
}
