use thiserror::Error;

use crate::core::models::ids::{PipetteId, WellId};

/// Failure reported by the actuation collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActuationError {
    #[error("Actuator rejected '{command}': {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },

    #[error("Actuator is not connected")]
    Disconnected,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("No calibration available for {subject}")]
    MissingCalibration { subject: String },

    #[error("Constituent '{constituent}' is not present in the well")]
    ConstituentNotPresent { constituent: String },

    #[error("Division by zero: {context}")]
    DivideByZero { context: &'static str },

    #[error("Invalid volume {volume} uL: {reason}")]
    InvalidVolume { volume: f64, reason: &'static str },

    #[error("Invalid parameter '{name}' = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("Source holds {available} uL but {requested} uL were requested")]
    InsufficientVolume { requested: f64, available: f64 },

    #[error("Well not found: {0:?}")]
    WellNotFound(WellId),

    #[error("Pipette not found: {0:?}")]
    PipetteNotFound(PipetteId),

    #[error("Actuation failed: {source}")]
    Actuation {
        #[from]
        source: ActuationError,
    },
}
