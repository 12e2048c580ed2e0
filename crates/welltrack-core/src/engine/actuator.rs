use super::error::ActuationError;
use crate::core::models::ids::{PipetteId, WellId};
use nalgebra::Point3;

/// A position relative to a well: `depth` millimetres below the centre of its rim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WellLocation {
    pub well: WellId,
    pub depth: f64,
}

impl WellLocation {
    pub fn below_top(well: WellId, depth: f64) -> Self {
        Self { well, depth }
    }
}

/// The seam to the liquid handler. Implementations drive hardware or a simulator; planning
/// code only ever hands them numbers.
pub trait Actuator {
    fn aspirate(
        &mut self,
        pipette: PipetteId,
        volume: f64,
        location: WellLocation,
        relative_rate: f64,
    ) -> Result<(), ActuationError>;

    fn dispense(
        &mut self,
        pipette: PipetteId,
        volume: f64,
        location: WellLocation,
        relative_rate: f64,
    ) -> Result<(), ActuationError>;

    fn blow_out(&mut self, pipette: PipetteId, location: WellLocation)
    -> Result<(), ActuationError>;

    /// Straight-line move to an absolute deck position, optionally at a given speed.
    fn move_to(
        &mut self,
        pipette: PipetteId,
        point: Point3<f64>,
        speed: Option<f64>,
    ) -> Result<(), ActuationError>;

    /// The handler's built-in touch-tip at `depth` below the rim.
    fn touch_tip(
        &mut self,
        pipette: PipetteId,
        well: WellId,
        depth: f64,
    ) -> Result<(), ActuationError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCommand {
    Aspirate {
        pipette: PipetteId,
        volume: f64,
        location: WellLocation,
        relative_rate: f64,
    },
    Dispense {
        pipette: PipetteId,
        volume: f64,
        location: WellLocation,
        relative_rate: f64,
    },
    BlowOut {
        pipette: PipetteId,
        location: WellLocation,
    },
    MoveTo {
        pipette: PipetteId,
        point: Point3<f64>,
        speed: Option<f64>,
    },
    TouchTip {
        pipette: PipetteId,
        well: WellId,
        depth: f64,
    },
}

impl ActuatorCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aspirate { .. } => "aspirate",
            Self::Dispense { .. } => "dispense",
            Self::BlowOut { .. } => "blow_out",
            Self::MoveTo { .. } => "move_to",
            Self::TouchTip { .. } => "touch_tip",
        }
    }
}

/// Actuator that records every command instead of moving anything.
#[derive(Debug, Default)]
pub struct RecordingActuator {
    commands: Vec<ActuatorCommand>,
    fail_at: Option<usize>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the command with the given zero-based index.
    pub fn failing_at(index: usize) -> Self {
        Self {
            commands: Vec::new(),
            fail_at: Some(index),
        }
    }

    pub fn commands(&self) -> &[ActuatorCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<ActuatorCommand> {
        self.commands
    }

    fn record(&mut self, command: ActuatorCommand) -> Result<(), ActuationError> {
        if self.fail_at == Some(self.commands.len()) {
            return Err(ActuationError::Rejected {
                command: command.name(),
                reason: "simulated failure".to_string(),
            });
        }
        self.commands.push(command);
        Ok(())
    }
}

impl Actuator for RecordingActuator {
    fn aspirate(
        &mut self,
        pipette: PipetteId,
        volume: f64,
        location: WellLocation,
        relative_rate: f64,
    ) -> Result<(), ActuationError> {
        self.record(ActuatorCommand::Aspirate {
            pipette,
            volume,
            location,
            relative_rate,
        })
    }

    fn dispense(
        &mut self,
        pipette: PipetteId,
        volume: f64,
        location: WellLocation,
        relative_rate: f64,
    ) -> Result<(), ActuationError> {
        self.record(ActuatorCommand::Dispense {
            pipette,
            volume,
            location,
            relative_rate,
        })
    }

    fn blow_out(
        &mut self,
        pipette: PipetteId,
        location: WellLocation,
    ) -> Result<(), ActuationError> {
        self.record(ActuatorCommand::BlowOut { pipette, location })
    }

    fn move_to(
        &mut self,
        pipette: PipetteId,
        point: Point3<f64>,
        speed: Option<f64>,
    ) -> Result<(), ActuationError> {
        self.record(ActuatorCommand::MoveTo {
            pipette,
            point,
            speed,
        })
    }

    fn touch_tip(
        &mut self,
        pipette: PipetteId,
        well: WellId,
        depth: f64,
    ) -> Result<(), ActuationError> {
        self.record(ActuatorCommand::TouchTip {
            pipette,
            well,
            depth,
        })
    }
}
