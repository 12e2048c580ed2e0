use super::error::EngineError;
use crate::core::models::geometry::WellGeometry;
use crate::core::models::pipette::PipetteSpec;
use crate::core::models::well::WellState;
use nalgebra::{Point3, Vector3};
use std::f64::consts::TAU;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspirateParams {
    /// Depth below the post-aspiration meniscus, in mm.
    pub immersion_depth: f64,
    /// Minimum clearance above the bottom of the well, in mm.
    pub safety_height: f64,
    /// Absolute flow rate, in uL/s.
    pub rate: f64,
}

impl Default for AspirateParams {
    fn default() -> Self {
        Self {
            immersion_depth: 2.0,
            safety_height: 0.5,
            rate: 75.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispenseParams {
    /// Measure `immersion_depth` from the post-dispense meniscus instead of the rim.
    pub meniscus_relative: bool,
    /// Positive values are below the reference level, in mm.
    pub immersion_depth: f64,
    /// Minimum headroom left after dispensing; `0` disables the overflow check.
    pub safety_height: f64,
    pub rate: f64,
}

impl Default for DispenseParams {
    fn default() -> Self {
        Self {
            meniscus_relative: true,
            immersion_depth: 0.0,
            safety_height: 1.0,
            rate: 300.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchTipParams {
    /// Distance below the rim at which the wall is touched, in mm.
    pub depth: f64,
    /// How far inside the wall the touch circle runs, in mm.
    pub radius_offset: f64,
    pub speed: f64,
    /// Number of touch points around the circle.
    pub increments: usize,
}

impl Default for TouchTipParams {
    fn default() -> Self {
        Self {
            depth: 2.0,
            radius_offset: 1.0,
            speed: 200.0,
            increments: 3,
        }
    }
}

/// Safety condition met while planning a motion. The motion is adjusted, not refused, except
/// for [`MotionWarning::Overflow`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionWarning {
    /// Aspiration depth clipped to stay `safety_height` above the bottom.
    NearBottom { depth: f64 },
    /// Depth clipped so the tip shaft stays out of the liquid.
    TipSubmersion { depth: f64 },
    /// Dispense cancelled: the well would be filled past its safety height.
    Overflow { final_headroom: f64 },
    OverflowCheckDisabled,
    AlmostFull { final_headroom: f64 },
}

/// Aspiration numbers for the actuation collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct AspiratePlan {
    pub volume: f64,
    /// Depth below the rim, in mm.
    pub depth: f64,
    /// Fraction of the pipette's default aspiration rate.
    pub relative_rate: f64,
    pub warnings: Vec<MotionWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispensePlan {
    pub volume: f64,
    pub depth: f64,
    pub relative_rate: f64,
    pub warnings: Vec<MotionWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispenseDecision {
    Dispense(DispensePlan),
    Cancelled { warnings: Vec<MotionWarning> },
}

impl DispenseDecision {
    pub fn warnings(&self) -> &[MotionWarning] {
        match self {
            Self::Dispense(plan) => &plan.warnings,
            Self::Cancelled { warnings } => warnings,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TouchTipPlan {
    /// Move to `top`, visit each point at `speed`, then return to `top`.
    Circle {
        top: Point3<f64>,
        points: Vec<Point3<f64>>,
        speed: f64,
    },
    /// Non-circular well: use the collaborator's own touch-tip at `depth` below the rim.
    Standard { depth: f64 },
}

/// Plans an aspiration of `volume` from `well` and books the volume change on the well.
///
/// The tip goes `immersion_depth` below the meniscus the well will have after aspirating. The
/// depth is then clipped to stay `safety_height` above the bottom, clipped again so that at
/// most 80% of the tip is submerged below the current meniscus, and finally kept at or below
/// the rim.
pub fn plan_aspirate(
    well: &mut WellState,
    pipette: &PipetteSpec,
    volume: f64,
    params: &AspirateParams,
) -> Result<AspiratePlan, EngineError> {
    check_volume(volume)?;
    check_safety_height(params.safety_height)?;
    let relative_rate = pipette.relative_aspirate_rate(params.rate).ok_or(
        EngineError::InvalidParameter {
            name: "flow_rates.aspirate",
            value: pipette.flow_rates.aspirate,
            reason: "default flow rate must be positive",
        },
    )?;

    let initial_headroom = well.headroom();
    let final_volume = well.volume() - volume;
    let final_headroom = well.headroom_at(final_volume);
    let mut depth = final_headroom + params.immersion_depth;
    well.set_volume(final_volume);

    let mut warnings = Vec::new();
    let floor = well.depth() - params.safety_height;
    if depth > floor {
        depth = floor;
        warnings.push(MotionWarning::NearBottom { depth });
    }
    clip_submersion(&mut depth, pipette, initial_headroom, &mut warnings);
    if depth < 0.0 {
        depth = 0.0;
    }

    log_warnings(&warnings);
    Ok(AspiratePlan {
        volume,
        depth,
        relative_rate,
        warnings,
    })
}

/// Plans a dispense of `volume` into `well` and books the volume change on the well.
///
/// The volume is booked even when the dispense is cancelled for overflow; callers that need
/// the well untouched in that case snapshot it beforehand.
pub fn plan_dispense(
    well: &mut WellState,
    pipette: &PipetteSpec,
    volume: f64,
    params: &DispenseParams,
) -> Result<DispenseDecision, EngineError> {
    check_volume(volume)?;
    check_safety_height(params.safety_height)?;
    let relative_rate = pipette.relative_dispense_rate(params.rate).ok_or(
        EngineError::InvalidParameter {
            name: "flow_rates.dispense",
            value: pipette.flow_rates.dispense,
            reason: "default flow rate must be positive",
        },
    )?;

    let initial_headroom = well.headroom();
    let final_volume = well.volume() + volume;
    let final_headroom = well.headroom_at(final_volume);
    let mut depth = if params.meniscus_relative {
        final_headroom + params.immersion_depth
    } else {
        params.immersion_depth
    };
    well.set_volume(final_volume);

    let mut warnings = Vec::new();
    clip_submersion(&mut depth, pipette, initial_headroom, &mut warnings);

    if params.safety_height == 0.0 {
        warnings.push(MotionWarning::OverflowCheckDisabled);
    } else if final_headroom <= params.safety_height {
        warnings.push(MotionWarning::Overflow { final_headroom });
        log_warnings(&warnings);
        return Ok(DispenseDecision::Cancelled { warnings });
    } else if final_headroom < params.safety_height + 1.0 {
        warnings.push(MotionWarning::AlmostFull { final_headroom });
    }

    log_warnings(&warnings);
    Ok(DispenseDecision::Dispense(DispensePlan {
        volume,
        depth,
        relative_rate,
        warnings,
    }))
}

/// Touch points evenly spaced on a circle inside the rim of a circular well.
pub fn plan_touch_tip(
    geometry: Option<&WellGeometry>,
    params: &TouchTipParams,
) -> Result<TouchTipPlan, EngineError> {
    if params.increments == 0 {
        return Err(EngineError::InvalidParameter {
            name: "increments",
            value: 0.0,
            reason: "at least one touch point is required",
        });
    }
    // A negative depth is a sign slip, not a request to touch above the rim.
    let depth = params.depth.abs();

    let Some((geometry, diameter)) = geometry.and_then(|g| g.diameter.map(|d| (g, d))) else {
        warn!("Well is not circular; falling back to the standard touch tip.");
        return Ok(TouchTipPlan::Standard { depth });
    };

    let radius = diameter / 2.0 - params.radius_offset;
    let points = (0..params.increments)
        .map(|i| {
            let theta = TAU * i as f64 / params.increments as f64;
            geometry.top + Vector3::new(radius * theta.cos(), radius * theta.sin(), -depth)
        })
        .collect();

    Ok(TouchTipPlan::Circle {
        top: geometry.top,
        points,
        speed: params.speed,
    })
}

fn clip_submersion(
    depth: &mut f64,
    pipette: &PipetteSpec,
    initial_headroom: f64,
    warnings: &mut Vec<MotionWarning>,
) {
    let limit = pipette.max_submersion() + initial_headroom;
    if *depth > limit {
        *depth = limit;
        warnings.push(MotionWarning::TipSubmersion { depth: limit });
    }
}

fn check_volume(volume: f64) -> Result<(), EngineError> {
    if !volume.is_finite() || volume <= 0.0 {
        return Err(EngineError::InvalidVolume {
            volume,
            reason: "pipetted volume must be positive",
        });
    }
    Ok(())
}

fn check_safety_height(safety_height: f64) -> Result<(), EngineError> {
    if safety_height.is_nan() || safety_height < 0.0 {
        return Err(EngineError::InvalidParameter {
            name: "safety_height",
            value: safety_height,
            reason: "must not be negative",
        });
    }
    Ok(())
}

fn log_warnings(warnings: &[MotionWarning]) {
    for warning in warnings {
        match warning {
            MotionWarning::NearBottom { depth } => {
                warn!(depth, "Aspiration depth clipped near the bottom of the well.")
            }
            MotionWarning::TipSubmersion { depth } => {
                warn!(depth, "Depth clipped to avoid submerging the tip shaft.")
            }
            MotionWarning::Overflow { final_headroom } => {
                warn!(final_headroom, "Overflow risk, dispense cancelled.")
            }
            MotionWarning::OverflowCheckDisabled => {
                warn!("Overflow check disabled by a zero safety height.")
            }
            MotionWarning::AlmostFull { final_headroom } => {
                warn!(final_headroom, "Container is almost full.")
            }
        }
    }
}
