use crate::core::models::deck::Deck;
use crate::core::models::ids::{PipetteId, WellId};
use crate::core::models::pipette::PipetteSpec;
use crate::engine::actuator::{Actuator, WellLocation};
use crate::engine::error::EngineError;
use crate::engine::motion::{
    AspirateParams, DispenseDecision, DispenseParams, MotionWarning, TouchTipParams, TouchTipPlan,
    plan_aspirate, plan_dispense, plan_touch_tip,
};
use crate::engine::transaction::WellTransaction;
use tracing::{info, instrument, warn};

/// Blow-out position below the rim, in mm.
pub const BLOW_OUT_DEPTH: f64 = 2.0;

const LOW_MIXING_FRACTION: f64 = 0.2;
const HIGH_MIXING_FRACTION: f64 = 0.8;

/// How the mixing volume compares to the liquid held by the well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FractionCheck {
    TooLow,
    Acceptable,
    TooHigh,
}

impl FractionCheck {
    pub fn of(fraction: f64) -> Self {
        if fraction < LOW_MIXING_FRACTION {
            Self::TooLow
        } else if fraction > HIGH_MIXING_FRACTION {
            Self::TooHigh
        } else {
            Self::Acceptable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixParams {
    pub volume: f64,
    pub cycles: u32,
    /// Aspiration depth below the post-aspiration meniscus, in mm.
    pub aspiration_depth: f64,
    /// Dispense depth below the post-dispense meniscus, in mm.
    pub dispense_immersion_depth: f64,
    pub aspirate_rate: f64,
    pub dispense_rate: f64,
}

impl MixParams {
    pub fn new(
        volume: f64,
        cycles: u32,
        aspiration_depth: f64,
        dispense_immersion_depth: f64,
    ) -> Self {
        Self {
            volume,
            cycles,
            aspiration_depth,
            dispense_immersion_depth,
            aspirate_rate: 75.0,
            dispense_rate: 600.0,
        }
    }
}

/// Where the tip aspirates and dispenses while mixing. Depths are derived from the well's
/// calibration table at the time of the call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MixPattern {
    /// Aspirate under the meniscus, dispense `dispense_height` above the bottom.
    TopToBottom {
        aspiration_immersion_depth: f64,
        dispense_height: f64,
    },
    /// Aspirate `aspirate_height` above the bottom, dispense under the meniscus.
    BottomToTop {
        aspirate_height: f64,
        dispense_immersion_depth: f64,
    },
    /// Aspirate and dispense at the same fraction of the liquid column.
    Static { relative_depth: f64 },
}

impl MixPattern {
    pub fn top_to_bottom() -> Self {
        Self::TopToBottom {
            aspiration_immersion_depth: 2.0,
            dispense_height: 1.0,
        }
    }

    pub fn bottom_to_top() -> Self {
        Self::BottomToTop {
            aspirate_height: 1.0,
            dispense_immersion_depth: 1.0,
        }
    }

    pub fn static_at_middle() -> Self {
        Self::Static {
            relative_depth: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixReport {
    pub mixing_fraction: f64,
    pub fraction_check: FractionCheck,
    pub completed_cycles: u32,
    pub warnings: Vec<MotionWarning>,
}

/// Moves the tip around the inside of the rim of `well`, or falls back to the handler's own
/// touch-tip for wells without a diameter.
pub fn touch_tip(
    deck: &Deck,
    actuator: &mut dyn Actuator,
    pipette: PipetteId,
    well: WellId,
    params: &TouchTipParams,
) -> Result<(), EngineError> {
    if deck.well(well).is_none() {
        return Err(EngineError::WellNotFound(well));
    }
    match plan_touch_tip(deck.geometry(well), params)? {
        TouchTipPlan::Circle { top, points, speed } => {
            actuator.move_to(pipette, top, None)?;
            for point in points {
                actuator.move_to(pipette, point, Some(speed))?;
            }
            actuator.move_to(pipette, top, None)?;
        }
        TouchTipPlan::Standard { depth } => actuator.touch_tip(pipette, well, depth)?,
    }
    Ok(())
}

/// Pre-wets the tip with `cycles` aspirate/dispense cycles of `volume` in `well`.
#[instrument(skip_all, name = "wet_tip")]
pub fn wet_tip(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    pipette: PipetteId,
    volume: f64,
    well: WellId,
    cycles: u32,
) -> Result<Vec<MotionWarning>, EngineError> {
    let spec = pipette_spec(deck, pipette)?;
    let (completed, warnings) = cycle_in_place(
        deck,
        actuator,
        &spec,
        pipette,
        well,
        volume,
        cycles,
        &AspirateParams::default(),
        &DispenseParams::default(),
    )?;
    finish_in_well(deck, actuator, pipette, well)?;
    info!(cycles = completed, volume, "Tip wetted.");
    Ok(warnings)
}

/// Mixes the content of `well` in place. Composition and net volume are unchanged.
#[instrument(skip_all, name = "mix")]
pub fn mix(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    pipette: PipetteId,
    well: WellId,
    params: &MixParams,
) -> Result<MixReport, EngineError> {
    if params.cycles == 0 {
        return Err(EngineError::InvalidParameter {
            name: "cycles",
            value: 0.0,
            reason: "at least one mixing cycle is required",
        });
    }
    let spec = pipette_spec(deck, pipette)?;
    let available = deck.well(well).ok_or(EngineError::WellNotFound(well))?.volume();
    if available <= 0.0 {
        return Err(EngineError::DivideByZero {
            context: "mixing an empty well",
        });
    }
    if params.volume > available {
        return Err(EngineError::InsufficientVolume {
            requested: params.volume,
            available,
        });
    }

    let mixing_fraction = params.volume / available;
    let fraction_check = FractionCheck::of(mixing_fraction);
    match fraction_check {
        FractionCheck::TooLow => {
            warn!(fraction = mixing_fraction, "Mixing fraction may be too low.")
        }
        FractionCheck::TooHigh => {
            warn!(fraction = mixing_fraction, "Mixing fraction may be too high.")
        }
        FractionCheck::Acceptable => info!(fraction = mixing_fraction, "Mixing fraction."),
    }

    let aspirate = AspirateParams {
        immersion_depth: params.aspiration_depth,
        rate: params.aspirate_rate,
        ..AspirateParams::default()
    };
    let dispense = DispenseParams {
        immersion_depth: params.dispense_immersion_depth,
        rate: params.dispense_rate,
        ..DispenseParams::default()
    };
    let (completed_cycles, warnings) = cycle_in_place(
        deck,
        actuator,
        &spec,
        pipette,
        well,
        params.volume,
        params.cycles,
        &aspirate,
        &dispense,
    )?;
    finish_in_well(deck, actuator, pipette, well)?;

    Ok(MixReport {
        mixing_fraction,
        fraction_check,
        completed_cycles,
        warnings,
    })
}

/// Mixes with depths derived from `pattern` and the well's current fill level.
pub fn mix_with_pattern(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    pipette: PipetteId,
    well: WellId,
    volume: f64,
    cycles: u32,
    pattern: MixPattern,
) -> Result<MixReport, EngineError> {
    let state = deck.well(well).ok_or(EngineError::WellNotFound(well))?;
    let well_depth = state.depth();
    // Headroom at the bottom of each mixing stroke.
    let lowest_meniscus = state.headroom_at(state.volume() - volume);

    let (aspiration_depth, dispense_immersion_depth) = match pattern {
        MixPattern::TopToBottom {
            aspiration_immersion_depth,
            dispense_height,
        } => (
            aspiration_immersion_depth,
            well_depth - dispense_height - lowest_meniscus,
        ),
        MixPattern::BottomToTop {
            aspirate_height,
            dispense_immersion_depth,
        } => (
            well_depth - aspirate_height - lowest_meniscus,
            dispense_immersion_depth,
        ),
        MixPattern::Static { relative_depth } => {
            let position = relative_depth * (well_depth - lowest_meniscus);
            (position, position)
        }
    };

    let params = MixParams::new(volume, cycles, aspiration_depth, dispense_immersion_depth);
    mix(deck, actuator, pipette, well, &params)
}

pub fn mix_top_to_bottom(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    pipette: PipetteId,
    well: WellId,
    volume: f64,
    cycles: u32,
) -> Result<MixReport, EngineError> {
    let pattern = MixPattern::top_to_bottom();
    mix_with_pattern(deck, actuator, pipette, well, volume, cycles, pattern)
}

pub fn mix_bottom_to_top(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    pipette: PipetteId,
    well: WellId,
    volume: f64,
    cycles: u32,
) -> Result<MixReport, EngineError> {
    let pattern = MixPattern::bottom_to_top();
    mix_with_pattern(deck, actuator, pipette, well, volume, cycles, pattern)
}

pub fn mix_static(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    pipette: PipetteId,
    well: WellId,
    volume: f64,
    cycles: u32,
) -> Result<MixReport, EngineError> {
    let pattern = MixPattern::static_at_middle();
    mix_with_pattern(deck, actuator, pipette, well, volume, cycles, pattern)
}

pub(crate) fn pipette_spec(deck: &Deck, pipette: PipetteId) -> Result<PipetteSpec, EngineError> {
    deck.pipette(pipette)
        .cloned()
        .ok_or(EngineError::PipetteNotFound(pipette))
}

/// Runs aspirate/dispense cycles of `volume` in one well. A cycle whose dispense would
/// overflow is rolled back and ends the loop.
#[allow(clippy::too_many_arguments)]
fn cycle_in_place(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    spec: &PipetteSpec,
    pipette: PipetteId,
    well: WellId,
    volume: f64,
    cycles: u32,
    aspirate: &AspirateParams,
    dispense: &DispenseParams,
) -> Result<(u32, Vec<MotionWarning>), EngineError> {
    let mut warnings = Vec::new();
    for cycle in 0..cycles {
        let transaction = WellTransaction::begin(deck, &[well])?;
        let planned = {
            let state = deck.well_mut(well).ok_or(EngineError::WellNotFound(well))?;
            plan_aspirate(state, spec, volume, aspirate).and_then(|a| {
                plan_dispense(state, spec, volume, dispense).map(|d| (a, d))
            })
        };
        let (aspirate_plan, decision) = match planned {
            Ok(plans) => plans,
            Err(e) => {
                transaction.rollback(deck);
                return Err(e);
            }
        };
        warnings.extend(aspirate_plan.warnings.iter().copied());
        warnings.extend(decision.warnings().iter().copied());

        let DispenseDecision::Dispense(dispense_plan) = decision else {
            transaction.rollback(deck);
            warn!(cycle, "Cycle cancelled; stopping.");
            return Ok((cycle, warnings));
        };

        let actuated = actuator
            .aspirate(
                pipette,
                volume,
                WellLocation::below_top(well, aspirate_plan.depth),
                aspirate_plan.relative_rate,
            )
            .and_then(|()| {
                actuator.dispense(
                    pipette,
                    volume,
                    WellLocation::below_top(well, dispense_plan.depth),
                    dispense_plan.relative_rate,
                )
            });
        if let Err(e) = actuated {
            transaction.rollback(deck);
            return Err(e.into());
        }
        transaction.commit();
    }
    Ok((cycles, warnings))
}

fn finish_in_well(
    deck: &Deck,
    actuator: &mut dyn Actuator,
    pipette: PipetteId,
    well: WellId,
) -> Result<(), EngineError> {
    actuator.blow_out(pipette, WellLocation::below_top(well, BLOW_OUT_DEPTH))?;
    touch_tip(deck, actuator, pipette, well, &TouchTipParams::default())
}
