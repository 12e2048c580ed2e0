use super::mixing::{BLOW_OUT_DEPTH, pipette_spec, touch_tip, wet_tip};
use crate::core::models::deck::Deck;
use crate::core::models::ids::{PipetteId, WellId};
use crate::core::models::pipette::PipetteSpec;
use crate::core::models::well::WellState;
use crate::engine::actuator::{Actuator, WellLocation};
use crate::engine::config::{ForwardOptions, ReverseOptions, TouchTipPosition};
use crate::engine::error::EngineError;
use crate::engine::motion::{
    AspirateParams, DispenseDecision, DispenseParams, MotionWarning, TouchTipParams,
    plan_aspirate, plan_dispense,
};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::propagation::propagate;
use crate::engine::transaction::WellTransaction;
use tracing::{info, instrument, warn};

/// One liquid movement between two wells, possibly split into several passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferRequest {
    pub pipette: PipetteId,
    pub volume: f64,
    pub source: WellId,
    pub destination: WellId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassRecord {
    /// Useful volume of the pass, excluding any disposal volume.
    pub volume: f64,
    /// The dispense would have overflowed the destination; nothing was moved or booked.
    pub cancelled: bool,
    pub warnings: Vec<MotionWarning>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferReport {
    pub passes: Vec<PassRecord>,
}

impl TransferReport {
    pub fn transferred_volume(&self) -> f64 {
        self.passes
            .iter()
            .filter(|p| !p.cancelled)
            .map(|p| p.volume)
            .sum()
    }

    pub fn cancelled_passes(&self) -> usize {
        self.passes.iter().filter(|p| p.cancelled).count()
    }
}

/// Splits `volume` into the fewest equal passes that each fit the pipette.
pub fn plan_forward_passes(volume: f64, max_volume: f64) -> Result<Vec<f64>, EngineError> {
    check_transfer_volume(volume)?;
    check_capacity(max_volume)?;
    if volume <= max_volume {
        return Ok(vec![volume]);
    }
    Ok(equal_passes(volume, max_volume))
}

/// Splits `volume` so that each pass plus `disposal` fits the pipette.
pub fn plan_reverse_passes(
    volume: f64,
    disposal: f64,
    max_volume: f64,
) -> Result<Vec<f64>, EngineError> {
    check_transfer_volume(volume)?;
    check_capacity(max_volume)?;
    if !disposal.is_finite() || disposal < 0.0 {
        return Err(EngineError::InvalidParameter {
            name: "disposal_volume",
            value: disposal,
            reason: "must be zero or positive",
        });
    }
    if volume + disposal <= max_volume {
        return Ok(vec![volume]);
    }
    let capacity = max_volume - disposal;
    if capacity <= 0.0 {
        return Err(EngineError::InvalidParameter {
            name: "disposal_volume",
            value: disposal,
            reason: "leaves no room for liquid in the tip",
        });
    }
    if volume <= max_volume {
        warn!(
            volume,
            disposal, "Transfer split into several passes to make room for the disposal volume."
        );
    }
    Ok(equal_passes(volume, capacity))
}

/// Moves `request.volume` from source to destination, aspirating exactly what is dispensed.
///
/// Every pass propagates uncertainty first, then plans the aspiration and dispense. A pass whose
/// dispense would overflow the destination is rolled back and skipped; the others are actuated:
/// aspirate, touch tip at the source, dispense, blow out above the destination and an optional
/// extra touch tip.
#[instrument(skip_all, name = "forward_transfer")]
pub fn transfer_forward(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    reporter: &ProgressReporter,
    request: &TransferRequest,
    options: &ForwardOptions,
) -> Result<TransferReport, EngineError> {
    let spec = pipette_spec(deck, request.pipette)?;
    let passes = plan_forward_passes(request.volume, spec.max_volume)?;
    check_request(deck, request, request.volume)?;

    let plan = PassPlan {
        spec: &spec,
        aspirate: options.aspirate_params(),
        dispense: options.dispense_params(),
        disposal: None,
        touch_tip: options.touch_tip,
    };
    run_passes(deck, actuator, reporter, request, &passes, options.pre_wet, &plan)
}

/// Moves `request.volume` from source to destination, over-aspirating by the disposal volume
/// on each pass and returning it to the source afterwards.
///
/// Only the useful pass volume is propagated; the disposal volume never changes composition.
#[instrument(skip_all, name = "reverse_transfer")]
pub fn transfer_reverse(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    reporter: &ProgressReporter,
    request: &TransferRequest,
    options: &ReverseOptions,
) -> Result<TransferReport, EngineError> {
    let spec = pipette_spec(deck, request.pipette)?;
    let passes = plan_reverse_passes(request.volume, options.disposal_volume, spec.max_volume)?;
    check_request(deck, request, request.volume + options.disposal_volume)?;

    let plan = PassPlan {
        spec: &spec,
        aspirate: options.aspirate_params(),
        dispense: options.dispense_params(),
        disposal: (options.disposal_volume > 0.0)
            .then(|| (options.disposal_volume, options.disposal_params())),
        touch_tip: options.touch_tip,
    };
    run_passes(deck, actuator, reporter, request, &passes, options.pre_wet, &plan)
}

struct PassPlan<'a> {
    spec: &'a PipetteSpec,
    aspirate: AspirateParams,
    dispense: DispenseParams,
    /// Volume returned to the source after each pass, with its dispense parameters.
    disposal: Option<(f64, DispenseParams)>,
    touch_tip: TouchTipPosition,
}

impl PassPlan<'_> {
    fn disposal_volume(&self) -> f64 {
        self.disposal.map_or(0.0, |(volume, _)| volume)
    }
}

fn run_passes(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    reporter: &ProgressReporter,
    request: &TransferRequest,
    passes: &[f64],
    pre_wet: u32,
    plan: &PassPlan,
) -> Result<TransferReport, EngineError> {
    reporter.report(Progress::PassesStart {
        total_passes: passes.len() as u64,
    });

    if pre_wet > 0 {
        let wetting_volume = passes[0] + plan.disposal_volume();
        wet_tip(
            deck,
            actuator,
            request.pipette,
            wetting_volume,
            request.source,
            pre_wet,
        )?;
    }

    let mut report = TransferReport::default();
    for &volume in passes {
        let record = run_pass(deck, actuator, request, volume, plan)?;
        if record.cancelled {
            warn!(volume, "Pass cancelled to prevent overflow.");
        }
        report.passes.push(record);
        reporter.report(Progress::PassFinish);
    }
    reporter.report(Progress::PassesFinish);

    info!(
        passes = report.passes.len(),
        cancelled = report.cancelled_passes(),
        transferred = report.transferred_volume(),
        "Transfer complete."
    );
    Ok(report)
}

/// Runs one pass atomically: on cancellation or error the pair of wells is restored.
fn run_pass(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    request: &TransferRequest,
    volume: f64,
    plan: &PassPlan,
) -> Result<PassRecord, EngineError> {
    let transaction = WellTransaction::begin(deck, &[request.source, request.destination])?;
    match book_and_actuate(deck, actuator, request, volume, plan) {
        Ok(record) if record.cancelled => {
            transaction.rollback(deck);
            Ok(record)
        }
        Ok(record) => {
            transaction.commit();
            Ok(record)
        }
        Err(e) => {
            transaction.rollback(deck);
            Err(e)
        }
    }
}

fn book_and_actuate(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    request: &TransferRequest,
    volume: f64,
    plan: &PassPlan,
) -> Result<PassRecord, EngineError> {
    let TransferRequest {
        pipette,
        source,
        destination,
        ..
    } = *request;

    propagate(deck, pipette, volume, source, destination)?;

    let aspirated = volume + plan.disposal_volume();
    let aspirate = plan_aspirate(well_mut(deck, source)?, plan.spec, aspirated, &plan.aspirate)?;
    let decision = plan_dispense(well_mut(deck, destination)?, plan.spec, volume, &plan.dispense)?;
    let disposal = match plan.disposal {
        Some((disposal, params)) => Some(plan_dispense(
            well_mut(deck, source)?,
            plan.spec,
            disposal,
            &params,
        )?),
        None => None,
    };

    let mut warnings = aspirate.warnings.clone();
    warnings.extend_from_slice(decision.warnings());
    if let Some(d) = &disposal {
        warnings.extend_from_slice(d.warnings());
    }

    let DispenseDecision::Dispense(dispense) = decision else {
        return Ok(PassRecord {
            volume,
            cancelled: true,
            warnings,
        });
    };
    let disposal = match disposal {
        Some(DispenseDecision::Dispense(d)) => Some(d),
        Some(DispenseDecision::Cancelled { .. }) => {
            return Ok(PassRecord {
                volume,
                cancelled: true,
                warnings,
            });
        }
        None => None,
    };

    let touch = TouchTipParams::default();
    actuator.aspirate(
        pipette,
        aspirated,
        WellLocation::below_top(source, aspirate.depth),
        aspirate.relative_rate,
    )?;
    touch_tip(deck, actuator, pipette, source, &touch)?;
    actuator.dispense(
        pipette,
        volume,
        WellLocation::below_top(destination, dispense.depth),
        dispense.relative_rate,
    )?;

    match disposal {
        None => {
            actuator.blow_out(pipette, WellLocation::below_top(destination, BLOW_OUT_DEPTH))?;
            extra_touch_tip(deck, actuator, request, plan.touch_tip, &touch)?;
        }
        Some(disposal) => {
            extra_touch_tip(deck, actuator, request, plan.touch_tip, &touch)?;
            actuator.dispense(
                pipette,
                disposal.volume,
                WellLocation::below_top(source, disposal.depth),
                disposal.relative_rate,
            )?;
            actuator.blow_out(pipette, WellLocation::below_top(source, BLOW_OUT_DEPTH))?;
            touch_tip(deck, actuator, pipette, source, &touch)?;
        }
    }

    Ok(PassRecord {
        volume,
        cancelled: false,
        warnings,
    })
}

fn extra_touch_tip(
    deck: &Deck,
    actuator: &mut dyn Actuator,
    request: &TransferRequest,
    position: TouchTipPosition,
    params: &TouchTipParams,
) -> Result<(), EngineError> {
    match position {
        TouchTipPosition::None => Ok(()),
        TouchTipPosition::Source => {
            touch_tip(deck, actuator, request.pipette, request.source, params)
        }
        TouchTipPosition::Destination => {
            touch_tip(deck, actuator, request.pipette, request.destination, params)
        }
    }
}

fn well_mut(deck: &mut Deck, id: WellId) -> Result<&mut WellState, EngineError> {
    deck.well_mut(id).ok_or(EngineError::WellNotFound(id))
}

/// Checks everything that would otherwise fail part-way through the passes.
fn check_request(deck: &Deck, request: &TransferRequest, required: f64) -> Result<(), EngineError> {
    if request.source == request.destination {
        return Err(EngineError::InvalidTransfer(
            "source and destination are the same well".to_string(),
        ));
    }
    let source = deck
        .well(request.source)
        .ok_or(EngineError::WellNotFound(request.source))?;
    deck.well(request.destination)
        .ok_or(EngineError::WellNotFound(request.destination))?;
    if deck.profile(request.pipette).is_none() {
        let name = deck
            .pipette(request.pipette)
            .map_or("<unknown>", |p| p.name.as_str());
        return Err(EngineError::MissingCalibration {
            subject: format!("pipette '{name}'"),
        });
    }
    if source.volume() < required {
        return Err(EngineError::InsufficientVolume {
            requested: required,
            available: source.volume(),
        });
    }
    Ok(())
}

fn check_transfer_volume(volume: f64) -> Result<(), EngineError> {
    if !volume.is_finite() || volume <= 0.0 {
        return Err(EngineError::InvalidVolume {
            volume,
            reason: "transfer volume must be positive",
        });
    }
    Ok(())
}

fn check_capacity(max_volume: f64) -> Result<(), EngineError> {
    if !max_volume.is_finite() || max_volume <= 0.0 {
        return Err(EngineError::InvalidParameter {
            name: "max_volume",
            value: max_volume,
            reason: "pipette capacity must be positive",
        });
    }
    Ok(())
}

/// Relative slack so that float noise in `volume / capacity` never adds a pass.
const PASS_COUNT_TOLERANCE: f64 = 1e-9;

fn equal_passes(volume: f64, capacity: f64) -> Vec<f64> {
    let ratio = volume / capacity;
    let count = (ratio * (1.0 - PASS_COUNT_TOLERANCE)).ceil().max(1.0) as usize;
    vec![volume / count as f64; count]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calibration::profile::PipetteErrorProfile;
    use crate::core::calibration::table::CalibrationTable;
    use crate::core::models::geometry::WellGeometry;
    use crate::core::models::pipette::FlowRates;
    use crate::engine::actuator::{ActuatorCommand, RecordingActuator};
    use crate::engine::config::{ForwardOptionsBuilder, ReverseOptionsBuilder};
    use nalgebra::Point3;
    use std::sync::Arc;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    struct Bench {
        deck: Deck,
        request: TransferRequest,
    }

    /// Two 1 mL tubes, 1 uL per 0.1 mm, and a 300 uL pipette with an exact profile.
    fn bench(source_volume: f64, volume: f64) -> Bench {
        let table = Arc::new(CalibrationTable::build(&[[0.0, 1000.0], [100.0, 0.0]]).unwrap());
        let mut deck = Deck::new();
        let pipette = deck.add_pipette(PipetteSpec {
            name: "p300".to_string(),
            max_volume: 300.0,
            flow_rates: FlowRates {
                aspirate: 75.0,
                dispense: 300.0,
                blow_out: 300.0,
            },
            tip_length: 60.0,
        });
        deck.attach_profile(pipette, Arc::new(PipetteErrorProfile::exact()));
        let geometry = WellGeometry::circular(10.0, Point3::new(0.0, 0.0, 100.0), 100.0);
        let source = deck.initiate_well("source", table.clone(), Some(geometry));
        let destination = deck.initiate_well("destination", table, None);
        let state = deck.well_mut(source).unwrap();
        state.set_volume(source_volume);
        state.set_constituent("dox", 100.0, 1.0, 0.0);

        Bench {
            deck,
            request: TransferRequest {
                pipette,
                volume,
                source,
                destination,
            },
        }
    }

    fn names(actuator: &RecordingActuator) -> Vec<&'static str> {
        actuator.commands().iter().map(|c| c.name()).collect()
    }

    #[test]
    fn forward_passes_fit_the_pipette() {
        assert_eq!(plan_forward_passes(200.0, 300.0).unwrap(), vec![200.0]);
        assert_eq!(plan_forward_passes(300.0, 300.0).unwrap(), vec![300.0]);
        assert_eq!(plan_forward_passes(900.0, 300.0).unwrap(), vec![300.0; 3]);
        assert_eq!(plan_forward_passes(700.0, 300.0).unwrap().len(), 3);
        assert!(matches!(
            plan_forward_passes(0.0, 300.0),
            Err(EngineError::InvalidVolume { .. })
        ));
    }

    #[test]
    fn pass_count_ignores_float_noise_in_the_ratio() {
        // 2.1 / 0.7 evaluates to 3.0000000000000004.
        let passes = plan_forward_passes(2.1, 0.7).unwrap();
        assert_eq!(passes.len(), 3);
        assert!(passes.iter().all(|&v| f64_approx_equal(v, 0.7)));

        assert_eq!(plan_forward_passes(5.4, 0.3).unwrap().len(), 18);
        assert_eq!(plan_forward_passes(0.3, 0.1).unwrap().len(), 3);
        assert_eq!(plan_forward_passes(300.001, 300.0).unwrap().len(), 2);
        assert_eq!(plan_reverse_passes(4.2, 0.1, 0.8).unwrap().len(), 6);
    }

    #[test]
    fn reverse_passes_make_room_for_the_disposal() {
        assert_eq!(plan_reverse_passes(200.0, 5.0, 300.0).unwrap(), vec![200.0]);
        let passes = plan_reverse_passes(298.0, 5.0, 300.0).unwrap();
        assert_eq!(passes, vec![149.0, 149.0]);
        assert!(plan_reverse_passes(100.0, -1.0, 300.0).is_err());
        assert!(plan_reverse_passes(400.0, 300.0, 300.0).is_err());
    }

    #[test]
    fn forward_transfer_books_and_actuates_one_pass() {
        let mut b = bench(500.0, 100.0);
        let mut actuator = RecordingActuator::new();
        let report = transfer_forward(
            &mut b.deck,
            &mut actuator,
            &ProgressReporter::new(),
            &b.request,
            &ForwardOptions::default(),
        )
        .unwrap();

        assert_eq!(report.passes.len(), 1);
        assert!(f64_approx_equal(report.transferred_volume(), 100.0));
        assert!(f64_approx_equal(b.deck.well(b.request.source).unwrap().volume(), 400.0));
        let destination = b.deck.well(b.request.destination).unwrap();
        assert!(f64_approx_equal(destination.volume(), 100.0));
        assert!(f64_approx_equal(destination.stock("dox").unwrap().volume, 100.0));

        // Source touch tip runs on the circular well; the destination has no touch tip.
        assert_eq!(
            names(&actuator),
            vec![
                "aspirate", "move_to", "move_to", "move_to", "move_to", "move_to", "dispense",
                "blow_out"
            ]
        );
    }

    #[test]
    fn forward_transfer_splits_large_volumes() {
        let mut b = bench(1000.0, 900.0);
        let mut actuator = RecordingActuator::new();
        let report = transfer_forward(
            &mut b.deck,
            &mut actuator,
            &ProgressReporter::new(),
            &b.request,
            &ForwardOptions::default(),
        )
        .unwrap();

        assert_eq!(report.passes.len(), 3);
        assert!(report.passes.iter().all(|p| p.volume == 300.0));
        let dispensed: f64 = actuator
            .commands()
            .iter()
            .filter_map(|c| match c {
                ActuatorCommand::Dispense { volume, .. } => Some(*volume),
                _ => None,
            })
            .sum();
        assert!(f64_approx_equal(dispensed, 900.0));
        assert!(f64_approx_equal(b.deck.well(b.request.source).unwrap().volume(), 100.0));
    }

    #[test]
    fn overflowing_pass_is_rolled_back_and_not_actuated() {
        let mut b = bench(1000.0, 300.0);
        b.deck
            .well_mut(b.request.destination)
            .unwrap()
            .set_volume(800.0);
        let before_source = b.deck.well(b.request.source).unwrap().clone();
        let before_destination = b.deck.well(b.request.destination).unwrap().clone();
        let mut actuator = RecordingActuator::new();

        let report = transfer_forward(
            &mut b.deck,
            &mut actuator,
            &ProgressReporter::new(),
            &b.request,
            &ForwardOptions::default(),
        )
        .unwrap();

        assert_eq!(report.cancelled_passes(), 1);
        assert_eq!(report.transferred_volume(), 0.0);
        assert!(matches!(
            report.passes[0].warnings.as_slice(),
            [MotionWarning::Overflow { .. }]
        ));
        assert!(actuator.commands().is_empty());
        assert_eq!(b.deck.well(b.request.source).unwrap(), &before_source);
        assert_eq!(b.deck.well(b.request.destination).unwrap(), &before_destination);
    }

    #[test]
    fn reverse_transfer_returns_the_disposal_volume() {
        let mut b = bench(500.0, 100.0);
        let mut actuator = RecordingActuator::new();
        let options = ReverseOptionsBuilder::new()
            .disposal_volume(10.0)
            .build()
            .unwrap();
        transfer_reverse(
            &mut b.deck,
            &mut actuator,
            &ProgressReporter::new(),
            &b.request,
            &options,
        )
        .unwrap();

        assert!(f64_approx_equal(b.deck.well(b.request.source).unwrap().volume(), 400.0));
        assert!(f64_approx_equal(
            b.deck.well(b.request.destination).unwrap().volume(),
            100.0
        ));
        let commands = actuator.commands();
        assert!(matches!(commands[0], ActuatorCommand::Aspirate { volume, .. } if volume == 110.0));
        let returned = commands.iter().find_map(|c| match c {
            ActuatorCommand::Dispense {
                volume, location, ..
            } if location.well == b.request.source => Some((*volume, location.depth)),
            _ => None,
        });
        assert_eq!(returned, Some((10.0, 0.0)));
    }

    #[test]
    fn insufficient_source_volume_fails_before_anything_moves() {
        let mut b = bench(50.0, 100.0);
        let before = b.deck.well(b.request.source).unwrap().clone();
        let mut actuator = RecordingActuator::new();
        let options = ForwardOptionsBuilder::new().pre_wet(2).build().unwrap();

        let result = transfer_forward(
            &mut b.deck,
            &mut actuator,
            &ProgressReporter::new(),
            &b.request,
            &options,
        );
        assert_eq!(
            result,
            Err(EngineError::InsufficientVolume {
                requested: 100.0,
                available: 50.0
            })
        );
        assert!(actuator.commands().is_empty());
        assert_eq!(b.deck.well(b.request.source).unwrap(), &before);
    }

    #[test]
    fn actuation_failure_rolls_the_pass_back() {
        let mut b = bench(500.0, 100.0);
        let before = b.deck.well(b.request.destination).unwrap().clone();
        let mut actuator = RecordingActuator::failing_at(0);

        let result = transfer_forward(
            &mut b.deck,
            &mut actuator,
            &ProgressReporter::new(),
            &b.request,
            &ForwardOptions::default(),
        );
        assert!(matches!(result, Err(EngineError::Actuation { .. })));
        assert_eq!(b.deck.well(b.request.destination).unwrap(), &before);
    }

    #[test]
    fn touch_tip_position_adds_a_touch_at_the_destination() {
        let mut b = bench(500.0, 100.0);
        let mut actuator = RecordingActuator::new();
        let options = ForwardOptionsBuilder::new()
            .touch_tip(TouchTipPosition::Destination)
            .build()
            .unwrap();
        transfer_forward(
            &mut b.deck,
            &mut actuator,
            &ProgressReporter::new(),
            &b.request,
            &options,
        )
        .unwrap();

        assert!(matches!(
            actuator.commands().last(),
            Some(ActuatorCommand::TouchTip { well, .. }) if *well == b.request.destination
        ));
    }
}
