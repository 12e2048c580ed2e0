use super::concentration::relative;
use super::error::EngineError;
use crate::core::models::deck::Deck;
use crate::core::models::ids::{PipetteId, WellId};
use crate::core::models::well::{StockRecord, VolumeUncertainty, WellState};
use tracing::debug;

/// Slack allowed when a pass volume is compared with what the source holds.
const VOLUME_TOLERANCE: f64 = 1e-9;

/// Numbers used by one propagation step, kept for logging and reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropagationSummary {
    /// Pipette uncertainty on the transferred volume.
    pub pipette_uncertainty: VolumeUncertainty,
    /// Fraction of the source volume withdrawn by this pass.
    pub withdrawn_fraction: f64,
    /// Number of constituents in the destination afterwards.
    pub destination_constituents: usize,
}

/// Updates source and destination uncertainty and stock bookkeeping for one pipetting pass.
///
/// Must run once per pass, before the source volume is changed by the aspiration. Volumes
/// themselves are not touched. Both wells are computed on copies and written back together, so
/// a failure leaves the deck unchanged.
///
/// # Errors
///
/// Fails with [`EngineError::InvalidVolume`] for a non-positive `volume`,
/// [`EngineError::InvalidTransfer`] when source and destination are the same well,
/// [`EngineError::MissingCalibration`] when the pipette has no error profile,
/// [`EngineError::DivideByZero`] when the source is empty and
/// [`EngineError::InsufficientVolume`] when the source holds less than `volume`.
pub fn propagate(
    deck: &mut Deck,
    pipette: PipetteId,
    volume: f64,
    source: WellId,
    destination: WellId,
) -> Result<PropagationSummary, EngineError> {
    if !volume.is_finite() || volume <= 0.0 {
        return Err(EngineError::InvalidVolume {
            volume,
            reason: "transfer volume must be positive",
        });
    }
    if source == destination {
        return Err(EngineError::InvalidTransfer(
            "source and destination are the same well".to_string(),
        ));
    }

    let spec = deck
        .pipette(pipette)
        .ok_or(EngineError::PipetteNotFound(pipette))?;
    let pipette_uncertainty = deck.pipette_uncertainty(pipette, volume).ok_or_else(|| {
        EngineError::MissingCalibration {
            subject: format!("pipette '{}'", spec.name),
        }
    })?;

    let mut source_state = deck
        .well(source)
        .ok_or(EngineError::WellNotFound(source))?
        .clone();
    let mut destination_state = deck
        .well(destination)
        .ok_or(EngineError::WellNotFound(destination))?
        .clone();

    let source_volume = source_state.volume();
    if source_volume <= 0.0 {
        return Err(EngineError::DivideByZero {
            context: "transfer from an empty source well",
        });
    }
    if volume > source_volume + VOLUME_TOLERANCE {
        return Err(EngineError::InsufficientVolume {
            requested: volume,
            available: source_volume,
        });
    }

    let withdrawn_fraction = apply_transfer(
        &mut source_state,
        &mut destination_state,
        volume,
        pipette_uncertainty,
    );
    let summary = PropagationSummary {
        pipette_uncertainty,
        withdrawn_fraction,
        destination_constituents: destination_state.constituents_number(),
    };

    debug!(
        volume,
        random = pipette_uncertainty.random,
        systematic = pipette_uncertainty.systematic,
        fraction = withdrawn_fraction,
        constituents = summary.destination_constituents,
        "Propagated transfer uncertainty."
    );

    deck.replace_pair(source, source_state, destination, destination_state);
    Ok(summary)
}

fn apply_transfer(
    source: &mut WellState,
    destination: &mut WellState,
    volume: f64,
    pipette: VolumeUncertainty,
) -> f64 {
    destination.set_volume_uncertainty(destination.volume_uncertainty().combine(pipette));

    // A source without recorded error stays exact.
    let previous = source.volume_uncertainty();
    let source_uncertainty = VolumeUncertainty {
        random: if previous.random != 0.0 {
            previous.random.hypot(pipette.random)
        } else {
            previous.random
        },
        systematic: if previous.systematic != 0.0 {
            previous.systematic + pipette.systematic
        } else {
            previous.systematic
        },
    };
    source.set_volume_uncertainty(source_uncertainty);

    let source_volume = source.volume();
    let fraction = volume / source_volume;

    for name in source.constituents().to_vec() {
        let Some(record) = source.stock_mut(&name) else {
            continue;
        };
        let stock_volume = record.volume;
        let relative_error = (relative(pipette.random, volume).powi(2)
            + relative(source_uncertainty.random, source_volume).powi(2)
            + relative(record.volume_uncertainty, stock_volume).powi(2))
        .sqrt();

        let transferred = fraction * stock_volume;
        let transferred_uncertainty = relative_error * transferred;
        record.volume = stock_volume * (1.0 - fraction);
        record.volume_uncertainty = relative_error * (1.0 - fraction) * stock_volume;
        let (concentration, concentration_uncertainty) =
            (record.concentration, record.concentration_uncertainty);

        match destination.stock_mut(&name) {
            Some(existing) => {
                existing.volume += transferred;
                existing.volume_uncertainty =
                    existing.volume_uncertainty.hypot(transferred_uncertainty);
            }
            None => destination.register_constituent(
                &name,
                StockRecord {
                    concentration,
                    concentration_uncertainty,
                    volume: transferred,
                    volume_uncertainty: transferred_uncertainty,
                },
            ),
        }
    }

    fraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calibration::profile::PipetteErrorProfile;
    use crate::core::calibration::table::CalibrationTable;
    use crate::core::models::pipette::{FlowRates, PipetteSpec};
    use std::sync::Arc;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn table() -> Arc<CalibrationTable> {
        Arc::new(CalibrationTable::build(&[[0.0, 50000.0], [100.0, 0.0]]).unwrap())
    }

    fn spec() -> PipetteSpec {
        PipetteSpec {
            name: "p300".to_string(),
            max_volume: 300.0,
            flow_rates: FlowRates {
                aspirate: 92.86,
                dispense: 92.86,
                blow_out: 92.86,
            },
            tip_length: 51.0,
        }
    }

    struct Fixture {
        deck: Deck,
        pipette: PipetteId,
        source: WellId,
        destination: WellId,
    }

    fn fixture(profile: PipetteErrorProfile) -> Fixture {
        let mut deck = Deck::new();
        let pipette = deck.add_pipette(spec());
        deck.attach_profile(pipette, Arc::new(profile));
        let source = deck.initiate_well("source", table(), None);
        let destination = deck.initiate_well("destination", table(), None);
        let well = deck.well_mut(source).unwrap();
        well.set_volume(1000.0);
        well.set_constituent("dox", 500.0, 5.0, 0.0);
        Fixture {
            deck,
            pipette,
            source,
            destination,
        }
    }

    fn constant_profile(random: f64, systematic: f64) -> PipetteErrorProfile {
        PipetteErrorProfile::build(&[[random, systematic, 1000.0], [random, systematic, 1.0]])
            .unwrap()
    }

    #[test]
    fn exact_pipette_moves_stock_volume_without_error() {
        let mut f = fixture(PipetteErrorProfile::exact());
        let summary = propagate(&mut f.deck, f.pipette, 100.0, f.source, f.destination).unwrap();
        assert!(f64_approx_equal(summary.withdrawn_fraction, 0.1));

        let source = f.deck.well(f.source).unwrap();
        let destination = f.deck.well(f.destination).unwrap();
        assert!(f64_approx_equal(source.stock("dox").unwrap().volume, 900.0));
        let moved = destination.stock("dox").unwrap();
        assert!(f64_approx_equal(moved.volume, 100.0));
        assert_eq!(moved.volume_uncertainty, 0.0);
        assert_eq!(moved.concentration, 500.0);
        assert_eq!(moved.concentration_uncertainty, 5.0);
        assert_eq!(destination.constituents_number(), 1);
    }

    #[test]
    fn volumes_are_not_changed_by_propagation() {
        let mut f = fixture(PipetteErrorProfile::exact());
        propagate(&mut f.deck, f.pipette, 100.0, f.source, f.destination).unwrap();
        assert_eq!(f.deck.well(f.source).unwrap().volume(), 1000.0);
        assert_eq!(f.deck.well(f.destination).unwrap().volume(), 0.0);
    }

    #[test]
    fn exact_source_stays_exact_while_destination_accumulates() {
        let mut f = fixture(constant_profile(0.3, -1.0));
        propagate(&mut f.deck, f.pipette, 100.0, f.source, f.destination).unwrap();
        propagate(&mut f.deck, f.pipette, 100.0, f.source, f.destination).unwrap();

        let source = f.deck.well(f.source).unwrap();
        assert_eq!(source.volume_uncertainty(), VolumeUncertainty::default());

        let destination = f.deck.well(f.destination).unwrap().volume_uncertainty();
        assert!(f64_approx_equal(destination.random, (2.0 * 0.09_f64).sqrt()));
        assert!(f64_approx_equal(destination.systematic, -2.0));
    }

    #[test]
    fn source_with_prior_error_combines_with_the_pipette() {
        let mut f = fixture(constant_profile(0.4, -1.0));
        f.deck
            .well_mut(f.source)
            .unwrap()
            .set_volume_uncertainty(VolumeUncertainty::new(0.3, 0.0));
        propagate(&mut f.deck, f.pipette, 100.0, f.source, f.destination).unwrap();

        let source = f.deck.well(f.source).unwrap().volume_uncertainty();
        assert!(f64_approx_equal(source.random, 0.5));
        assert_eq!(source.systematic, 0.0);
    }

    #[test]
    fn stock_volume_uncertainty_uses_relative_errors_in_quadrature() {
        let mut f = fixture(constant_profile(3.0, 0.0));
        f.deck
            .well_mut(f.source)
            .unwrap()
            .set_volume_uncertainty(VolumeUncertainty::new(4.0, 0.0));
        propagate(&mut f.deck, f.pipette, 100.0, f.source, f.destination).unwrap();

        // Source random becomes 5.0; relative terms are 3/100 and 5/1000.
        let pc = (0.03_f64.powi(2) + 0.005_f64.powi(2)).sqrt();
        let source = f.deck.well(f.source).unwrap().stock("dox").unwrap();
        let destination = f.deck.well(f.destination).unwrap().stock("dox").unwrap();
        assert!(f64_approx_equal(destination.volume_uncertainty, pc * 100.0));
        assert!(f64_approx_equal(source.volume_uncertainty, pc * 900.0));
    }

    #[test]
    fn existing_destination_stock_accumulates() {
        let mut f = fixture(PipetteErrorProfile::exact());
        {
            let well = f.deck.well_mut(f.destination).unwrap();
            well.set_volume(50.0);
            well.set_constituent("dox", 500.0, 5.0, 2.0);
            well.set_constituent("water", 1.0, 0.0, 0.0);
        }
        propagate(&mut f.deck, f.pipette, 100.0, f.source, f.destination).unwrap();

        let destination = f.deck.well(f.destination).unwrap();
        let dox = destination.stock("dox").unwrap();
        assert!(f64_approx_equal(dox.volume, 150.0));
        assert!(f64_approx_equal(dox.volume_uncertainty, 2.0));
        assert_eq!(destination.constituents(), ["dox".to_string(), "water".to_string()]);
    }

    #[test]
    fn new_constituents_are_appended_in_discovery_order() {
        let mut f = fixture(PipetteErrorProfile::exact());
        f.deck
            .well_mut(f.source)
            .unwrap()
            .set_constituent("epi", 20.0, 0.0, 0.0);
        f.deck.well_mut(f.destination).unwrap().set_volume(10.0);
        f.deck
            .well_mut(f.destination)
            .unwrap()
            .set_constituent("water", 1.0, 0.0, 0.0);

        let summary = propagate(&mut f.deck, f.pipette, 100.0, f.source, f.destination).unwrap();
        assert_eq!(summary.destination_constituents, 3);
        let names: Vec<&str> = f
            .deck
            .well(f.destination)
            .unwrap()
            .stocks()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["water", "dox", "epi"]);
    }

    #[test]
    fn empty_source_fails_and_leaves_the_deck_unchanged() {
        let mut f = fixture(PipetteErrorProfile::exact());
        f.deck.well_mut(f.source).unwrap().set_volume(0.0);
        let before_destination = f.deck.well(f.destination).unwrap().clone();

        let result = propagate(&mut f.deck, f.pipette, 10.0, f.source, f.destination);
        assert!(matches!(result, Err(EngineError::DivideByZero { .. })));
        assert_eq!(f.deck.well(f.destination).unwrap(), &before_destination);
    }

    #[test]
    fn withdrawing_more_than_the_source_holds_is_rejected() {
        let mut f = fixture(PipetteErrorProfile::exact());
        let before_source = f.deck.well(f.source).unwrap().clone();

        let result = propagate(&mut f.deck, f.pipette, 1500.0, f.source, f.destination);
        assert_eq!(
            result,
            Err(EngineError::InsufficientVolume {
                requested: 1500.0,
                available: 1000.0,
            })
        );
        assert_eq!(f.deck.well(f.source).unwrap(), &before_source);
        assert!(f.deck.well(f.destination).unwrap().stock("dox").is_none());

        let summary = propagate(&mut f.deck, f.pipette, 1000.0, f.source, f.destination).unwrap();
        assert!(f64_approx_equal(summary.withdrawn_fraction, 1.0));
        assert_eq!(f.deck.well(f.source).unwrap().stock("dox").unwrap().volume, 0.0);
    }

    #[test]
    fn missing_profile_is_a_missing_calibration() {
        let mut deck = Deck::new();
        let pipette = deck.add_pipette(spec());
        let source = deck.initiate_well("a", table(), None);
        let destination = deck.initiate_well("b", table(), None);
        deck.well_mut(source).unwrap().set_volume(100.0);

        assert!(matches!(
            propagate(&mut deck, pipette, 10.0, source, destination),
            Err(EngineError::MissingCalibration { .. })
        ));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let mut f = fixture(PipetteErrorProfile::exact());
        assert!(matches!(
            propagate(&mut f.deck, f.pipette, 0.0, f.source, f.destination),
            Err(EngineError::InvalidVolume { .. })
        ));
        assert!(matches!(
            propagate(&mut f.deck, f.pipette, 10.0, f.source, f.source),
            Err(EngineError::InvalidTransfer(_))
        ));
    }
}
