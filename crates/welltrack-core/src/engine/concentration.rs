use super::error::EngineError;
use crate::core::models::well::WellState;
use std::fmt;
use tracing::warn;

/// Concentration of one constituent in a well, with its uncertainty bracket.
///
/// `low_bound` assumes the stock volume is fully correlated with the well volume, `high_bound`
/// assumes it is independent. Both are absolute, in the unit of the stock concentration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcentrationEstimate {
    pub concentration: f64,
    pub low_bound: f64,
    pub high_bound: f64,
}

impl ConcentrationEstimate {
    pub const ZERO: Self = Self {
        concentration: 0.0,
        low_bound: 0.0,
        high_bound: 0.0,
    };
}

impl fmt::Display for ConcentrationEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.4} \u{b1} ({:.4} - {:.4})",
            self.concentration, self.low_bound, self.high_bound
        )
    }
}

/// Relative error `delta / base`, where an exact quantity contributes nothing.
pub(crate) fn relative(delta: f64, base: f64) -> f64 {
    if delta == 0.0 { 0.0 } else { delta / base }
}

/// Reads the concentration of `constituent` in `well` from its stock records.
///
/// The well volume is corrected by its systematic volume uncertainty before use.
///
/// # Errors
///
/// Returns [`EngineError::ConstituentNotPresent`] if the well never received the constituent and
/// [`EngineError::DivideByZero`] if the corrected well volume is zero.
pub fn get_concentration(
    well: &WellState,
    constituent: &str,
) -> Result<ConcentrationEstimate, EngineError> {
    let Some(stock) = well.stock(constituent) else {
        warn!(constituent, "Constituent is not present in the well.");
        return Err(EngineError::ConstituentNotPresent {
            constituent: constituent.to_string(),
        });
    };

    let uncertainty = well.volume_uncertainty();
    let corrected_volume = well.volume() + uncertainty.systematic;
    if corrected_volume == 0.0 {
        return Err(EngineError::DivideByZero {
            context: "corrected well volume is zero",
        });
    }

    let concentration = stock.volume / corrected_volume * stock.concentration;
    if concentration == 0.0 {
        return Ok(ConcentrationEstimate::ZERO);
    }

    let rel_concentration = relative(stock.concentration_uncertainty, stock.concentration);
    let rel_well = relative(uncertainty.random, corrected_volume);
    let rel_stock_volume = relative(stock.volume_uncertainty, stock.volume);

    let low = rel_concentration.hypot(rel_well);
    let high = (rel_stock_volume.powi(2) + rel_concentration.powi(2) + rel_well.powi(2)).sqrt();

    Ok(ConcentrationEstimate {
        concentration,
        low_bound: low * concentration,
        high_bound: high * concentration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calibration::table::CalibrationTable;
    use crate::core::models::well::VolumeUncertainty;
    use std::sync::Arc;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn well_with(volume: f64) -> WellState {
        let table = CalibrationTable::build(&[[0.0, 50000.0], [100.0, 0.0]]).unwrap();
        let mut well = WellState::new(Arc::new(table));
        well.set_volume(volume);
        well
    }

    #[test]
    fn freshly_seeded_stock_reads_back_its_concentration() {
        let mut well = well_with(10000.0);
        well.set_constituent("dox", 15000.0, 150.0, 0.0);

        let estimate = get_concentration(&well, "dox").unwrap();
        assert!(f64_approx_equal(estimate.concentration, 15000.0));
        assert!(f64_approx_equal(estimate.low_bound, 150.0));
        assert!(f64_approx_equal(estimate.high_bound, 150.0));
    }

    #[test]
    fn missing_constituent_is_an_error() {
        let mut well = well_with(10000.0);
        well.set_constituent("dox", 15000.0, 150.0, 0.0);
        assert_eq!(
            get_concentration(&well, "epi"),
            Err(EngineError::ConstituentNotPresent {
                constituent: "epi".to_string()
            })
        );
    }

    #[test]
    fn systematic_uncertainty_corrects_the_well_volume() {
        let mut well = well_with(200.0);
        well.set_constituent("dox", 1000.0, 0.0, 0.0);
        well.set_volume_uncertainty(VolumeUncertainty::new(0.0, -50.0));

        let estimate = get_concentration(&well, "dox").unwrap();
        assert!(f64_approx_equal(estimate.concentration, 200.0 / 150.0 * 1000.0));
    }

    #[test]
    fn high_bound_includes_stock_volume_uncertainty() {
        let mut well = well_with(100.0);
        well.set_constituent("dox", 100.0, 3.0, 4.0);
        well.set_volume_uncertainty(VolumeUncertainty::new(0.0, 0.0));

        let estimate = get_concentration(&well, "dox").unwrap();
        assert!(f64_approx_equal(estimate.concentration, 100.0));
        assert!(f64_approx_equal(estimate.low_bound, 3.0));
        assert!(f64_approx_equal(estimate.high_bound, 5.0));
        assert!(estimate.high_bound >= estimate.low_bound);
    }

    #[test]
    fn zero_corrected_volume_is_a_divide_by_zero() {
        let mut well = well_with(0.0);
        well.set_constituent("dox", 100.0, 0.0, 0.0);
        assert!(matches!(
            get_concentration(&well, "dox"),
            Err(EngineError::DivideByZero { .. })
        ));
    }

    #[test]
    fn display_shows_the_bracket() {
        let estimate = ConcentrationEstimate {
            concentration: 1.5,
            low_bound: 0.1,
            high_bound: 0.2,
        };
        assert_eq!(estimate.to_string(), "1.5000 \u{b1} (0.1000 - 0.2000)");
    }
}
