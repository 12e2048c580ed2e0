/// Default plunger flow rates in uL/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowRates {
    pub aspirate: f64,
    pub dispense: f64,
    pub blow_out: f64,
}

/// Pipette capabilities as reported by the instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct PipetteSpec {
    pub name: String,
    pub max_volume: f64,
    pub flow_rates: FlowRates,
    /// Length of the currently mounted tip, in mm.
    pub tip_length: f64,
}

impl PipetteSpec {
    /// Converts an absolute aspiration rate (uL/s) to a fraction of the default rate.
    ///
    /// Returns `None` if the default rate is not strictly positive.
    pub fn relative_aspirate_rate(&self, rate: f64) -> Option<f64> {
        relative(rate, self.flow_rates.aspirate)
    }

    /// Converts an absolute dispense rate (uL/s) to a fraction of the default rate.
    pub fn relative_dispense_rate(&self, rate: f64) -> Option<f64> {
        relative(rate, self.flow_rates.dispense)
    }

    /// Deepest point below the current meniscus the tip may reach without wetting its shaft.
    pub fn max_submersion(&self) -> f64 {
        0.8 * self.tip_length
    }
}

fn relative(rate: f64, default: f64) -> Option<f64> {
    (default > 0.0).then(|| rate / default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p300() -> PipetteSpec {
        PipetteSpec {
            name: "p300".to_string(),
            max_volume: 300.0,
            flow_rates: FlowRates {
                aspirate: 150.0,
                dispense: 300.0,
                blow_out: 300.0,
            },
            tip_length: 50.0,
        }
    }

    #[test]
    fn relative_rates_are_fractions_of_the_defaults() {
        let p = p300();
        assert_eq!(p.relative_aspirate_rate(75.0), Some(0.5));
        assert_eq!(p.relative_dispense_rate(600.0), Some(2.0));
    }

    #[test]
    fn relative_rate_is_undefined_for_zero_default() {
        let mut p = p300();
        p.flow_rates.aspirate = 0.0;
        assert_eq!(p.relative_aspirate_rate(75.0), None);
    }

    #[test]
    fn max_submersion_is_eighty_percent_of_the_tip() {
        assert_eq!(p300().max_submersion(), 40.0);
    }
}
