use super::motion::{AspirateParams, DispenseParams};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Invalid value for '{name}': {value} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

/// Where to run a touch-tip after each dispense, besides the one always done at the source
/// after aspirating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TouchTipPosition {
    #[default]
    None,
    Source,
    Destination,
}

/// Options of a forward transfer, which aspirates exactly the volume it dispenses.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardOptions {
    /// Wetting cycles before the first pass; `0` skips pre-wetting.
    pub pre_wet: u32,
    pub aspirate_rate: f64,
    pub aspirate_depth: f64,
    pub dispense_rate: f64,
    pub dispense_meniscus: bool,
    pub dispense_depth: f64,
    pub touch_tip: TouchTipPosition,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            pre_wet: 0,
            aspirate_rate: 75.0,
            aspirate_depth: 2.0,
            dispense_rate: 300.0,
            dispense_meniscus: true,
            dispense_depth: 0.0,
            touch_tip: TouchTipPosition::None,
        }
    }
}

impl ForwardOptions {
    pub fn aspirate_params(&self) -> AspirateParams {
        AspirateParams {
            immersion_depth: self.aspirate_depth,
            rate: self.aspirate_rate,
            ..AspirateParams::default()
        }
    }

    pub fn dispense_params(&self) -> DispenseParams {
        DispenseParams {
            meniscus_relative: self.dispense_meniscus,
            immersion_depth: self.dispense_depth,
            rate: self.dispense_rate,
            ..DispenseParams::default()
        }
    }
}

/// Options of a reverse transfer, which over-aspirates by `disposal_volume` and returns the
/// excess to the source after each pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReverseOptions {
    pub disposal_volume: f64,
    pub pre_wet: u32,
    pub aspirate_rate: f64,
    pub aspirate_depth: f64,
    pub dispense_rate: f64,
    pub dispense_meniscus: bool,
    pub dispense_depth: f64,
    pub touch_tip: TouchTipPosition,
}

impl Default for ReverseOptions {
    fn default() -> Self {
        Self {
            disposal_volume: 5.0,
            pre_wet: 0,
            aspirate_rate: 37.0,
            aspirate_depth: 2.0,
            dispense_rate: 150.0,
            dispense_meniscus: true,
            dispense_depth: 0.0,
            touch_tip: TouchTipPosition::None,
        }
    }
}

impl ReverseOptions {
    pub fn aspirate_params(&self) -> AspirateParams {
        AspirateParams {
            immersion_depth: self.aspirate_depth,
            rate: self.aspirate_rate,
            ..AspirateParams::default()
        }
    }

    pub fn dispense_params(&self) -> DispenseParams {
        DispenseParams {
            meniscus_relative: self.dispense_meniscus,
            immersion_depth: self.dispense_depth,
            rate: self.dispense_rate,
            ..DispenseParams::default()
        }
    }

    /// Parameters for returning the disposal volume to the source, measured from the rim.
    pub fn disposal_params(&self) -> DispenseParams {
        DispenseParams {
            meniscus_relative: false,
            ..DispenseParams::default()
        }
    }
}

#[derive(Default)]
pub struct ForwardOptionsBuilder {
    pre_wet: Option<u32>,
    aspirate_rate: Option<f64>,
    aspirate_depth: Option<f64>,
    dispense_rate: Option<f64>,
    dispense_meniscus: Option<bool>,
    dispense_depth: Option<f64>,
    touch_tip: Option<TouchTipPosition>,
}

impl ForwardOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pre_wet(mut self, cycles: u32) -> Self {
        self.pre_wet = Some(cycles);
        self
    }
    pub fn aspirate_rate(mut self, rate: f64) -> Self {
        self.aspirate_rate = Some(rate);
        self
    }
    pub fn aspirate_depth(mut self, depth: f64) -> Self {
        self.aspirate_depth = Some(depth);
        self
    }
    pub fn dispense_rate(mut self, rate: f64) -> Self {
        self.dispense_rate = Some(rate);
        self
    }
    pub fn dispense_meniscus(mut self, relative_to_meniscus: bool) -> Self {
        self.dispense_meniscus = Some(relative_to_meniscus);
        self
    }
    pub fn dispense_depth(mut self, depth: f64) -> Self {
        self.dispense_depth = Some(depth);
        self
    }
    pub fn touch_tip(mut self, position: TouchTipPosition) -> Self {
        self.touch_tip = Some(position);
        self
    }

    pub fn build(self) -> Result<ForwardOptions, ConfigError> {
        let defaults = ForwardOptions::default();
        let options = ForwardOptions {
            pre_wet: self.pre_wet.unwrap_or(defaults.pre_wet),
            aspirate_rate: self.aspirate_rate.unwrap_or(defaults.aspirate_rate),
            aspirate_depth: self.aspirate_depth.unwrap_or(defaults.aspirate_depth),
            dispense_rate: self.dispense_rate.unwrap_or(defaults.dispense_rate),
            dispense_meniscus: self.dispense_meniscus.unwrap_or(defaults.dispense_meniscus),
            dispense_depth: self.dispense_depth.unwrap_or(defaults.dispense_depth),
            touch_tip: self.touch_tip.unwrap_or(defaults.touch_tip),
        };
        check_rate("aspirate_rate", options.aspirate_rate)?;
        check_rate("dispense_rate", options.dispense_rate)?;
        check_depth("aspirate_depth", options.aspirate_depth)?;
        check_depth("dispense_depth", options.dispense_depth)?;
        Ok(options)
    }
}

#[derive(Default)]
pub struct ReverseOptionsBuilder {
    disposal_volume: Option<f64>,
    pre_wet: Option<u32>,
    aspirate_rate: Option<f64>,
    aspirate_depth: Option<f64>,
    dispense_rate: Option<f64>,
    dispense_meniscus: Option<bool>,
    dispense_depth: Option<f64>,
    touch_tip: Option<TouchTipPosition>,
}

impl ReverseOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disposal_volume(mut self, volume: f64) -> Self {
        self.disposal_volume = Some(volume);
        self
    }
    pub fn pre_wet(mut self, cycles: u32) -> Self {
        self.pre_wet = Some(cycles);
        self
    }
    pub fn aspirate_rate(mut self, rate: f64) -> Self {
        self.aspirate_rate = Some(rate);
        self
    }
    pub fn aspirate_depth(mut self, depth: f64) -> Self {
        self.aspirate_depth = Some(depth);
        self
    }
    pub fn dispense_rate(mut self, rate: f64) -> Self {
        self.dispense_rate = Some(rate);
        self
    }
    pub fn dispense_meniscus(mut self, relative_to_meniscus: bool) -> Self {
        self.dispense_meniscus = Some(relative_to_meniscus);
        self
    }
    pub fn dispense_depth(mut self, depth: f64) -> Self {
        self.dispense_depth = Some(depth);
        self
    }
    pub fn touch_tip(mut self, position: TouchTipPosition) -> Self {
        self.touch_tip = Some(position);
        self
    }

    pub fn build(self) -> Result<ReverseOptions, ConfigError> {
        let defaults = ReverseOptions::default();
        let options = ReverseOptions {
            disposal_volume: self.disposal_volume.unwrap_or(defaults.disposal_volume),
            pre_wet: self.pre_wet.unwrap_or(defaults.pre_wet),
            aspirate_rate: self.aspirate_rate.unwrap_or(defaults.aspirate_rate),
            aspirate_depth: self.aspirate_depth.unwrap_or(defaults.aspirate_depth),
            dispense_rate: self.dispense_rate.unwrap_or(defaults.dispense_rate),
            dispense_meniscus: self.dispense_meniscus.unwrap_or(defaults.dispense_meniscus),
            dispense_depth: self.dispense_depth.unwrap_or(defaults.dispense_depth),
            touch_tip: self.touch_tip.unwrap_or(defaults.touch_tip),
        };
        if !options.disposal_volume.is_finite() || options.disposal_volume < 0.0 {
            return Err(ConfigError::InvalidValue {
                name: "disposal_volume",
                value: options.disposal_volume,
                reason: "must be zero or positive",
            });
        }
        check_rate("aspirate_rate", options.aspirate_rate)?;
        check_rate("dispense_rate", options.dispense_rate)?;
        check_depth("aspirate_depth", options.aspirate_depth)?;
        check_depth("dispense_depth", options.dispense_depth)?;
        Ok(options)
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::InvalidValue {
            name,
            value,
            reason: "flow rate must be positive",
        });
    }
    Ok(())
}

fn check_depth(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::InvalidValue {
            name,
            value,
            reason: "depth must be finite",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_builder_fills_in_defaults() {
        let options = ForwardOptionsBuilder::new()
            .pre_wet(2)
            .touch_tip(TouchTipPosition::Destination)
            .build()
            .unwrap();
        assert_eq!(options.pre_wet, 2);
        assert_eq!(options.touch_tip, TouchTipPosition::Destination);
        assert_eq!(options.aspirate_rate, 75.0);
        assert_eq!(options.dispense_rate, 300.0);
        assert!(options.dispense_meniscus);
    }

    #[test]
    fn forward_builder_rejects_non_positive_rates() {
        let result = ForwardOptionsBuilder::new().dispense_rate(0.0).build();
        assert_eq!(
            result,
            Err(ConfigError::InvalidValue {
                name: "dispense_rate",
                value: 0.0,
                reason: "flow rate must be positive",
            })
        );
    }

    #[test]
    fn reverse_defaults_are_slower_with_a_disposal_volume() {
        let options = ReverseOptionsBuilder::new().build().unwrap();
        assert_eq!(options, ReverseOptions::default());
        assert_eq!(options.disposal_volume, 5.0);
        assert_eq!(options.aspirate_rate, 37.0);
        assert_eq!(options.dispense_rate, 150.0);
    }

    #[test]
    fn reverse_builder_rejects_negative_disposal() {
        assert!(
            ReverseOptionsBuilder::new()
                .disposal_volume(-1.0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn options_map_onto_motion_parameters() {
        let options = ForwardOptionsBuilder::new()
            .aspirate_depth(3.0)
            .dispense_meniscus(false)
            .dispense_depth(4.0)
            .build()
            .unwrap();
        let aspirate = options.aspirate_params();
        assert_eq!(aspirate.immersion_depth, 3.0);
        assert_eq!(aspirate.safety_height, 0.5);
        let dispense = options.dispense_params();
        assert!(!dispense.meniscus_relative);
        assert_eq!(dispense.immersion_depth, 4.0);
        assert_eq!(dispense.safety_height, 1.0);

        let disposal = ReverseOptions::default().disposal_params();
        assert!(!disposal.meniscus_relative);
        assert_eq!(disposal.rate, 300.0);
    }
}
