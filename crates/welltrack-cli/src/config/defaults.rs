pub struct DefaultsConfig {
    pub tip_length: f64,
    pub flow_rate: f64,
    pub wet_cycles: u32,
    pub mix_cycles: u32,
    pub mix_aspiration_depth: f64,
    pub mix_dispense_depth: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            tip_length: 51.0,
            flow_rate: 92.86,
            wet_cycles: 3,
            mix_cycles: 3,
            mix_aspiration_depth: 2.0,
            mix_dispense_depth: 1.0,
        }
    }
}

/// Nominal capacity of the pipette models shipped with the built-in error profiles.
pub fn model_max_volume(model: &str) -> Option<f64> {
    match model {
        "p10" => Some(10.0),
        "p20" => Some(20.0),
        "p50" => Some(50.0),
        "p300" => Some(300.0),
        "p1000" => Some(1000.0),
        _ => None,
    }
}
