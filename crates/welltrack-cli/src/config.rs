pub mod defaults;
pub mod file;
pub mod models;

use crate::error::{CliError, Result};
use defaults::{DefaultsConfig, model_max_volume};
use file::{
    FileCalibration, FileDefaults, FileMix, FileMixPattern, FilePipette, FileStep, FileTouchTip,
    FileTransfer, FileWell, ProtocolFile,
};
use models::{AppConfig, ProtocolStep, ReportSelection};
use nalgebra::Point3;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use welltrack::core::calibration::library::CalibrationRegistry;
use welltrack::core::models::deck::Deck;
use welltrack::core::models::geometry::WellGeometry;
use welltrack::core::models::ids::{PipetteId, WellId};
use welltrack::core::models::pipette::{FlowRates, PipetteSpec};
use welltrack::engine::config::{
    ForwardOptions, ForwardOptionsBuilder, ReverseOptions, ReverseOptionsBuilder, TouchTipPosition,
};
use welltrack::workflows::mixing::{MixParams, MixPattern};
use welltrack::workflows::transfer::TransferRequest;

impl From<FileTouchTip> for TouchTipPosition {
    fn from(p: FileTouchTip) -> Self {
        match p {
            FileTouchTip::None => TouchTipPosition::None,
            FileTouchTip::Source => TouchTipPosition::Source,
            FileTouchTip::Destination => TouchTipPosition::Destination,
        }
    }
}

impl From<FileMixPattern> for MixPattern {
    fn from(p: FileMixPattern) -> Self {
        match p {
            FileMixPattern::TopToBottom => MixPattern::top_to_bottom(),
            FileMixPattern::BottomToTop => MixPattern::bottom_to_top(),
            FileMixPattern::Static => MixPattern::static_at_middle(),
        }
    }
}

impl FileDefaults {
    fn resolve(&self) -> DefaultsConfig {
        let d = DefaultsConfig::default();
        DefaultsConfig {
            tip_length: self.tip_length.unwrap_or(d.tip_length),
            flow_rate: self.flow_rate.unwrap_or(d.flow_rate),
            wet_cycles: self.wet_cycles.unwrap_or(d.wet_cycles),
            mix_cycles: self.mix_cycles.unwrap_or(d.mix_cycles),
            mix_aspiration_depth: self.mix_aspiration_depth.unwrap_or(d.mix_aspiration_depth),
            mix_dispense_depth: self.mix_dispense_depth.unwrap_or(d.mix_dispense_depth),
        }
    }
}

/// Builds the calibration library: the built-in tables, then the protocol's own files, then the
/// files given on the command line. Later sources replace earlier tables of the same name.
///
/// Relative paths in the protocol are resolved against the protocol's directory.
pub fn load_registry(
    base_dir: &Path,
    calibration: &FileCalibration,
    extra: &[PathBuf],
) -> Result<CalibrationRegistry> {
    let mut registry = CalibrationRegistry::builtin()?;

    for path in &calibration.files {
        registry.extend_from_toml(&base_dir.join(path))?;
    }
    for path in &calibration.csv {
        registry.extend_containers_from_csv(&base_dir.join(path))?;
    }
    for path in extra {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => registry.extend_containers_from_csv(path)?,
            _ => registry.extend_from_toml(path)?,
        }
    }

    debug!(
        containers = registry.container_names().len(),
        pipettes = registry.pipette_names().len(),
        "Calibration library ready."
    );
    Ok(registry)
}

impl ProtocolFile {
    /// Resolves every name in the protocol against the registry and a fresh deck.
    pub fn into_app_config(self, registry: &CalibrationRegistry) -> Result<AppConfig> {
        let defaults = self.defaults.resolve();
        let mut deck = Deck::new();

        for pipette in &self.pipettes {
            add_pipette(&mut deck, registry, pipette, &defaults)?;
        }
        for well in &self.wells {
            add_well(&mut deck, registry, well)?;
        }

        let steps = self
            .steps
            .iter()
            .map(|step| resolve_step(&deck, step, &defaults))
            .collect::<Result<Vec<_>>>()?;

        let report = ReportSelection {
            wells: self
                .report
                .wells
                .iter()
                .map(|name| well_id(&deck, name))
                .collect::<Result<Vec<_>>>()?,
            constituents: self.report.constituents,
        };

        info!(
            pipettes = self.pipettes.len(),
            wells = self.wells.len(),
            steps = steps.len(),
            "Protocol resolved."
        );
        Ok(AppConfig {
            deck,
            steps,
            report,
        })
    }

    pub fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };
            let float = || {
                value_str.parse::<f64>().map_err(|_| {
                    CliError::Config(format!("Invalid float value for {}: {}", key, value_str))
                })
            };
            let integer = || {
                value_str.parse::<u32>().map_err(|_| {
                    CliError::Config(format!("Invalid integer value for {}: {}", key, value_str))
                })
            };

            let d = &mut self.defaults;
            match key {
                "defaults.tip-length" => d.tip_length = Some(float()?),
                "defaults.flow-rate" => d.flow_rate = Some(float()?),
                "defaults.wet-cycles" => d.wet_cycles = Some(integer()?),
                "defaults.mix-cycles" => d.mix_cycles = Some(integer()?),
                "defaults.mix-aspiration-depth" => d.mix_aspiration_depth = Some(float()?),
                "defaults.mix-dispense-depth" => d.mix_dispense_depth = Some(float()?),
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn add_pipette(
    deck: &mut Deck,
    registry: &CalibrationRegistry,
    pipette: &FilePipette,
    defaults: &DefaultsConfig,
) -> Result<PipetteId> {
    if deck.find_pipette(&pipette.name).is_some() {
        return Err(CliError::Config(format!(
            "Pipette '{}' is declared twice.",
            pipette.name
        )));
    }
    let max_volume = pipette
        .max_volume
        .or_else(|| model_max_volume(&pipette.model))
        .ok_or_else(|| {
            CliError::Config(format!(
                "Pipette '{}' has unknown model '{}'; set 'max-volume' explicitly.",
                pipette.name, pipette.model
            ))
        })?;
    let flow_rates = match &pipette.flow_rates {
        Some(f) => FlowRates {
            aspirate: f.aspirate,
            dispense: f.dispense,
            blow_out: f.blow_out,
        },
        None => FlowRates {
            aspirate: defaults.flow_rate,
            dispense: defaults.flow_rate,
            blow_out: defaults.flow_rate,
        },
    };

    let id = deck.add_pipette(PipetteSpec {
        name: pipette.name.clone(),
        max_volume,
        flow_rates,
        tip_length: pipette.tip_length.unwrap_or(defaults.tip_length),
    });
    match registry.pipette_profile(&pipette.model) {
        Some(profile) => {
            deck.attach_profile(id, profile);
        }
        None => warn!(
            pipette = %pipette.name,
            model = %pipette.model,
            "No error profile for this model; transfers with it will fail."
        ),
    }
    Ok(id)
}

fn add_well(deck: &mut Deck, registry: &CalibrationRegistry, well: &FileWell) -> Result<WellId> {
    if deck.find_well(&well.name).is_some() {
        return Err(CliError::Config(format!(
            "Well '{}' is declared twice.",
            well.name
        )));
    }
    let table = registry.container(&well.container).ok_or_else(|| {
        CliError::Config(format!(
            "Well '{}' uses unknown container '{}'.",
            well.name, well.container
        ))
    })?;
    let geometry = match (well.top, well.depth) {
        (Some([x, y, z]), Some(depth)) => Some(WellGeometry {
            diameter: well.diameter,
            top: Point3::new(x, y, z),
            depth,
        }),
        (None, None) => None,
        _ => {
            return Err(CliError::Config(format!(
                "Well '{}' must give 'top' and 'depth' together.",
                well.name
            )));
        }
    };

    let id = deck.initiate_well(&well.name, table, geometry);
    let state = deck
        .well_mut(id)
        .ok_or_else(|| CliError::Config(format!("Well '{}' could not be created.", well.name)))?;
    match (well.volume, well.headroom) {
        (Some(_), Some(_)) => {
            return Err(CliError::Config(format!(
                "Well '{}' sets both 'volume' and 'headroom'; give only one.",
                well.name
            )));
        }
        (Some(volume), None) => {
            if !volume.is_finite() || volume < 0.0 {
                return Err(CliError::Config(format!(
                    "Well '{}' has an invalid volume: {}",
                    well.name, volume
                )));
            }
            state.set_volume(volume);
        }
        (None, Some(headroom)) => state.set_headroom(headroom),
        (None, None) => {}
    }
    for c in &well.constituents {
        state.set_constituent(
            &c.name,
            c.concentration,
            c.concentration_uncertainty,
            c.volume_uncertainty,
        );
    }
    Ok(id)
}

fn well_id(deck: &Deck, name: &str) -> Result<WellId> {
    deck.find_well(name)
        .ok_or_else(|| CliError::Config(format!("Unknown well '{}'.", name)))
}

fn pipette_id(deck: &Deck, name: &str) -> Result<PipetteId> {
    deck.find_pipette(name)
        .ok_or_else(|| CliError::Config(format!("Unknown pipette '{}'.", name)))
}

fn transfer_request(deck: &Deck, transfer: &FileTransfer) -> Result<TransferRequest> {
    Ok(TransferRequest {
        pipette: pipette_id(deck, &transfer.pipette)?,
        volume: transfer.volume,
        source: well_id(deck, &transfer.source)?,
        destination: well_id(deck, &transfer.destination)?,
    })
}

fn forward_options(transfer: &FileTransfer) -> Result<ForwardOptions> {
    if transfer.disposal_volume.is_some() {
        return Err(CliError::Config(format!(
            "Forward transfer from '{}' sets 'disposal-volume', which only reverse transfers use.",
            transfer.source
        )));
    }
    let mut builder = ForwardOptionsBuilder::new().touch_tip(transfer.touch_tip.into());
    if let Some(cycles) = transfer.pre_wet {
        builder = builder.pre_wet(cycles);
    }
    if let Some(rate) = transfer.aspirate_rate {
        builder = builder.aspirate_rate(rate);
    }
    if let Some(depth) = transfer.aspirate_depth {
        builder = builder.aspirate_depth(depth);
    }
    if let Some(rate) = transfer.dispense_rate {
        builder = builder.dispense_rate(rate);
    }
    if let Some(meniscus) = transfer.dispense_meniscus {
        builder = builder.dispense_meniscus(meniscus);
    }
    if let Some(depth) = transfer.dispense_depth {
        builder = builder.dispense_depth(depth);
    }
    Ok(builder.build()?)
}

fn reverse_options(transfer: &FileTransfer) -> Result<ReverseOptions> {
    let mut builder = ReverseOptionsBuilder::new().touch_tip(transfer.touch_tip.into());
    if let Some(volume) = transfer.disposal_volume {
        builder = builder.disposal_volume(volume);
    }
    if let Some(cycles) = transfer.pre_wet {
        builder = builder.pre_wet(cycles);
    }
    if let Some(rate) = transfer.aspirate_rate {
        builder = builder.aspirate_rate(rate);
    }
    if let Some(depth) = transfer.aspirate_depth {
        builder = builder.aspirate_depth(depth);
    }
    if let Some(rate) = transfer.dispense_rate {
        builder = builder.dispense_rate(rate);
    }
    if let Some(meniscus) = transfer.dispense_meniscus {
        builder = builder.dispense_meniscus(meniscus);
    }
    if let Some(depth) = transfer.dispense_depth {
        builder = builder.dispense_depth(depth);
    }
    Ok(builder.build()?)
}

fn resolve_mix(deck: &Deck, mix: &FileMix, defaults: &DefaultsConfig) -> Result<ProtocolStep> {
    let pipette = pipette_id(deck, &mix.pipette)?;
    let well = well_id(deck, &mix.well)?;
    let cycles = mix.cycles.unwrap_or(defaults.mix_cycles);
    match mix.pattern {
        Some(_) if mix.aspiration_depth.is_some() || mix.dispense_depth.is_some() => {
            Err(CliError::Config(format!(
                "Mix step on '{}' sets a pattern and explicit depths; give only one.",
                mix.well
            )))
        }
        Some(pattern) => Ok(ProtocolStep::MixPattern {
            pipette,
            well,
            volume: mix.volume,
            cycles,
            pattern: pattern.into(),
        }),
        None => Ok(ProtocolStep::Mix {
            pipette,
            well,
            params: MixParams::new(
                mix.volume,
                cycles,
                mix.aspiration_depth.unwrap_or(defaults.mix_aspiration_depth),
                mix.dispense_depth.unwrap_or(defaults.mix_dispense_depth),
            ),
        }),
    }
}

fn resolve_step(deck: &Deck, step: &FileStep, defaults: &DefaultsConfig) -> Result<ProtocolStep> {
    match step {
        FileStep::TransferForward(transfer) => Ok(ProtocolStep::TransferForward {
            request: transfer_request(deck, transfer)?,
            options: forward_options(transfer)?,
        }),
        FileStep::TransferReverse(transfer) => Ok(ProtocolStep::TransferReverse {
            request: transfer_request(deck, transfer)?,
            options: reverse_options(transfer)?,
        }),
        FileStep::Mix(mix) => resolve_mix(deck, mix, defaults),
        FileStep::Wet(wet) => Ok(ProtocolStep::Wet {
            pipette: pipette_id(deck, &wet.pipette)?,
            well: well_id(deck, &wet.well)?,
            volume: wet.volume,
            cycles: wet.cycles.unwrap_or(defaults.wet_cycles),
        }),
    }
}
