use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileCalibration {
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub csv: Vec<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileDefaults {
    pub tip_length: Option<f64>,
    pub flow_rate: Option<f64>,
    pub wet_cycles: Option<u32>,
    pub mix_cycles: Option<u32>,
    pub mix_aspiration_depth: Option<f64>,
    pub mix_dispense_depth: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileFlowRates {
    pub aspirate: f64,
    pub dispense: f64,
    pub blow_out: f64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FilePipette {
    pub name: String,
    /// Pipette model, also the name of its error profile in the calibration library.
    pub model: String,
    pub max_volume: Option<f64>,
    pub tip_length: Option<f64>,
    pub flow_rates: Option<FileFlowRates>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConstituent {
    pub name: String,
    pub concentration: f64,
    #[serde(default)]
    pub concentration_uncertainty: f64,
    #[serde(default)]
    pub volume_uncertainty: f64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileWell {
    pub name: String,
    pub container: String,
    pub volume: Option<f64>,
    pub headroom: Option<f64>,
    pub diameter: Option<f64>,
    /// Centre of the well's rim in deck coordinates.
    pub top: Option<[f64; 3]>,
    pub depth: Option<f64>,
    #[serde(default)]
    pub constituents: Vec<FileConstituent>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FileTouchTip {
    #[default]
    None,
    Source,
    Destination,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileMixPattern {
    TopToBottom,
    BottomToTop,
    Static,
}

/// A forward or reverse transfer step. Motion keys left out keep the engine defaults.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileTransfer {
    pub pipette: String,
    pub source: String,
    pub destination: String,
    pub volume: f64,
    /// Only meaningful for reverse transfers.
    pub disposal_volume: Option<f64>,
    pub pre_wet: Option<u32>,
    pub aspirate_rate: Option<f64>,
    pub aspirate_depth: Option<f64>,
    pub dispense_rate: Option<f64>,
    pub dispense_meniscus: Option<bool>,
    pub dispense_depth: Option<f64>,
    #[serde(default)]
    pub touch_tip: FileTouchTip,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileMix {
    pub pipette: String,
    pub well: String,
    pub volume: f64,
    pub cycles: Option<u32>,
    pub pattern: Option<FileMixPattern>,
    pub aspiration_depth: Option<f64>,
    pub dispense_depth: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileWet {
    pub pipette: String,
    pub well: String,
    pub volume: f64,
    pub cycles: Option<u32>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum FileStep {
    TransferForward(FileTransfer),
    TransferReverse(FileTransfer),
    Mix(FileMix),
    Wet(FileWet),
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileReport {
    #[serde(default)]
    pub wells: Vec<String>,
    #[serde(default)]
    pub constituents: Vec<String>,
}

/// A protocol as written on disk: calibration overrides, labware, and the ordered steps.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ProtocolFile {
    #[serde(default)]
    pub calibration: FileCalibration,
    #[serde(default)]
    pub defaults: FileDefaults,
    #[serde(default)]
    pub pipettes: Vec<FilePipette>,
    #[serde(default)]
    pub wells: Vec<FileWell>,
    #[serde(default)]
    pub steps: Vec<FileStep>,
    #[serde(default)]
    pub report: FileReport,
}

impl ProtocolFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading protocol from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}
