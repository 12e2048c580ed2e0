use super::CalibrationError;
use super::profile::PipetteErrorProfile;
use super::table::CalibrationTable;
use phf::{Map, phf_map};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

// Gradations are `[headroom_mm, volume_uL]`, from the rim gradation (full) down to the bottom
// (empty).
// Individual containers of one type vary in depth, so these are nominal values.

const EPPTUBE_1500UL: &[[f64; 2]] = &[
    [8.0, 1500.0],
    [16.4, 1000.0],
    [27.4, 400.0],
    [35.2, 100.0],
    [40.0, 20.0],
    [42.2, 0.0],
];

const AMBTUBE_1500UL: &[[f64; 2]] = &[
    [4.827, 1506.0],
    [5.0, 1493.0],
    [6.0, 1421.0],
    [7.0, 1353.0],
    [8.0, 1285.0],
    [9.0, 1218.0],
    [10.0, 1151.0],
    [11.0, 1085.0],
    [12.0, 1020.0],
    [13.0, 956.0],
    [14.0, 892.0],
    [15.0, 829.0],
    [16.0, 766.0],
    [17.0, 705.0],
    [18.0, 644.0],
    [19.0, 583.0],
    [20.0, 523.0],
    [21.0, 466.0],
    [22.0, 413.0],
    [23.0, 364.0],
    [24.0, 318.0],
    [25.0, 276.0],
    [26.0, 238.0],
    [27.0, 203.0],
    [28.0, 171.0],
    [29.0, 142.0],
    [30.0, 117.0],
    [31.0, 93.0],
    [32.0, 73.0],
    [33.0, 55.0],
    [34.0, 39.0],
    [35.0, 25.0],
    [36.0, 13.0],
    [37.0, 4.0],
    [37.9, 0.0],
];

const FTUBE_15ML: &[[f64; 2]] = &[
    [13.8, 15000.0],
    [93.8, 2000.0],
    [101.6, 1000.0],
    [118.1, 0.0],
];

const EPPTUBE_5ML: &[[f64; 2]] = &[
    [7.46, 5034.0],
    [8.0, 4952.0],
    [10.0, 4648.0],
    [12.0, 4346.0],
    [14.0, 4046.0],
    [16.0, 3748.0],
    [18.0, 3453.0],
    [20.0, 3159.0],
    [22.0, 2869.0],
    [24.0, 2580.0],
    [26.0, 2293.0],
    [28.0, 2009.0],
    [30.0, 1727.0],
    [32.0, 1447.0],
    [34.0, 1172.0],
    [35.0, 1045.0],
    [36.0, 928.0],
    [37.0, 819.0],
    [38.0, 720.0],
    [39.0, 628.0],
    [40.0, 544.0],
    [41.0, 468.0],
    [42.0, 400.0],
    [43.0, 338.0],
    [44.0, 283.0],
    [45.0, 233.0],
    [46.0, 190.0],
    [47.0, 152.0],
    [48.0, 119.0],
    [49.0, 91.0],
    [50.0, 67.0],
    [51.0, 47.0],
    [52.0, 31.0],
    [53.0, 18.0],
    [54.0, 8.0],
    [55.4, 0.0],
];

const EPPTUBE_15ML: &[[f64; 2]] = &[
    [1.2, 16210.0],
    [2.0, 16070.0],
    [4.0, 15710.0],
    [6.0, 15350.0],
    [8.0, 14990.0],
    [10.0, 14640.0],
    [15.0, 13760.0],
    [20.0, 12900.0],
    [25.0, 12050.0],
    [30.0, 11210.0],
    [35.0, 10380.0],
    [40.0, 9573.0],
    [45.0, 8774.0],
    [50.0, 7988.0],
    [55.0, 7214.0],
    [60.0, 6453.0],
    [65.0, 5704.0],
    [70.0, 4967.0],
    [75.0, 4243.0],
    [80.0, 3531.0],
    [85.0, 2830.0],
    [90.0, 2142.0],
    [95.0, 1465.0],
    [97.5, 1131.0],
    [100.0, 837.0],
    [105.0, 407.0],
    [110.0, 153.0],
    [115.0, 28.0],
    [117.6, 0.0],
];

const EPPTUBE_50ML: &[[f64; 2]] = &[
    [5.0, 53910.0],
    [10.0, 50910.0],
    [15.0, 47950.0],
    [20.0, 45010.0],
    [25.0, 42110.0],
    [30.0, 39230.0],
    [35.0, 36380.0],
    [40.0, 33560.0],
    [45.0, 30780.0],
    [50.0, 28020.0],
    [55.0, 25290.0],
    [60.0, 22580.0],
    [65.0, 19910.0],
    [70.0, 17270.0],
    [75.0, 14650.0],
    [80.0, 12060.0],
    [85.0, 9505.0],
    [90.0, 6974.0],
    [95.0, 4470.0],
    [98.0, 2982.0],
    [100.0, 2091.0],
    [105.0, 667.0],
    [110.0, 92.0],
    [113.0, 0.0],
];

const FTUBE_50ML: &[[f64; 2]] = &[
    [8.0, 50000.0],
    [94.9, 4000.0],
    [103.5, 1000.0],
    [113.5, 0.0],
];

const VIAL_1500UL: &[[f64; 2]] = &[[12.7, 1500.0], [30.9, 0.0]];
const VIAL_2ML: &[[f64; 2]] = &[[11.0, 2000.0], [34.2, 0.0]];
const VIAL_4ML: &[[f64; 2]] = &[[15.0, 4000.0], [44.0, 0.0]];
const VIAL_8ML: &[[f64; 2]] = &[[12.8, 8000.0], [58.7, 0.0]];
const VIAL_20ML: &[[f64; 2]] = &[[17.26, 20000.0], [55.6, 0.0]];
const VIAL_30ML: &[[f64; 2]] = &[[16.3, 30000.0], [93.3, 0.0]];

const CUVETTE_70UL: &[[f64; 2]] = &[
    [10.0, 900.0],
    [15.0, 600.0],
    [21.0, 300.0],
    [28.5, 70.0],
    [32.2, 0.0],
];

const TLC_50UL: &[[f64; 2]] = &[[0.0, 50.0], [0.1, 0.0]];

pub static CONTAINER_GRADATIONS: Map<&'static str, &'static [[f64; 2]]> = phf_map! {
    "epptube-1500ul" => EPPTUBE_1500UL,
    "ambtube-1500ul" => AMBTUBE_1500UL,
    "ftube-15ml" => FTUBE_15ML,
    "epptube-5ml" => EPPTUBE_5ML,
    "epptube-15ml" => EPPTUBE_15ML,
    "epptube-50ml" => EPPTUBE_50ML,
    "ftube-50ml" => FTUBE_50ML,
    "vial-1500ul" => VIAL_1500UL,
    "vial-2ml" => VIAL_2ML,
    "vial-4ml" => VIAL_4ML,
    "vial-8ml" => VIAL_8ML,
    "vial-20ml" => VIAL_20ML,
    "vial-30ml" => VIAL_30ML,
    "cuvette-70ul" => CUVETTE_70UL,
    "tlc-50ul" => TLC_50UL,
};

// Error profiles are `[random_uL, systematic_uL, volume_uL]`, from 100% down to 10% of capacity.

const P50_ERRORS: &[[f64; 3]] = &[
    [0.16, -1.08, 50.0],
    [0.10, -0.83, 37.5],
    [0.17, -0.44, 25.0],
    [0.05, -0.53, 12.5],
    [0.14, -0.61, 5.0],
];

const P300_ERRORS: &[[f64; 3]] = &[
    [0.38, -4.4, 300.0],
    [0.27, -3.88, 225.0],
    [0.24, -3.18, 150.0],
    [0.15, -2.17, 75.0],
    [0.15, -0.83, 30.0],
];

const P1000_ERRORS: &[[f64; 3]] = &[
    [0.44, 4.56, 1000.0],
    [0.22, -1.39, 750.0],
    [0.31, -1.08, 500.0],
    [0.14, -0.25, 250.0],
    [0.25, 0.10, 100.0],
];

pub static PIPETTE_ERROR_PROFILES: Map<&'static str, &'static [[f64; 3]]> = phf_map! {
    "p50" => P50_ERRORS,
    "p300" => P300_ERRORS,
    "p1000" => P1000_ERRORS,
};

#[derive(Debug, Error)]
pub enum RegistryLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("CSV parsing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("Invalid calibration data for '{name}': {source}")]
    Calibration {
        name: String,
        source: CalibrationError,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSampleSet {
    samples: Vec<Vec<f64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLibraryFile {
    #[serde(default)]
    containers: HashMap<String, RawSampleSet>,
    #[serde(default)]
    pipettes: HashMap<String, RawSampleSet>,
}

#[derive(Debug, Deserialize)]
struct CsvGradation {
    container: String,
    headroom: f64,
    volume: f64,
}

/// Read-only library of container calibration tables and pipette error profiles, keyed by name.
///
/// Built once at start-up and shared with the deck; tables are handed out as `Arc`s so every
/// well of one container type references the same interpolants.
#[derive(Debug, Clone, Default)]
pub struct CalibrationRegistry {
    containers: HashMap<String, Arc<CalibrationTable>>,
    pipettes: HashMap<String, Arc<PipetteErrorProfile>>,
}

impl CalibrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every table of the compiled-in measurement library.
    pub fn builtin() -> Result<Self, RegistryLoadError> {
        let mut registry = Self::new();
        for (name, rows) in CONTAINER_GRADATIONS.entries() {
            let table = CalibrationTable::build(*rows).map_err(|e| calibration_error(name, e))?;
            registry.insert_container(*name, table);
        }
        for (name, rows) in PIPETTE_ERROR_PROFILES.entries() {
            let profile =
                PipetteErrorProfile::build(*rows).map_err(|e| calibration_error(name, e))?;
            registry.insert_pipette_profile(*name, profile);
        }
        Ok(registry)
    }

    pub fn insert_container(&mut self, name: impl Into<String>, table: CalibrationTable) {
        self.containers.insert(name.into(), Arc::new(table));
    }

    pub fn insert_pipette_profile(
        &mut self,
        name: impl Into<String>,
        profile: PipetteErrorProfile,
    ) {
        self.pipettes.insert(name.into(), Arc::new(profile));
    }

    pub fn container(&self, name: &str) -> Option<Arc<CalibrationTable>> {
        self.containers.get(name).cloned()
    }

    pub fn pipette_profile(&self, name: &str) -> Option<Arc<PipetteErrorProfile>> {
        self.pipettes.get(name).cloned()
    }

    pub fn container_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.containers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn pipette_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pipettes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Adds the `[containers.*]` and `[pipettes.*]` sample sets of a TOML file.
    ///
    /// Entries replace built-in tables of the same name.
    pub fn extend_from_toml(&mut self, path: &Path) -> Result<(), RegistryLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| RegistryLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let raw: RawLibraryFile = toml::from_str(&content).map_err(|e| RegistryLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;

        for (name, set) in raw.containers {
            let table =
                CalibrationTable::build(&set.samples).map_err(|e| calibration_error(&name, e))?;
            debug!(
                container = %name,
                samples = table.sample_count(),
                "Loaded container gradations."
            );
            self.insert_container(name, table);
        }
        for (name, set) in raw.pipettes {
            let profile = PipetteErrorProfile::build(&set.samples)
                .map_err(|e| calibration_error(&name, e))?;
            debug!(pipette = %name, "Loaded pipette error profile.");
            self.insert_pipette_profile(name, profile);
        }
        Ok(())
    }

    /// Adds container gradations from a `container,headroom,volume` CSV file.
    pub fn extend_containers_from_csv(&mut self, path: &Path) -> Result<(), RegistryLoadError> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| RegistryLoadError::Csv {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;

        let mut grouped: BTreeMap<String, Vec<[f64; 2]>> = BTreeMap::new();
        for result in reader.deserialize::<CsvGradation>() {
            let record = result.map_err(|e| RegistryLoadError::Csv {
                path: path.to_string_lossy().to_string(),
                source: e,
            })?;
            grouped
                .entry(record.container)
                .or_default()
                .push([record.headroom, record.volume]);
        }

        for (name, rows) in grouped {
            let table = CalibrationTable::build(&rows).map_err(|e| calibration_error(&name, e))?;
            self.insert_container(name, table);
        }
        Ok(())
    }
}

fn calibration_error(name: &str, source: CalibrationError) -> RegistryLoadError {
    RegistryLoadError::Calibration {
        name: name.to_string(),
        source,
    }
}
