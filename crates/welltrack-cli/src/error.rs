use std::path::PathBuf;
use thiserror::Error;
use welltrack::core::calibration::library::RegistryLoadError;
use welltrack::engine::config::ConfigError;
use welltrack::engine::error::EngineError;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    WellTrackCore(#[from] EngineError),

    #[error(transparent)]
    Calibration(#[from] RegistryLoadError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse file '{path}': {source}", path = path.display())]
    FileParsing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("{failed} of {total} protocol step(s) failed")]
    StepsFailed { failed: usize, total: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}
