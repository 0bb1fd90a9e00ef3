//! Detector options shared by the commands

use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;
use clap::Args;
use parley_core::{DetectionMode, DetectorConfig, LanguageDetector};
use std::fs;
use std::path::{Path, PathBuf};

/// Options every detecting command accepts
#[derive(Debug, Clone, Args)]
pub struct DetectorArgs {
    /// Input length class
    #[arg(short, long, value_enum, default_value = "default")]
    pub mode: ModeArg,

    /// Backends to consult, comma separated (default: all available)
    #[arg(short, long, value_name = "NAME", value_delimiter = ',')]
    pub backends: Vec<String>,

    /// Voting strategy: weighted, hard, soft or consensus(N)
    #[arg(long, value_name = "STRATEGY")]
    pub voting: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Detector configuration file (TOML)
    #[arg(short, long, value_name = "FILE", env = "PARLEY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Detection modes accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    /// Single words and chat messages
    Short,
    /// General purpose
    Default,
    /// Paragraphs and documents
    Long,
}

impl From<ModeArg> for DetectionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Short => DetectionMode::Short,
            ModeArg::Default => DetectionMode::Default,
            ModeArg::Long => DetectionMode::Long,
        }
    }
}

impl DetectorArgs {
    /// Detection mode for every call
    pub fn mode(&self) -> DetectionMode {
        self.mode.into()
    }

    /// Configuration file contents with command-line overrides applied
    pub fn detector_config(&self) -> CliResult<DetectorConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => DetectorConfig::default(),
        };
        if !self.backends.is_empty() {
            config.backends = self.backends.clone();
        }
        if let Some(voting) = &self.voting {
            config.voting = voting.clone();
        }
        Ok(config)
    }

    /// Build the detector these options describe
    pub fn build_detector(&self) -> CliResult<LanguageDetector> {
        let config = self.detector_config()?;
        log::debug!("detector configuration: {config:?}");
        Ok(LanguageDetector::with_config(config).map_err(CliError::from)?)
    }

    /// Initialize logging based on verbosity level
    pub fn init_logging(&self) {
        let log_level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        // A second command in one process keeps the first logger
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .try_init();
    }
}

/// Read and validate a detector configuration file
pub fn load_config(path: &Path) -> CliResult<DetectorConfig> {
    let source = fs::read_to_string(path)
        .map_err(|e| CliError::ConfigError(format!("{}: {e}", path.display())))?;
    let config = DetectorConfig::from_toml(&source)
        .map_err(|e| CliError::ConfigError(format!("{}: {e}", path.display())))?;
    log::info!("loaded configuration from {}", path.display());
    Ok(config)
}
