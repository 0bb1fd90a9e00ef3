//! Error handling for the CLI application

use std::fmt;

/// Errors raised by the CLI itself rather than the detector
#[derive(Debug)]
pub enum CliError {
    /// Input file missing or unreadable
    InputNotFound(String),
    /// Configuration file could not be used
    ConfigError(String),
    /// Session id or session file is unusable
    SessionError(String),
    /// Detection error from core
    DetectionError(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InputNotFound(path) => write!(f, "Input not found: {path}"),
            CliError::ConfigError(msg) => write!(f, "Configuration error: {msg}"),
            CliError::SessionError(msg) => write!(f, "Session error: {msg}"),
            CliError::DetectionError(msg) => write!(f, "Detection error: {msg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<parley_core::Error> for CliError {
    fn from(error: parley_core::Error) -> Self {
        match error {
            parley_core::Error::Configuration(msg) => CliError::ConfigError(msg),
            other => CliError::DetectionError(other.to_string()),
        }
    }
}

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, anyhow::Error>;
