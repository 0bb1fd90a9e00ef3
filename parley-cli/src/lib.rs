//! Parley CLI library
//!
//! This library provides the command-line interface for the parley
//! ensemble language detector.

pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod store;

pub use error::{CliError, CliResult};
