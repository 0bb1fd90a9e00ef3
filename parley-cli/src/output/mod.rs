//! Output formatting module

use anyhow::Result;
use parley_core::{Candidate, CodeSwitchResult, DetectionResult, Reason, Script};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Trait for output formatters
pub trait OutputFormatter {
    /// Format and output one detection
    fn format_record(&mut self, record: &DetectionRecord) -> Result<()>;

    /// Finalize output (e.g., close JSON array)
    fn finish(&mut self) -> Result<()>;
}

pub mod json;
pub mod text;

pub use json::JsonFormatter;
pub use text::TextFormatter;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One tab-separated line per input
    Text,
    /// JSON array of detections with scores
    Json,
}

/// Everything printed about one input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// The input text
    pub text: String,
    /// Winning language code
    pub language: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Whether the confidence clears the mode threshold
    pub reliable: bool,
    /// How the decision was reached
    pub reason: Reason,
    /// Dominant script
    pub script: Script,
    /// Best-scoring languages
    pub candidates: Vec<Candidate>,
    /// Backends that voted
    pub backends: Vec<String>,
    /// Span analysis, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_switch: Option<CodeSwitchResult>,
}

impl DetectionRecord {
    /// Number of candidates kept per record
    pub const CANDIDATES: usize = 3;

    /// Record for `text` and its result
    pub fn new(text: &str, result: &DetectionResult) -> Self {
        Self {
            text: text.to_string(),
            language: result.language.clone(),
            confidence: result.confidence,
            reliable: result.reliable,
            reason: result.reason,
            script: result.script,
            candidates: result.candidates(Self::CANDIDATES),
            backends: result.backends.clone(),
            code_switch: None,
        }
    }

    /// Attach a span analysis
    pub fn with_code_switch(mut self, analysis: CodeSwitchResult) -> Self {
        self.code_switch = Some(analysis);
        self
    }
}

/// Formatter for `format` writing to `writer`
pub fn create_formatter<'a, W: Write + 'a>(
    format: OutputFormat,
    writer: W,
) -> Box<dyn OutputFormatter + 'a> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter::new(writer)),
        OutputFormat::Json => Box::new(JsonFormatter::new(writer)),
    }
}
