//! Detector configuration
//!
//! Every section has defaults, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! backends = ["lexicon", "whatlang"]
//! voting = "consensus(2)"
//! context_weight = 0.6
//!
//! [weights]
//! lexicon = 20.0
//!
//! [parallel]
//! timeout_ms = 500
//! ```

use crate::error::{Error, Result};
use crate::preprocess::ProperNounStrategy;
use crate::types::DetectionMode;
use crate::voting::VotingStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Minimum confidence for a result to count as reliable, per mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Chat-length input
    pub short: f64,
    /// Sentence-length input
    pub default: f64,
    /// Paragraphs and documents
    pub long: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            short: 0.3,
            default: 0.5,
            long: 0.6,
        }
    }
}

impl Thresholds {
    /// Threshold for a mode
    pub fn for_mode(&self, mode: DetectionMode) -> f64 {
        match mode {
            DetectionMode::Short => self.short,
            DetectionMode::Default => self.default,
            DetectionMode::Long => self.long,
        }
    }
}

/// When and how backends run concurrently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParallelConfig {
    /// Fewest active backends that justify fan-out
    pub min_backends: usize,
    /// Text must be longer than this many characters
    pub min_chars: usize,
    /// Pool size (None = number of CPUs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            min_backends: 3,
            min_chars: 48,
            max_workers: None,
            timeout_ms: 2000,
        }
    }
}

impl ParallelConfig {
    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Confusion-pair correction settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfusionConfig {
    /// Run the resolver at all
    pub enabled: bool,
    /// Both members of a pair must rank within this many languages
    pub top_k: usize,
}

impl Default for ConfusionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: 3,
        }
    }
}

/// Code-switch segmentation settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodeSwitchConfig {
    /// Tokens per detection window
    pub window: usize,
    /// Runs shorter than this are candidates for absorption
    pub min_run_tokens: usize,
    /// A span needs this many tokens to count towards "mixed"
    pub min_span_tokens: usize,
    /// A span needs this confidence to count towards "mixed"
    pub min_confidence: f64,
}

impl Default for CodeSwitchConfig {
    fn default() -> Self {
        Self {
            window: 1,
            min_run_tokens: 2,
            min_span_tokens: 1,
            min_confidence: 0.3,
        }
    }
}

/// Top-level detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Backends to consult; empty means every available backend
    pub backends: Vec<String>,
    /// Voting strategy name
    pub voting: String,
    /// Per-backend weight overrides
    pub weights: BTreeMap<String, f64>,
    /// Reliability thresholds
    pub thresholds: Thresholds,
    /// Weight of the conversation prior in the final blend
    pub context_weight: f64,
    /// Result cache entries (0 disables caching)
    pub cache_capacity: usize,
    /// Proper-noun handling before backends run
    pub proper_nouns: ProperNounStrategy,
    /// Drop votes for languages the dominant script cannot express
    pub use_script_filter: bool,
    /// Restrict results to these languages; empty means unrestricted
    pub allowed_languages: Vec<String>,
    /// Parallel invocation
    pub parallel: ParallelConfig,
    /// Confusion resolver
    pub confusion: ConfusionConfig,
    /// Code-switch detector
    pub code_switch: CodeSwitchConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            voting: "weighted".to_string(),
            weights: BTreeMap::new(),
            thresholds: Thresholds::default(),
            context_weight: 0.6,
            cache_capacity: 1000,
            proper_nouns: ProperNounStrategy::None,
            use_script_filter: true,
            allowed_languages: Vec::new(),
            parallel: ParallelConfig::default(),
            confusion: ConfusionConfig::default(),
            code_switch: CodeSwitchConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: DetectorConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parsed built-in voting strategy.
    ///
    /// Custom strategy names are resolved by the detector's strategy
    /// registry instead.
    pub fn voting_strategy(&self) -> Result<VotingStrategy> {
        self.voting.parse()
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(Error::Configuration(format!(
                    "{name} must be within [0, 1], got {value}"
                )))
            }
        };

        unit("thresholds.short", self.thresholds.short)?;
        unit("thresholds.default", self.thresholds.default)?;
        unit("thresholds.long", self.thresholds.long)?;
        unit("code_switch.min_confidence", self.code_switch.min_confidence)?;

        if !self.context_weight.is_finite() || self.context_weight < 0.0 {
            return Err(Error::Configuration(format!(
                "context_weight must be a non-negative number, got {}",
                self.context_weight
            )));
        }

        for (name, weight) in &self.weights {
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(Error::Configuration(format!(
                    "weight for backend '{name}' must be positive, got {weight}"
                )));
            }
        }

        if self.voting.trim().is_empty() {
            return Err(Error::Configuration("voting strategy is empty".into()));
        }

        if self.parallel.max_workers == Some(0) {
            return Err(Error::Configuration(
                "parallel.max_workers must be greater than 0".into(),
            ));
        }
        if self.parallel.timeout_ms == 0 {
            return Err(Error::Configuration(
                "parallel.timeout_ms must be greater than 0".into(),
            ));
        }

        if self.confusion.top_k < 2 {
            return Err(Error::Configuration(
                "confusion.top_k must be at least 2".into(),
            ));
        }

        if self.code_switch.window == 0
            || self.code_switch.min_run_tokens == 0
            || self.code_switch.min_span_tokens == 0
        {
            return Err(Error::Configuration(
                "code_switch window and run lengths must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
