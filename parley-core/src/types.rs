//! Core value types shared across the engine

use crate::error::Error;
use crate::normalize::normalize_lang_tag;
use crate::script::Script;
use crate::voting::ScoreTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Sentinel language code for "undetermined"
pub const UNDETERMINED: &str = "und";

/// Returns true for codes that carry an actual language decision
pub fn is_determined(code: &str) -> bool {
    !code.is_empty() && code != UNDETERMINED
}

/// Output of one backend invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendResult {
    backend: String,
    language: String,
    confidence: f64,
    distribution: Option<BTreeMap<String, f64>>,
}

impl BackendResult {
    /// Create a result; the language tag is normalized and the confidence clamped to [0, 1]
    pub fn new(backend: impl Into<String>, language: &str, confidence: f64) -> Self {
        let language = normalize_lang_tag(language);
        let confidence = if is_determined(&language) {
            clamp_unit(confidence)
        } else {
            0.0
        };
        Self {
            backend: backend.into(),
            language,
            confidence,
            distribution: None,
        }
    }

    /// Result for a backend that abstained
    pub fn undetermined(backend: impl Into<String>) -> Self {
        Self::new(backend, UNDETERMINED, 0.0)
    }

    /// Attach a full probability distribution.
    ///
    /// Probabilities are clamped to [0, 1]; a distribution summing above one
    /// is rescaled to sum to exactly one.
    pub fn with_distribution<I, S>(mut self, distribution: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut dist = BTreeMap::new();
        for (lang, p) in distribution {
            let lang = normalize_lang_tag(lang.as_ref());
            if is_determined(&lang) {
                *dist.entry(lang).or_insert(0.0) += clamp_unit(p);
            }
        }
        let total: f64 = dist.values().sum();
        if total > 1.0 {
            for p in dist.values_mut() {
                *p /= total;
            }
        }
        self.distribution = Some(dist);
        self
    }

    /// Name of the backend that produced this result
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Top language code
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Confidence in the top language
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Full distribution, when the backend reports one
    pub fn distribution(&self) -> Option<&BTreeMap<String, f64>> {
        self.distribution.as_ref()
    }

    /// Whether the backend made a decision
    pub fn is_determined(&self) -> bool {
        is_determined(&self.language)
    }
}

/// How much text the caller expects; tunes thresholds and backend subsets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Single words and short chat messages; fast backends only
    Short,
    /// General purpose
    #[default]
    Default,
    /// Paragraphs and documents
    Long,
}

impl DetectionMode {
    /// Mode name
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMode::Short => "short",
            DetectionMode::Default => "default",
            DetectionMode::Long => "long",
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(DetectionMode::Short),
            "default" => Ok(DetectionMode::Default),
            "long" => Ok(DetectionMode::Long),
            other => Err(Error::Configuration(format!(
                "unknown detection mode '{other}'"
            ))),
        }
    }
}

/// Why a detection ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    /// Input was empty or whitespace only
    EmptyInput,
    /// The script alone determines the language
    ScriptUnambiguous,
    /// Backends agreed through the voting strategy
    Ensemble,
    /// Conversation history changed the winner
    ContextPrior,
    /// Hint words decided the winner
    HintMatch,
    /// Consensus voting found no language with enough agreement
    InsufficientConsensus,
    /// Backends answered but none cast a vote
    NoEvidence,
}

impl Reason {
    /// Stable machine-readable form
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::EmptyInput => "empty-input",
            Reason::ScriptUnambiguous => "script-unambiguous",
            Reason::Ensemble => "ensemble",
            Reason::ContextPrior => "context-prior",
            Reason::HintMatch => "hint-match",
            Reason::InsufficientConsensus => "insufficient-consensus",
            Reason::NoEvidence => "no-evidence",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a ranked candidate list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Language code
    pub language: String,
    /// Aggregate score
    pub score: f64,
}

/// Final decision returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Winning language code, or "und"
    pub language: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Whether the confidence clears the mode threshold
    pub reliable: bool,
    /// How the decision was reached
    pub reason: Reason,
    /// Dominant script of the input
    pub script: Script,
    /// Per-language scores, when an ensemble vote happened
    pub scores: Option<ScoreTable>,
    /// Backends whose results took part in the vote
    pub backends: Vec<String>,
}

impl DetectionResult {
    /// Deterministic "undetermined" result
    pub fn undetermined(reason: Reason, script: Script) -> Self {
        Self {
            language: UNDETERMINED.to_string(),
            confidence: 0.0,
            reliable: false,
            reason,
            script,
            scores: None,
            backends: Vec::new(),
        }
    }

    /// Certain result decided without backends
    pub fn certain(language: &str, reason: Reason, script: Script) -> Self {
        Self {
            language: language.to_string(),
            confidence: 1.0,
            reliable: true,
            reason,
            script,
            scores: None,
            backends: Vec::new(),
        }
    }

    /// Whether a language was determined
    pub fn is_determined(&self) -> bool {
        is_determined(&self.language)
    }

    /// Top-k candidates by score; the winner alone when no table is attached
    pub fn candidates(&self, k: usize) -> Vec<Candidate> {
        match &self.scores {
            Some(table) => table
                .ranked()
                .into_iter()
                .take(k)
                .map(|(language, score)| Candidate { language, score })
                .collect(),
            None if self.is_determined() && k > 0 => vec![Candidate {
                language: self.language.clone(),
                score: self.confidence,
            }],
            None => Vec::new(),
        }
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2}, {})",
            self.language, self.confidence, self.reason
        )
    }
}

/// Clamp a score into [0, 1], mapping NaN to 0
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_result_clamps_and_normalizes() {
        let result = BackendResult::new("x", "FR-ca", 1.7);
        assert_eq!(result.language(), "fr");
        assert_eq!(result.confidence(), 1.0);

        let result = BackendResult::new("x", "en", f64::NAN);
        assert_eq!(result.confidence(), 0.0);
    }

    #[test]
    fn test_undetermined_has_zero_confidence() {
        let result = BackendResult::new("x", "und", 0.8);
        assert!(!result.is_determined());
        assert_eq!(result.confidence(), 0.0);
    }

    #[test]
    fn test_distribution_drops_undetermined_entries() {
        let result =
            BackendResult::new("x", "es", 0.6).with_distribution([("es", 0.6), ("und", 0.4)]);
        let dist = result.distribution().unwrap();
        assert_eq!(dist.len(), 1);
        assert_eq!(dist["es"], 0.6);
    }

    #[test]
    fn test_distribution_above_one_is_rescaled() {
        let result = BackendResult::new("x", "es", 0.9)
            .with_distribution([("es", 0.9), ("pt", 0.9), ("ES", 0.3)]);
        let dist = result.distribution().unwrap();
        let total: f64 = dist.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(dist["es"] > dist["pt"]);

        let partial = BackendResult::new("x", "es", 0.5).with_distribution([("es", 0.5)]);
        assert_eq!(partial.distribution().unwrap()["es"], 0.5);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("SHORT".parse::<DetectionMode>().unwrap(), DetectionMode::Short);
        assert_eq!(DetectionMode::default(), DetectionMode::Default);
        assert!("tiny".parse::<DetectionMode>().is_err());
    }

    #[test]
    fn test_reason_serializes_kebab_case() {
        let json = serde_json::to_string(&Reason::ScriptUnambiguous).unwrap();
        assert_eq!(json, "\"script-unambiguous\"");
        assert_eq!(Reason::InsufficientConsensus.to_string(), "insufficient-consensus");
    }

    #[test]
    fn test_candidates_without_table() {
        let result = DetectionResult::certain("ko", Reason::ScriptUnambiguous, Script::Hangul);
        let candidates = result.candidates(3);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].language, "ko");

        let und = DetectionResult::undetermined(Reason::EmptyInput, Script::Unknown);
        assert!(und.candidates(3).is_empty());
    }
}
