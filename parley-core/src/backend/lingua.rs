//! High-accuracy backend on top of the `lingua` crate
//!
//! Building the detector loads n-gram models for every language, so the
//! descriptor is registered as heavy and the model is built on first use.

use super::{Backend, BackendDescriptor, LatencyClass};
use crate::error::Result;
use crate::types::BackendResult;
use lingua::{Language, LanguageDetector, LanguageDetectorBuilder};
use std::sync::Arc;

/// Registry name
pub const NAME: &str = "lingua";

/// Number of alternatives kept in the reported distribution
const DISTRIBUTION_SIZE: usize = 5;

/// Lingua-backed detector
pub struct LinguaBackend {
    detector: LanguageDetector,
}

impl LinguaBackend {
    /// Detector over all lingua languages
    pub fn new() -> Self {
        Self {
            detector: LanguageDetectorBuilder::from_all_languages().build(),
        }
    }
}

impl Default for LinguaBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn code(language: &Language) -> String {
    language.iso_code_639_1().to_string()
}

impl Backend for LinguaBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn detect(&self, text: &str) -> Result<BackendResult> {
        let values = self.detector.compute_language_confidence_values(text);
        let Some((top, confidence)) = values.first() else {
            return Ok(BackendResult::undetermined(NAME));
        };
        if *confidence <= 0.0 {
            return Ok(BackendResult::undetermined(NAME));
        }

        let distribution: Vec<(String, f64)> = values
            .iter()
            .take(DISTRIBUTION_SIZE)
            .map(|(lang, p)| (code(lang), *p))
            .collect();
        Ok(BackendResult::new(NAME, &code(top), *confidence).with_distribution(distribution))
    }

    fn supported_languages(&self) -> Vec<String> {
        Language::all().iter().map(code).collect()
    }
}

/// Registry entry for lingua
pub fn descriptor() -> BackendDescriptor {
    let languages: Vec<String> = Language::all().iter().map(code).collect();
    BackendDescriptor::new(NAME, || Ok(Arc::new(LinguaBackend::new()) as Arc<dyn Backend>))
        .with_reliability(5)
        .with_latency(LatencyClass::Heavy)
        .with_languages(languages)
}
