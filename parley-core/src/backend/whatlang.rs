//! Trigram backend on top of the `whatlang` crate

use super::{Backend, BackendDescriptor, LatencyClass};
use crate::error::Result;
use crate::normalize::normalize_lang_tag;
use crate::types::BackendResult;
use std::sync::Arc;
use whatlang::{Detector, Lang};

/// Registry name
pub const NAME: &str = "whatlang";

/// Fast trigram detector
pub struct WhatlangBackend {
    detector: Detector,
}

impl WhatlangBackend {
    /// Detector over every language whatlang knows
    pub fn new() -> Self {
        Self {
            detector: Detector::new(),
        }
    }
}

impl Default for WhatlangBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for WhatlangBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn detect(&self, text: &str) -> Result<BackendResult> {
        match self.detector.detect(text) {
            Some(info) => {
                // whatlang reports ISO 639-3; fold to the two-letter form
                let lang = normalize_lang_tag(info.lang().code());
                Ok(BackendResult::new(NAME, &lang, info.confidence()))
            }
            None => Ok(BackendResult::undetermined(NAME)),
        }
    }

    fn supported_languages(&self) -> Vec<String> {
        Lang::all()
            .iter()
            .map(|lang| normalize_lang_tag(lang.code()))
            .collect()
    }
}

/// Registry entry for whatlang
pub fn descriptor() -> BackendDescriptor {
    let languages = WhatlangBackend::new().supported_languages();
    BackendDescriptor::new(NAME, || Ok(Arc::new(WhatlangBackend::new()) as Arc<dyn Backend>))
        .with_reliability(3)
        .with_latency(LatencyClass::Fast)
        .with_languages(languages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_long_english() {
        let backend = WhatlangBackend::new();
        let result = backend
            .detect("This is a longer English sentence to make sure detection is correct.")
            .unwrap();
        assert_eq!(result.language(), "en");
        assert!(result.confidence() > 0.0);
    }

    #[test]
    fn test_codes_are_two_letter() {
        let result = WhatlangBackend::new()
            .detect("Ceci est une phrase assez longue écrite en français.")
            .unwrap();
        assert_eq!(result.language(), "fr");
        assert!(WhatlangBackend::new()
            .supported_languages()
            .contains(&"de".to_string()));
    }

    #[test]
    fn test_empty_is_undetermined() {
        assert!(!WhatlangBackend::new().detect("").unwrap().is_determined());
    }
}
