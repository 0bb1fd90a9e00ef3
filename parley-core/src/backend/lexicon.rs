//! Function-word lexicon backend
//!
//! Statistical models need a few dozen characters to say anything useful;
//! greetings and function words ("bonjour", "muy", "that's") identify a
//! language on their own. Each known token splits one vote evenly between
//! the languages listing it; the language with the largest share of the
//! text's tokens wins.

use super::{Backend, BackendDescriptor, LatencyClass};
use crate::error::Result;
use crate::normalize::{normalize_word, tokenize};
use crate::types::BackendResult;
use serde::Deserialize;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Registry name
pub const NAME: &str = "lexicon";

#[derive(Debug, Deserialize)]
struct LexiconFile {
    #[serde(default = "default_scale")]
    confidence_scale: f64,
    languages: BTreeMap<String, Vec<String>>,
}

fn default_scale() -> f64 {
    0.95
}

/// Word-list backend
#[derive(Debug, Clone)]
pub struct LexiconBackend {
    words: HashMap<String, SmallVec<[String; 2]>>,
    languages: BTreeSet<String>,
    confidence_scale: f64,
}

impl LexiconBackend {
    /// Backend over the embedded word lists
    pub fn embedded() -> Result<Self> {
        Self::from_toml(include_str!("../../configs/lexicon.toml"))
    }

    /// Backend over a TOML word table
    pub fn from_toml(source: &str) -> Result<Self> {
        let file: LexiconFile = toml::from_str(source)?;
        let mut words: HashMap<String, SmallVec<[String; 2]>> = HashMap::new();
        let mut languages = BTreeSet::new();

        for (lang, list) in file.languages {
            let lang = crate::normalize::normalize_lang_tag(&lang);
            let unique: BTreeSet<String> = list.iter().map(|w| normalize_word(w)).collect();
            for word in unique {
                words.entry(word).or_default().push(lang.clone());
            }
            languages.insert(lang);
        }

        Ok(Self {
            words,
            languages,
            confidence_scale: file.confidence_scale.clamp(0.0, 1.0),
        })
    }

    /// Languages listing `word`
    pub fn languages_of(&self, word: &str) -> &[String] {
        self.words
            .get(&normalize_word(word))
            .map(|langs| langs.as_slice())
            .unwrap_or(&[])
    }
}

impl Backend for LexiconBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn detect(&self, text: &str) -> Result<BackendResult> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Ok(BackendResult::undetermined(NAME));
        }

        let mut shares: BTreeMap<&str, f64> = BTreeMap::new();
        for token in &tokens {
            let langs = self.languages_of(token.text);
            if langs.is_empty() {
                continue;
            }
            let share = 1.0 / langs.len() as f64;
            for lang in langs {
                *shares.entry(lang.as_str()).or_insert(0.0) += share;
            }
        }

        let total = tokens.len() as f64;
        // Highest share wins; ties go to the lexicographically smaller code
        let best = shares
            .iter()
            .fold(None, |best: Option<(&str, f64)>, (lang, share)| match best {
                Some((_, b)) if b >= *share => best,
                _ => Some((*lang, *share)),
            });

        let Some((lang, share)) = best else {
            return Ok(BackendResult::undetermined(NAME));
        };

        let scale = self.confidence_scale;
        Ok(BackendResult::new(NAME, lang, share / total * scale).with_distribution(
            shares
                .iter()
                .map(|(l, s)| (*l, s / total * scale))
                .collect::<Vec<_>>(),
        ))
    }

    fn supported_languages(&self) -> Vec<String> {
        self.languages.iter().cloned().collect()
    }
}

/// Registry entry for the embedded lexicon
pub fn descriptor() -> BackendDescriptor {
    let languages = LexiconBackend::embedded()
        .map(|backend| backend.supported_languages())
        .unwrap_or_default();
    BackendDescriptor::new(NAME, || {
        Ok(Arc::new(LexiconBackend::embedded()?) as Arc<dyn Backend>)
    })
    .with_reliability(4)
    .with_latency(LatencyClass::Fast)
    .with_languages(languages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> LexiconBackend {
        LexiconBackend::embedded().unwrap()
    }

    #[test]
    fn test_greeting_is_decisive() {
        let result = backend().detect("Bonjour!").unwrap();
        assert_eq!(result.language(), "fr");
        assert!((result.confidence() - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_shared_word_splits() {
        let backend = backend();
        let langs = backend.languages_of("Bien");
        assert!(langs.contains(&"fr".to_string()));
        assert!(langs.contains(&"es".to_string()));

        let result = backend.detect("bien").unwrap();
        assert!((result.confidence() - 0.475).abs() < 1e-12);
        let dist = result.distribution().unwrap();
        assert_eq!(dist["fr"], dist["es"]);
    }

    #[test]
    fn test_contraction_and_unknown_words() {
        let backend = backend();
        assert_eq!(backend.detect("That's").unwrap().language(), "en");
        assert_eq!(backend.detect("muy").unwrap().language(), "es");
        assert!(!backend.detect("importante").unwrap().is_determined());
        assert!(!backend.detect("").unwrap().is_determined());
    }

    #[test]
    fn test_sentence_majority() {
        let result = backend().detect("Where is the station, please?").unwrap();
        assert_eq!(result.language(), "en");
    }

    #[test]
    fn test_descriptor() {
        let descriptor = descriptor();
        assert_eq!(descriptor.name(), NAME);
        assert_eq!(descriptor.latency(), LatencyClass::Fast);
        assert!(descriptor.languages().iter().any(|l| l == "fr"));
    }
}
