//! Proper-noun filtering
//!
//! Names ("Paris", "John") pull backends towards whatever language they
//! resemble. The filter drops or masks capitalised words that are not at
//! the start of a sentence, using capitalisation heuristics only.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Placeholder used by [`ProperNounStrategy::Mask`]
pub const NAME_MASK: &str = "[NAME]";

static COMMON_WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();

fn common_words() -> &'static HashSet<&'static str> {
    COMMON_WORDS.get_or_init(|| {
        [
            // English
            "the", "a", "an", "in", "on", "at", "to", "for", "of", "with", "is", "are", "was",
            "were", "be", "been", "have", "has", "had", "do", "does", "did", "will", "would",
            "could", "should", "may", "might", "must", "can", "i", "you", "he", "she", "it",
            "we", "they", "what", "which", "who", "this", "that", "these", "those", "am", "and",
            "or", "but", "if", "then", "when", "where", "why", "how", "all", "some", "no", "not",
            "so", "very", "just", "also", "now", "here", "there",
            // German
            "der", "die", "das", "und", "oder",
            // French
            "le", "la", "les", "et", "ou",
            // Spanish
            "el", "los", "las", "y", "o",
            // Italian
            "il", "lo", "gli", "e",
        ]
        .into_iter()
        .collect()
    })
}

/// What to do with detected proper nouns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProperNounStrategy {
    /// Leave the text untouched
    #[default]
    None,
    /// Drop proper nouns
    Remove,
    /// Replace proper nouns with [`NAME_MASK`]
    Mask,
}

impl fmt::Display for ProperNounStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProperNounStrategy::None => "none",
            ProperNounStrategy::Remove => "remove",
            ProperNounStrategy::Mask => "mask",
        })
    }
}

impl FromStr for ProperNounStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(ProperNounStrategy::None),
            "remove" => Ok(ProperNounStrategy::Remove),
            "mask" => Ok(ProperNounStrategy::Mask),
            other => Err(Error::Configuration(format!(
                "unknown proper-noun strategy '{other}'"
            ))),
        }
    }
}

/// Heuristic proper-noun filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProperNounFilter {
    strategy: ProperNounStrategy,
}

/// Position-aware view of one whitespace-separated word
struct Word<'a> {
    text: &'a str,
    sentence_start: bool,
}

fn words(text: &str) -> impl Iterator<Item = Word<'_>> {
    let mut sentence_start = true;
    text.split_whitespace().map(move |text| {
        let word = Word {
            text,
            sentence_start,
        };
        sentence_start = text.ends_with(['.', '!', '?']);
        word
    })
}

impl Word<'_> {
    fn is_proper_noun(&self) -> bool {
        let Some(first) = self.text.chars().find(|c| c.is_alphanumeric()) else {
            return false;
        };
        if self.sentence_start || !first.is_uppercase() {
            return false;
        }
        if self.text.chars().any(|c| c.is_numeric()) {
            return false;
        }

        let letters: Vec<char> = self.text.chars().filter(|c| c.is_alphabetic()).collect();
        // Acronyms such as "FBI" stay
        if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
            return false;
        }
        let clean: String = letters.iter().flat_map(|c| c.to_lowercase()).collect();
        !common_words().contains(clean.as_str())
    }
}

impl ProperNounFilter {
    /// Filter with the given strategy
    pub fn new(strategy: ProperNounStrategy) -> Self {
        Self { strategy }
    }

    /// Configured strategy
    pub fn strategy(&self) -> ProperNounStrategy {
        self.strategy
    }

    /// Apply the strategy; text without proper nouns is borrowed unchanged
    pub fn filter<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.strategy == ProperNounStrategy::None || text.is_empty() {
            return Cow::Borrowed(text);
        }
        if !words(text).any(|w| w.is_proper_noun()) {
            return Cow::Borrowed(text);
        }

        let kept: Vec<&str> = words(text)
            .filter_map(|w| match (w.is_proper_noun(), self.strategy) {
                (false, _) => Some(w.text),
                (true, ProperNounStrategy::Mask) => Some(NAME_MASK),
                (true, _) => None,
            })
            .collect();
        Cow::Owned(kept.join(" "))
    }

    /// Words the heuristics consider proper nouns
    pub fn identify(&self, text: &str) -> Vec<String> {
        words(text)
            .filter(|w| w.is_proper_noun())
            .map(|w| {
                w.text
                    .trim_matches(|c: char| !c.is_alphanumeric())
                    .to_string()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remove() -> ProperNounFilter {
        ProperNounFilter::new(ProperNounStrategy::Remove)
    }

    #[test]
    fn test_remove_proper_nouns() {
        let out = remove().filter("He went to Paris with John.");
        assert!(!out.contains("Paris"));
        assert!(!out.contains("John"));
        assert!(out.contains("went"));
        assert!(out.starts_with("He"));
    }

    #[test]
    fn test_mask_proper_nouns() {
        let out = ProperNounFilter::new(ProperNounStrategy::Mask).filter("He visited Paris with Mary.");
        assert_eq!(out, "He visited [NAME] with [NAME]");
    }

    #[test]
    fn test_none_strategy_borrows() {
        let filter = ProperNounFilter::default();
        assert!(matches!(filter.filter("John went to Paris."), Cow::Borrowed(_)));
    }

    #[test]
    fn test_keeps_acronyms_and_common_words() {
        let out = remove().filter("The FBI investigated. I went to The store.");
        assert!(out.contains("FBI"));
        assert!(out.contains("The store"));
    }

    #[test]
    fn test_sentence_starts_preserved() {
        let out = remove().filter("John went home. Mary stayed in Paris.");
        assert_eq!(out, "John went home. Mary stayed in");
    }

    #[test]
    fn test_identify() {
        let nouns = remove().identify("John and Mary went to Paris.");
        assert_eq!(nouns, vec!["Mary".to_string(), "Paris".to_string()]);
        assert!(remove().identify("").is_empty());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("MASK".parse::<ProperNounStrategy>().unwrap(), ProperNounStrategy::Mask);
        assert!("drop".parse::<ProperNounStrategy>().is_err());
    }
}
