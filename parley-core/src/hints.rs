//! User-supplied word → language hints
//!
//! Hints are consulted read-only during detection. When every hinted word
//! in a message points to the same language, the ensemble receives a
//! synthetic high-confidence vote for it.

use crate::error::{Error, Result};
use crate::normalize::{normalize_lang_tag, normalize_word, tokenize};
use crate::types::is_determined;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of scanning a text for hinted words
#[derive(Debug, Clone, PartialEq)]
pub struct HintMatch {
    /// Language with the most hinted words
    pub language: String,
    /// Share of the text's tokens hinting at `language`
    pub score: f64,
    /// Whether every hinted word agreed on `language`
    pub unanimous: bool,
}

/// Word → language mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HintDictionary {
    #[serde(default)]
    case_sensitive: bool,
    hints: BTreeMap<String, String>,
}

impl HintDictionary {
    /// Empty, case-insensitive dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty dictionary that matches words exactly as written
    pub fn case_sensitive() -> Self {
        Self {
            case_sensitive: true,
            hints: BTreeMap::new(),
        }
    }

    /// Build from `(word, language)` pairs
    pub fn from_pairs<I, W, L>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (W, L)>,
        W: AsRef<str>,
        L: AsRef<str>,
    {
        let mut dict = Self::new();
        dict.add_many(pairs)?;
        Ok(dict)
    }

    /// Parse a flat TOML table of `word = "lang"` entries
    pub fn from_toml(source: &str) -> Result<Self> {
        let map: BTreeMap<String, String> = toml::from_str(source)?;
        Self::from_pairs(map)
    }

    /// Parse a flat JSON object of `"word": "lang"` entries
    pub fn from_json(source: &str) -> Result<Self> {
        let map: BTreeMap<String, String> = serde_json::from_str(source)?;
        Self::from_pairs(map)
    }

    fn key(&self, word: &str) -> String {
        if self.case_sensitive {
            word.to_string()
        } else {
            normalize_word(word)
        }
    }

    /// Add or replace a hint. Words must be non-empty and contain no whitespace.
    pub fn add(&mut self, word: &str, language: &str) -> Result<()> {
        let word = word.trim();
        if word.is_empty() || word.chars().any(char::is_whitespace) {
            return Err(Error::Configuration(format!(
                "hint word '{word}' must be a single non-empty word"
            )));
        }
        let language = normalize_lang_tag(language);
        if !is_determined(&language) {
            return Err(Error::Configuration(format!(
                "hint for '{word}' has no usable language"
            )));
        }
        let key = self.key(word);
        self.hints.insert(key, language);
        Ok(())
    }

    /// Add several hints, stopping at the first invalid one
    pub fn add_many<I, W, L>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (W, L)>,
        W: AsRef<str>,
        L: AsRef<str>,
    {
        for (word, lang) in pairs {
            self.add(word.as_ref(), lang.as_ref())?;
        }
        Ok(())
    }

    /// Remove a hint; returns whether it existed
    pub fn remove(&mut self, word: &str) -> bool {
        let key = self.key(word);
        self.hints.remove(&key).is_some()
    }

    /// Language hinted for a single word
    pub fn lookup(&self, word: &str) -> Option<&str> {
        self.hints.get(&self.key(word)).map(String::as_str)
    }

    /// Whether a word has a hint
    pub fn contains(&self, word: &str) -> bool {
        self.lookup(word).is_some()
    }

    /// Number of hints
    pub fn len(&self) -> usize {
        self.hints.len()
    }

    /// Whether there are no hints
    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    /// Iterate `(word, language)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.hints.iter().map(|(w, l)| (w.as_str(), l.as_str()))
    }

    /// New dictionary with `other`'s hints layered over these
    pub fn merge(&self, other: &HintDictionary) -> HintDictionary {
        let mut merged = self.clone();
        for (word, lang) in other.iter() {
            let key = merged.key(word);
            merged.hints.insert(key, lang.to_string());
        }
        merged
    }

    /// Count hinted words per language in `text`
    pub fn lookup_all(&self, text: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        if self.hints.is_empty() {
            return counts;
        }
        for token in tokenize(text) {
            if let Some(lang) = self.lookup(token.text) {
                *counts.entry(lang.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Best hinted language in `text`, if any word matched
    pub fn scan(&self, text: &str) -> Option<HintMatch> {
        let counts = self.lookup_all(text);
        let (language, hits) = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))?;
        let tokens = tokenize(text).len().max(1);
        Some(HintMatch {
            language: language.clone(),
            score: *hits as f64 / tokens as f64,
            unanimous: counts.len() == 1,
        })
    }
}
