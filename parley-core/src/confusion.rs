//! Confusion-pair resolution
//!
//! Closely related languages (es/pt, no/da, ru/uk, ...) routinely split the
//! ensemble vote. When both members of a known pair sit near the top of the
//! score table, lexical features of the input shift score between them.

use crate::error::{Error, Result};
use crate::normalize::{normalize_lang_tag, normalize_text, normalize_word, tokenize};
use crate::voting::ScoreTable;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Largest per-check adjustment factor
pub const MAX_DELTA: f64 = 0.25;

static EMBEDDED: OnceLock<ConfusionResolver> = OnceLock::new();

/// What a feature check looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// Whole tokens
    Words,
    /// Substrings of the lowercased text
    Substrings,
    /// Token endings
    Suffixes,
}

/// One discriminating feature favouring a pair member
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCheck {
    /// Language the feature points to
    pub favors: String,
    /// Matching mode
    pub kind: FeatureKind,
    /// Values to look for, lowercased
    pub values: Vec<String>,
    /// Share of the pair's combined score moved when the check fires
    pub delta: f64,
}

impl FeatureCheck {
    fn fires(&self, text: &str, words: &BTreeSet<String>) -> bool {
        match self.kind {
            FeatureKind::Words => self.values.iter().any(|v| words.contains(v)),
            FeatureKind::Substrings => self.values.iter().any(|v| text.contains(v.as_str())),
            FeatureKind::Suffixes => words
                .iter()
                .any(|w| self.values.iter().any(|v| w.len() > v.len() && w.ends_with(v.as_str()))),
        }
    }
}

/// Unordered pair of confusable languages
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionPair {
    languages: [String; 2],
    checks: Vec<FeatureCheck>,
}

impl ConfusionPair {
    /// Pair members in table order
    pub fn languages(&self) -> (&str, &str) {
        (&self.languages[0], &self.languages[1])
    }

    /// Feature checks of this pair
    pub fn checks(&self) -> &[FeatureCheck] {
        &self.checks
    }

    /// Order-independent key, e.g. "es/pt"
    pub fn key(&self) -> String {
        pair_key(&self.languages[0], &self.languages[1])
    }

    fn other(&self, lang: &str) -> &str {
        if self.languages[0] == lang {
            &self.languages[1]
        } else {
            &self.languages[0]
        }
    }
}

fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}/{b}")
    } else {
        format!("{b}/{a}")
    }
}

#[derive(Debug, Deserialize)]
struct ConfusionFile {
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_min_ratio")]
    min_ratio: f64,
    #[serde(default = "default_delta")]
    default_delta: f64,
    #[serde(default)]
    families: BTreeMap<String, Vec<String>>,
    #[serde(default, rename = "pair")]
    pairs: Vec<PairEntry>,
}

#[derive(Debug, Deserialize)]
struct PairEntry {
    languages: [String; 2],
    #[serde(default, rename = "check")]
    checks: Vec<CheckEntry>,
}

#[derive(Debug, Deserialize)]
struct CheckEntry {
    favors: String,
    kind: FeatureKind,
    values: Vec<String>,
    delta: Option<f64>,
}

fn default_top_k() -> usize {
    3
}

fn default_min_ratio() -> f64 {
    0.5
}

fn default_delta() -> f64 {
    0.1
}

/// Applies confusion-pair corrections to score tables
#[derive(Debug, Clone)]
pub struct ConfusionResolver {
    pairs: Vec<ConfusionPair>,
    families: BTreeMap<String, String>,
    top_k: usize,
    min_ratio: f64,
}

impl ConfusionResolver {
    /// Resolver built from the embedded pair table
    pub fn embedded() -> &'static ConfusionResolver {
        EMBEDDED.get_or_init(|| {
            match Self::from_toml(include_str!("../configs/confusion.toml")) {
                Ok(resolver) => resolver,
                Err(e) => {
                    tracing::warn!("failed to load embedded confusion table: {e}");
                    Self::empty()
                }
            }
        })
    }

    /// Resolver without any pairs
    pub fn empty() -> Self {
        Self {
            pairs: Vec::new(),
            families: BTreeMap::new(),
            top_k: default_top_k(),
            min_ratio: default_min_ratio(),
        }
    }

    /// Parse a pair table
    pub fn from_toml(source: &str) -> Result<Self> {
        let file: ConfusionFile = toml::from_str(source)?;

        if file.top_k < 2 {
            return Err(Error::Configuration(
                "confusion top_k must be at least 2".into(),
            ));
        }
        if !(0.0..=1.0).contains(&file.min_ratio) {
            return Err(Error::Configuration(
                "confusion min_ratio must be within [0, 1]".into(),
            ));
        }

        let mut pairs = Vec::with_capacity(file.pairs.len());
        let mut seen = BTreeSet::new();
        for entry in file.pairs {
            let a = normalize_lang_tag(&entry.languages[0]);
            let b = normalize_lang_tag(&entry.languages[1]);
            if a == b {
                return Err(Error::Configuration(format!(
                    "confusion pair '{a}/{b}' repeats a language"
                )));
            }
            if !seen.insert(pair_key(&a, &b)) {
                return Err(Error::Configuration(format!(
                    "confusion pair '{a}/{b}' is listed twice"
                )));
            }

            let mut checks = Vec::with_capacity(entry.checks.len());
            for check in entry.checks {
                let favors = normalize_lang_tag(&check.favors);
                if favors != a && favors != b {
                    return Err(Error::Configuration(format!(
                        "check favours '{favors}', which is not in pair '{a}/{b}'"
                    )));
                }
                let delta = check.delta.unwrap_or(file.default_delta);
                if !(delta > 0.0 && delta <= MAX_DELTA) {
                    return Err(Error::Configuration(format!(
                        "check delta {delta} for '{a}/{b}' is outside (0, {MAX_DELTA}]"
                    )));
                }
                let values = check
                    .values
                    .iter()
                    .map(|v| match check.kind {
                        FeatureKind::Substrings => normalize_text(v),
                        _ => normalize_word(v),
                    })
                    .filter(|v| !v.is_empty())
                    .collect();
                checks.push(FeatureCheck {
                    favors,
                    kind: check.kind,
                    values,
                    delta,
                });
            }
            pairs.push(ConfusionPair {
                languages: [a, b],
                checks,
            });
        }

        let mut families = BTreeMap::new();
        for (family, langs) in file.families {
            for lang in langs {
                families.insert(normalize_lang_tag(&lang), family.clone());
            }
        }

        Ok(Self {
            pairs,
            families,
            top_k: file.top_k,
            min_ratio: file.min_ratio,
        })
    }

    /// Override how many top languages are inspected
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(2);
        self
    }

    /// Registered pairs
    pub fn pairs(&self) -> &[ConfusionPair] {
        &self.pairs
    }

    /// Pair containing both languages, if any
    pub fn pair(&self, a: &str, b: &str) -> Option<&ConfusionPair> {
        let key = pair_key(a, b);
        self.pairs.iter().find(|p| p.key() == key)
    }

    /// Whether two languages form a known confusion pair
    pub fn is_confusable(&self, a: &str, b: &str) -> bool {
        self.pair(a, b).is_some()
    }

    /// Word features of a pair split by the member they favour
    pub fn discriminating_words(&self, a: &str, b: &str) -> Option<(Vec<&str>, Vec<&str>)> {
        let pair = self.pair(a, b)?;
        let collect = |lang: &str| {
            pair.checks
                .iter()
                .filter(|c| c.favors == lang && c.kind == FeatureKind::Words)
                .flat_map(|c| c.values.iter().map(String::as_str))
                .collect::<Vec<_>>()
        };
        Some((collect(a), collect(b)))
    }

    /// Language family name
    pub fn family(&self, lang: &str) -> Option<&str> {
        self.families.get(lang).map(String::as_str)
    }

    /// Whether two languages share a family
    pub fn are_related(&self, a: &str, b: &str) -> bool {
        match (self.family(a), self.family(b)) {
            (Some(fa), Some(fb)) => fa == fb,
            _ => false,
        }
    }

    /// Other members of a language's family
    pub fn related_languages(&self, lang: &str) -> Vec<&str> {
        let Some(family) = self.family(lang) else {
            return Vec::new();
        };
        self.families
            .iter()
            .filter(|(l, f)| f.as_str() == family && l.as_str() != lang)
            .map(|(l, _)| l.as_str())
            .collect()
    }

    /// Coarse similarity: 1.0 identical, 0.9 confusion pair, 0.6 same family, else 0.0
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            1.0
        } else if self.is_confusable(a, b) {
            0.9
        } else if self.are_related(a, b) {
            0.6
        } else {
            0.0
        }
    }

    /// Adjust `table` in place for every eligible pair.
    ///
    /// A pair is eligible when both members are among the top-K languages,
    /// the weaker member scores at least `min_ratio` of the stronger, and the
    /// pair has not been resolved against this table before. Returns the
    /// number of checks that fired.
    pub fn resolve(&self, text: &str, table: &mut ScoreTable) -> usize {
        if self.pairs.is_empty() || table.len() < 2 {
            return 0;
        }

        let top = table.top_k(self.top_k);
        let lowered = normalize_text(text);
        let words: BTreeSet<String> = tokenize(text)
            .iter()
            .map(|t| normalize_word(t.text))
            .collect();

        let mut fired = 0;
        for pair in &self.pairs {
            let key = pair.key();
            let (a, b) = pair.languages();
            let in_top = |lang: &str| top.iter().any(|t| t == lang);
            if table.is_resolved(&key) || !(in_top(a) && in_top(b)) {
                continue;
            }

            let (sa, sb) = (table.get(a), table.get(b));
            let (weak, strong) = if sa < sb { (sa, sb) } else { (sb, sa) };
            if strong <= 0.0 || weak < self.min_ratio * strong {
                continue;
            }

            table.mark_resolved(key);
            let combined = sa + sb;
            for check in pair.checks.iter().filter(|c| c.fires(&lowered, &words)) {
                let shift = check.delta * combined;
                table.add(&check.favors, shift);
                table.add(pair.other(&check.favors), -shift);
                fired += 1;
                tracing::debug!(
                    "confusion check for {} fired towards {} ({:+.3})",
                    pair.key(),
                    check.favors,
                    shift
                );
            }
        }
        fired
    }
}
