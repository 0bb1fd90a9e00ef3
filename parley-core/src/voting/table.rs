//! Per-language score table produced by voting

use crate::types::clamp_unit;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Relative margin under which the top two languages are considered tied
pub const TIE_MARGIN: f64 = 0.01;

/// Aggregate scores per language.
///
/// Besides the scores the table carries the summed reliability of backends
/// whose top pick was each language (used to break ties), and the keys of
/// confusion pairs already resolved against it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreTable {
    scores: BTreeMap<String, f64>,
    #[serde(default)]
    support: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    resolved: BTreeSet<String>,
}

impl ScoreTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table from raw scores, clamped to [0, 1]
    pub fn from_scores<I, S>(scores: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for (lang, score) in scores {
            table.set(lang, score);
        }
        table
    }

    /// Set a language's score
    pub fn set(&mut self, language: impl Into<String>, score: f64) {
        self.scores.insert(language.into(), clamp_unit(score));
    }

    /// Add to a language's score; the result is clamped to [0, 1]
    pub fn add(&mut self, language: &str, delta: f64) {
        let entry = self.scores.entry(language.to_string()).or_insert(0.0);
        *entry = clamp_unit(*entry + delta);
    }

    /// Score of a language, zero when absent
    pub fn get(&self, language: &str) -> f64 {
        self.scores.get(language).copied().unwrap_or(0.0)
    }

    /// Record backend reliability behind a language
    pub fn add_support(&mut self, language: &str, reliability: f64) {
        *self.support.entry(language.to_string()).or_insert(0.0) += reliability;
    }

    /// Summed reliability of backends whose top pick was `language`
    pub fn support(&self, language: &str) -> f64 {
        self.support.get(language).copied().unwrap_or(0.0)
    }

    /// All scores keyed by language
    pub fn scores(&self) -> &BTreeMap<String, f64> {
        &self.scores
    }

    /// Number of scored languages
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether nothing was scored
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Sum of all scores
    pub fn total(&self) -> f64 {
        self.scores.values().sum()
    }

    /// Keep only languages accepted by `keep`
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.scores.retain(|lang, _| keep(lang));
        self.support.retain(|lang, _| keep(lang));
    }

    /// Mark a confusion pair as handled
    pub fn mark_resolved(&mut self, key: impl Into<String>) {
        self.resolved.insert(key.into());
    }

    /// Whether a confusion pair was already handled
    pub fn is_resolved(&self, key: &str) -> bool {
        self.resolved.contains(key)
    }

    /// Languages ranked best first.
    ///
    /// Scores sort descending. When the runner-up is within [`TIE_MARGIN`]
    /// of the leader, the near-tied group is ordered by backend support and
    /// then by language code.
    pub fn ranked(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .scores
            .iter()
            .filter(|(_, score)| **score > 0.0)
            .map(|(lang, score)| (lang.clone(), *score))
            .collect();

        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        if ranked.len() >= 2 {
            let lead = ranked[0].1;
            let tied = ranked
                .iter()
                .take_while(|(_, score)| lead - score < TIE_MARGIN * lead)
                .count();
            if tied >= 2 {
                ranked[..tied].sort_by(|a, b| {
                    self.support(&b.0)
                        .partial_cmp(&self.support(&a.0))
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| a.0.cmp(&b.0))
                });
            }
        }

        ranked
    }

    /// Winning language and its score
    pub fn winner(&self) -> Option<(String, f64)> {
        self.ranked().into_iter().next()
    }

    /// The `k` best languages
    pub fn top_k(&self, k: usize) -> Vec<String> {
        self.ranked().into_iter().take(k).map(|(lang, _)| lang).collect()
    }

    /// Convex mix with a prior: `(s + w·p) / (1 + w)` for every language in either
    pub fn blend(&self, prior: &BTreeMap<String, f64>, weight: f64) -> ScoreTable {
        if prior.is_empty() || weight <= 0.0 {
            return self.clone();
        }
        let mut blended = self.clone();
        let langs: BTreeSet<&String> = self.scores.keys().chain(prior.keys()).collect();
        for lang in langs {
            let s = self.get(lang);
            let p = prior.get(lang).copied().unwrap_or(0.0);
            blended.set(lang.clone(), (s + weight * p) / (1.0 + weight));
        }
        blended
    }
}
