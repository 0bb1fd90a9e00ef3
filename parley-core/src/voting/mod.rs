//! Voting strategies combining backend ballots into a score table
//!
//! Every built-in strategy is normalized so that each backend contributes
//! at most its share of the total; scores therefore stay within [0, 1].

mod table;

pub use table::{ScoreTable, TIE_MARGIN};

use crate::error::{Error, Result};
use crate::normalize::normalize_lang_tag;
use crate::types::{is_determined, BackendResult, Reason};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

/// Default agreement threshold for a bare "consensus" strategy name
pub const DEFAULT_CONSENSUS: usize = 2;

/// One backend's vote
#[derive(Debug, Clone, PartialEq)]
pub struct Ballot {
    /// Backend output
    pub result: BackendResult,
    /// Static backend reliability, 1 to 5
    pub reliability: u8,
    /// Caller override replacing the reliability-derived weight
    pub weight: Option<f64>,
}

impl Ballot {
    /// Ballot weighted by reliability
    pub fn new(result: BackendResult, reliability: u8) -> Self {
        Self {
            result,
            reliability,
            weight: None,
        }
    }

    /// Replace the derived weight
    pub fn with_weight(mut self, weight: Option<f64>) -> Self {
        self.weight = weight.filter(|w| w.is_finite() && *w >= 0.0);
        self
    }

    /// Weight used by the weighted strategy: the override, else reliability squared
    pub fn weighted(&self) -> f64 {
        self.weight
            .unwrap_or_else(|| f64::from(self.reliability).powi(2))
    }

    /// Weight used by hard and soft voting: the override, else 1
    pub fn unit(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }

    fn votes(&self) -> bool {
        self.result.is_determined()
    }
}

/// Signature of user-supplied strategies
pub type StrategyFn = dyn Fn(&[Ballot]) -> BTreeMap<String, f64> + Send + Sync;

/// A named user-supplied strategy
#[derive(Clone)]
pub struct CustomStrategy {
    name: String,
    func: Arc<StrategyFn>,
}

impl CustomStrategy {
    /// Wrap a function as a strategy
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Ballot]) -> BTreeMap<String, f64> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Strategy name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomStrategy")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CustomStrategy {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// How ballots are combined
#[derive(Debug, Clone, Default, PartialEq)]
pub enum VotingStrategy {
    /// Reliability-squared weighted confidence
    #[default]
    Weighted,
    /// One vote per backend for its top language
    Hard,
    /// Mean of the backends' probability distributions
    Soft,
    /// Only languages picked by at least N backends are eligible
    Consensus(usize),
    /// User-supplied
    Custom(CustomStrategy),
}

impl VotingStrategy {
    /// Strategy name as accepted by [`FromStr`]
    pub fn name(&self) -> String {
        match self {
            VotingStrategy::Weighted => "weighted".to_string(),
            VotingStrategy::Hard => "hard".to_string(),
            VotingStrategy::Soft => "soft".to_string(),
            VotingStrategy::Consensus(n) => format!("consensus({n})"),
            VotingStrategy::Custom(custom) => custom.name().to_string(),
        }
    }
}

impl fmt::Display for VotingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for VotingStrategy {
    type Err = Error;

    /// Parses the built-in names; custom strategies resolve through a [`StrategyRegistry`]
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "weighted" => return Ok(VotingStrategy::Weighted),
            "hard" => return Ok(VotingStrategy::Hard),
            "soft" => return Ok(VotingStrategy::Soft),
            "consensus" => return Ok(VotingStrategy::Consensus(DEFAULT_CONSENSUS)),
            _ => {}
        }

        let threshold = name
            .strip_prefix("consensus(")
            .and_then(|rest| rest.strip_suffix(')'))
            .or_else(|| name.strip_prefix("consensus:"));

        match threshold {
            Some(n) => match n.trim().parse::<usize>() {
                Ok(n) if n >= 1 => Ok(VotingStrategy::Consensus(n)),
                _ => Err(Error::Configuration(format!(
                    "invalid consensus threshold in '{s}'"
                ))),
            },
            None => Err(Error::Configuration(format!(
                "unknown voting strategy '{s}'"
            ))),
        }
    }
}

/// Names of the built-in strategies
pub const BUILTIN_STRATEGIES: [&str; 4] = ["weighted", "hard", "soft", "consensus(N)"];

/// Registry of named custom strategies
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    custom: RwLock<BTreeMap<String, CustomStrategy>>,
}

impl StrategyRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom strategy; names must be unique and not shadow built-ins
    pub fn register<F>(&self, name: &str, func: F) -> Result<()>
    where
        F: Fn(&[Ballot]) -> BTreeMap<String, f64> + Send + Sync + 'static,
    {
        self.add(CustomStrategy::new(name, func))
    }

    /// Register an already wrapped strategy
    pub fn add(&self, strategy: CustomStrategy) -> Result<()> {
        let key = strategy.name.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(Error::Configuration("strategy name is empty".into()));
        }
        if key.parse::<VotingStrategy>().is_ok() {
            return Err(Error::Configuration(format!(
                "strategy '{}' shadows a built-in strategy",
                strategy.name
            )));
        }

        let mut custom = self
            .custom
            .write()
            .map_err(|_| Error::Configuration("strategy registry lock poisoned".into()))?;
        if custom.contains_key(&key) {
            return Err(Error::Configuration(format!(
                "strategy '{}' is already registered",
                strategy.name
            )));
        }
        custom.insert(
            key.clone(),
            CustomStrategy {
                name: key,
                func: strategy.func,
            },
        );
        Ok(())
    }

    /// Resolve a built-in or registered strategy by name
    pub fn resolve(&self, name: &str) -> Result<VotingStrategy> {
        if let Ok(strategy) = name.parse::<VotingStrategy>() {
            return Ok(strategy);
        }
        let key = name.trim().to_ascii_lowercase();
        self.custom
            .read()
            .ok()
            .and_then(|custom| custom.get(&key).cloned())
            .map(VotingStrategy::Custom)
            .ok_or_else(|| Error::Configuration(format!("unknown voting strategy '{name}'")))
    }

    /// Registered custom strategy names
    pub fn names(&self) -> Vec<String> {
        self.custom
            .read()
            .map(|custom| custom.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Result of a vote
#[derive(Debug, Clone, PartialEq)]
pub struct VoteOutcome {
    /// Aggregated scores
    pub table: ScoreTable,
    /// Set when the strategy declines to pick any language
    pub abstain: Option<Reason>,
}

impl VoteOutcome {
    fn decided(table: ScoreTable) -> Self {
        Self {
            table,
            abstain: None,
        }
    }

    fn abstained(table: ScoreTable, reason: Reason) -> Self {
        Self {
            table,
            abstain: Some(reason),
        }
    }
}

/// Combine ballots with a strategy.
///
/// Ballots whose result is undetermined cast no vote. With no voting
/// ballots at all the outcome abstains with [`Reason::NoEvidence`].
pub fn vote(strategy: &VotingStrategy, ballots: &[Ballot]) -> VoteOutcome {
    let voters: Vec<&Ballot> = ballots.iter().filter(|b| b.votes()).collect();

    let mut table = ScoreTable::new();
    for ballot in &voters {
        table.add_support(ballot.result.language(), f64::from(ballot.reliability));
    }

    if voters.is_empty() {
        return VoteOutcome::abstained(table, Reason::NoEvidence);
    }

    match strategy {
        VotingStrategy::Weighted => {
            weighted_into(&mut table, &voters, |_| true);
            VoteOutcome::decided(table)
        }
        VotingStrategy::Hard => {
            let total: f64 = voters.iter().map(|b| b.unit()).sum();
            let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
            for ballot in &voters {
                *sums.entry(ballot.result.language()).or_insert(0.0) += ballot.unit();
            }
            for (lang, sum) in sums {
                table.set(lang, ratio(sum, total));
            }
            VoteOutcome::decided(table)
        }
        VotingStrategy::Soft => {
            let total: f64 = voters.iter().map(|b| b.unit()).sum();
            let mut sums: BTreeMap<String, f64> = BTreeMap::new();
            for ballot in &voters {
                let w = ballot.unit();
                match ballot.result.distribution().filter(|d| !d.is_empty()) {
                    Some(dist) => {
                        for (lang, p) in dist {
                            *sums.entry(lang.clone()).or_insert(0.0) += w * p;
                        }
                    }
                    None => {
                        *sums
                            .entry(ballot.result.language().to_string())
                            .or_insert(0.0) += w * ballot.result.confidence();
                    }
                }
            }
            for (lang, sum) in sums {
                table.set(lang, ratio(sum, total));
            }
            VoteOutcome::decided(table)
        }
        VotingStrategy::Consensus(threshold) => {
            let mut picks: BTreeMap<&str, usize> = BTreeMap::new();
            for ballot in &voters {
                *picks.entry(ballot.result.language()).or_insert(0) += 1;
            }
            let eligible: Vec<&str> = picks
                .iter()
                .filter(|(_, count)| **count >= *threshold)
                .map(|(lang, _)| *lang)
                .collect();

            if eligible.is_empty() {
                return VoteOutcome::abstained(table, Reason::InsufficientConsensus);
            }
            weighted_into(&mut table, &voters, |lang| eligible.contains(&lang));
            VoteOutcome::decided(table)
        }
        VotingStrategy::Custom(custom) => {
            let scores = (custom.func)(ballots);
            for (lang, score) in scores {
                let lang = normalize_lang_tag(&lang);
                if is_determined(&lang) {
                    table.set(lang, score);
                }
            }
            if table.is_empty() {
                VoteOutcome::abstained(table, Reason::NoEvidence)
            } else {
                VoteOutcome::decided(table)
            }
        }
    }
}

/// Weighted voting restricted to languages accepted by `eligible`;
/// the denominator always covers every voting ballot
fn weighted_into<F>(table: &mut ScoreTable, voters: &[&Ballot], eligible: F)
where
    F: Fn(&str) -> bool,
{
    let total: f64 = voters.iter().map(|b| b.weighted()).sum();
    let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
    for ballot in voters {
        let lang = ballot.result.language();
        if eligible(lang) {
            *sums.entry(lang).or_insert(0.0) += ballot.weighted() * ballot.result.confidence();
        }
    }
    for (lang, sum) in sums {
        table.set(lang, ratio(sum, total));
    }
}

fn ratio(value: f64, total: f64) -> f64 {
    if total > 0.0 {
        value / total
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(backend: &str, lang: &str, conf: f64, rel: u8) -> Ballot {
        Ballot::new(BackendResult::new(backend, lang, conf), rel)
    }

    #[test]
    fn test_weighted_unanimous() {
        let ballots = vec![
            ballot("a", "fr", 0.9, 3),
            ballot("b", "fr", 0.8, 4),
            ballot("c", "fr", 0.7, 2),
        ];
        let outcome = vote(&VotingStrategy::Weighted, &ballots);
        assert!(outcome.abstain.is_none());
        let (lang, score) = outcome.table.winner().unwrap();
        assert_eq!(lang, "fr");
        assert!(score <= 1.0);
    }

    #[test]
    fn test_reliability_squared_beats_overconfidence() {
        // 25 x 0.42 = 10.5 against 9 x 1.0 = 9
        let ballots = vec![ballot("strong", "es", 0.42, 5), ballot("weak", "pt", 1.0, 3)];
        let outcome = vote(&VotingStrategy::Weighted, &ballots);
        assert_eq!(outcome.table.winner().unwrap().0, "es");
        assert!((outcome.table.get("es") - 10.5 / 34.0).abs() < 1e-12);
        assert!((outcome.table.get("pt") - 9.0 / 34.0).abs() < 1e-12);
    }

    #[test]
    fn test_weight_override() {
        let ballots = vec![
            ballot("strong", "es", 0.42, 5).with_weight(Some(1.0)),
            ballot("weak", "pt", 1.0, 3),
        ];
        let outcome = vote(&VotingStrategy::Weighted, &ballots);
        assert_eq!(outcome.table.winner().unwrap().0, "pt");
    }

    #[test]
    fn test_hard_counts_votes() {
        let ballots = vec![
            ballot("a", "en", 0.1, 1),
            ballot("b", "en", 0.2, 1),
            ballot("c", "de", 0.99, 5),
        ];
        let outcome = vote(&VotingStrategy::Hard, &ballots);
        assert_eq!(outcome.table.winner().unwrap().0, "en");
        assert!((outcome.table.get("en") - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_hard_tie_uses_reliability() {
        let ballots = vec![ballot("a", "en", 0.9, 2), ballot("b", "de", 0.9, 5)];
        let outcome = vote(&VotingStrategy::Hard, &ballots);
        assert_eq!(outcome.table.winner().unwrap().0, "de");
    }

    #[test]
    fn test_soft_averages_distributions() {
        let a = BackendResult::new("a", "es", 0.6).with_distribution([("es", 0.6), ("pt", 0.4)]);
        let b = BackendResult::new("b", "pt", 0.7).with_distribution([("es", 0.3), ("pt", 0.7)]);
        let outcome = vote(&VotingStrategy::Soft, &[Ballot::new(a, 3), Ballot::new(b, 3)]);
        assert!((outcome.table.get("es") - 0.45).abs() < 1e-12);
        assert!((outcome.table.get("pt") - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_soft_total_stays_within_one() {
        let a = BackendResult::new("a", "es", 0.9).with_distribution([("es", 0.9), ("pt", 0.9)]);
        let b = BackendResult::new("b", "pt", 0.8).with_distribution([("pt", 0.8), ("gl", 0.7)]);
        let outcome = vote(&VotingStrategy::Soft, &[Ballot::new(a, 3), Ballot::new(b, 3)]);
        assert!(outcome.table.total() <= 1.0 + 1e-12);
    }

    #[test]
    fn test_consensus_insufficient() {
        let ballots = vec![
            ballot("a", "es", 0.9, 3),
            ballot("b", "es", 0.9, 3),
            ballot("c", "pt", 0.9, 3),
            ballot("d", "gl", 0.9, 3),
            ballot("e", "ca", 0.9, 3),
        ];
        let outcome = vote(&VotingStrategy::Consensus(3), &ballots);
        assert_eq!(outcome.abstain, Some(Reason::InsufficientConsensus));
        assert!(outcome.table.winner().is_none());
    }

    #[test]
    fn test_consensus_reached() {
        let ballots = vec![
            ballot("a", "es", 0.9, 3),
            ballot("b", "es", 0.8, 3),
            ballot("c", "pt", 0.99, 5),
        ];
        let outcome = vote(&VotingStrategy::Consensus(2), &ballots);
        assert!(outcome.abstain.is_none());
        assert_eq!(outcome.table.winner().unwrap().0, "es");
        assert_eq!(outcome.table.get("pt"), 0.0);
    }

    #[test]
    fn test_undetermined_ballots_abstain() {
        let ballots = vec![Ballot::new(BackendResult::undetermined("a"), 3)];
        let outcome = vote(&VotingStrategy::Weighted, &ballots);
        assert_eq!(outcome.abstain, Some(Reason::NoEvidence));
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("weighted".parse::<VotingStrategy>().unwrap(), VotingStrategy::Weighted);
        assert_eq!(
            "consensus".parse::<VotingStrategy>().unwrap(),
            VotingStrategy::Consensus(DEFAULT_CONSENSUS)
        );
        assert_eq!(
            "consensus(3)".parse::<VotingStrategy>().unwrap(),
            VotingStrategy::Consensus(3)
        );
        assert_eq!(
            "Consensus:4".parse::<VotingStrategy>().unwrap(),
            VotingStrategy::Consensus(4)
        );
        assert!("consensus(0)".parse::<VotingStrategy>().is_err());
        assert!("plurality".parse::<VotingStrategy>().is_err());
    }

    #[test]
    fn test_custom_strategy_registry() {
        let registry = StrategyRegistry::new();
        registry
            .register("first", |ballots: &[Ballot]| {
                ballots
                    .first()
                    .map(|b| BTreeMap::from([(b.result.language().to_string(), 1.0)]))
                    .unwrap_or_default()
            })
            .unwrap();

        assert!(registry.register("first", |_: &[Ballot]| BTreeMap::new()).is_err());
        assert!(registry.register("hard", |_: &[Ballot]| BTreeMap::new()).is_err());

        let strategy = registry.resolve("first").unwrap();
        let outcome = vote(
            &strategy,
            &[ballot("a", "it", 0.1, 1), ballot("b", "en", 0.9, 5)],
        );
        assert_eq!(outcome.table.winner().unwrap().0, "it");
        assert_eq!(registry.names(), vec!["first".to_string()]);
        assert!(registry.resolve("missing").is_err());
    }
}
