//! Conversation context tracking
//!
//! A [`ConversationContext`] remembers the languages of the last few turns
//! of a conversation and turns them into a decayed prior. Short, ambiguous
//! messages ("ok", "si", "bien") lean on this prior when backends disagree.
//!
//! The context is shared between detection calls, so every mutation happens
//! under a single write lock: readers never see a half-appended turn.

mod store;

pub use store::{ContextStore, MemoryContextStore};

use crate::error::{Error, Result};
use crate::normalize::normalize_lang_tag;
use crate::types::{clamp_unit, is_determined};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default number of remembered turns
pub const DEFAULT_MAX_TURNS: usize = 2;

/// Default per-turn decay factor
pub const DEFAULT_DECAY: f64 = 0.9;

/// One remembered detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Detected language code
    pub language: String,
    /// Detection confidence
    pub confidence: f64,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Message text, when the caller recorded it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Turn {
    /// Turn stamped with the current time
    pub fn new(language: &str, confidence: f64) -> Self {
        Self {
            language: normalize_lang_tag(language),
            confidence: clamp_unit(confidence),
            timestamp: now(),
            text: None,
        }
    }

    /// Attach the message text
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Serializable form of a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Turns, oldest first
    pub turns: Vec<Turn>,
    /// Decay factor
    pub decay: f64,
    /// Turn cap
    pub max_turns: usize,
}

#[derive(Debug, Clone)]
struct ContextState {
    turns: VecDeque<Turn>,
    max_turns: usize,
    decay: f64,
}

impl ContextState {
    fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// Turns paired with their age, newest first
    fn aged(&self) -> impl Iterator<Item = (usize, &Turn)> + '_ {
        self.turns.iter().rev().enumerate()
    }
}

/// Bounded, decaying history of detected languages
#[derive(Debug)]
pub struct ConversationContext {
    state: RwLock<ContextState>,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ConversationContext {
    fn clone(&self) -> Self {
        Self {
            state: RwLock::new(self.read().clone()),
        }
    }
}

impl ConversationContext {
    /// Context with default cap and decay
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ContextState {
                turns: VecDeque::with_capacity(DEFAULT_MAX_TURNS),
                max_turns: DEFAULT_MAX_TURNS,
                decay: DEFAULT_DECAY,
            }),
        }
    }

    /// Context with explicit parameters.
    ///
    /// `max_turns` must be at least 1 and `decay` within (0, 1).
    pub fn with_params(max_turns: usize, decay: f64) -> Result<Self> {
        validate_params(max_turns, decay)?;
        Ok(Self {
            state: RwLock::new(ContextState {
                turns: VecDeque::with_capacity(max_turns),
                max_turns,
                decay,
            }),
        })
    }

    /// Context seeded from `(language, confidence)` pairs, oldest first
    pub fn from_history<I, S>(history: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let history: Vec<(S, f64)> = history.into_iter().collect();
        let context = Self::new();
        {
            let mut state = context.write();
            state.max_turns = state.max_turns.max(history.len());
            for (lang, confidence) in &history {
                let turn = Turn::new(lang.as_ref(), *confidence);
                if is_determined(&turn.language) {
                    state.push(turn);
                }
            }
        }
        context
    }

    fn read(&self) -> RwLockReadGuard<'_, ContextState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ContextState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a turn; undetermined languages are ignored.
    ///
    /// Returns whether the turn was recorded.
    pub fn update(&self, language: &str, confidence: f64) -> bool {
        self.push_turn(Turn::new(language, confidence))
    }

    /// Append a turn together with its text
    pub fn add_turn(&self, text: &str, language: &str, confidence: f64) -> bool {
        self.push_turn(Turn::new(language, confidence).with_text(text))
    }

    /// Append a prepared turn
    pub fn push_turn(&self, turn: Turn) -> bool {
        if !is_determined(&turn.language) {
            return false;
        }
        self.write().push(turn);
        true
    }

    /// Copy of the turns, oldest first
    pub fn turns(&self) -> Vec<Turn> {
        self.read().turns.iter().cloned().collect()
    }

    /// Most recent turn
    pub fn last_turn(&self) -> Option<Turn> {
        self.read().turns.back().cloned()
    }

    /// Number of turns held
    pub fn len(&self) -> usize {
        self.read().turns.len()
    }

    /// Whether no turns are held
    pub fn is_empty(&self) -> bool {
        self.read().turns.is_empty()
    }

    /// Turn cap
    pub fn max_turns(&self) -> usize {
        self.read().max_turns
    }

    /// Decay factor
    pub fn decay(&self) -> f64 {
        self.read().decay
    }

    /// Forget every turn
    pub fn clear(&self) {
        self.write().turns.clear();
    }

    /// Decayed evidence per language: Σ confidence × decay^age
    pub fn prior(&self) -> BTreeMap<String, f64> {
        let state = self.read();
        let mut prior = BTreeMap::new();
        for (age, turn) in state.aged() {
            *prior.entry(turn.language.clone()).or_insert(0.0) +=
                turn.confidence * state.decay.powi(age as i32);
        }
        prior
    }

    /// Prior divided by Σ decay^k over the held turns, so values stay in [0, 1]
    pub fn normalized_prior(&self) -> BTreeMap<String, f64> {
        let state = self.read();
        let norm: f64 = (0..state.turns.len())
            .map(|k| state.decay.powi(k as i32))
            .sum();
        if norm <= 0.0 {
            return BTreeMap::new();
        }
        let mut prior = BTreeMap::new();
        for (age, turn) in state.aged() {
            *prior.entry(turn.language.clone()).or_insert(0.0) +=
                turn.confidence * state.decay.powi(age as i32) / norm;
        }
        prior
    }

    /// Prior rescaled to sum to 1
    pub fn language_distribution(&self) -> BTreeMap<String, f64> {
        let mut prior = self.prior();
        let total: f64 = prior.values().sum();
        if total <= 0.0 {
            return BTreeMap::new();
        }
        for weight in prior.values_mut() {
            *weight /= total;
        }
        prior
    }

    /// Language with the largest share of the distribution
    pub fn dominant_language(&self) -> Option<String> {
        self.language_distribution()
            .into_iter()
            .fold(None, |best: Option<(String, f64)>, (lang, w)| match best {
                Some((_, bw)) if bw >= w => best,
                _ => Some((lang, w)),
            })
            .map(|(lang, _)| lang)
    }

    /// Language of the latest turn and how many consecutive turns share it
    pub fn language_streak(&self) -> Option<(String, usize)> {
        let state = self.read();
        let last = state.turns.back()?;
        let streak = state
            .turns
            .iter()
            .rev()
            .take_while(|t| t.language == last.language)
            .count();
        Some((last.language.clone(), streak))
    }

    /// Serializable copy of the context
    pub fn to_snapshot(&self) -> ContextSnapshot {
        let state = self.read();
        ContextSnapshot {
            turns: state.turns.iter().cloned().collect(),
            decay: state.decay,
            max_turns: state.max_turns,
        }
    }

    /// Rebuild a context; the oldest turns are dropped if the snapshot
    /// holds more than its cap
    pub fn from_snapshot(snapshot: ContextSnapshot) -> Result<Self> {
        validate_params(snapshot.max_turns, snapshot.decay)?;
        let mut state = ContextState {
            turns: VecDeque::with_capacity(snapshot.max_turns),
            max_turns: snapshot.max_turns,
            decay: snapshot.decay,
        };
        for turn in snapshot.turns {
            if !(0.0..=1.0).contains(&turn.confidence) {
                return Err(Error::Serialization(format!(
                    "turn confidence {} is outside [0, 1]",
                    turn.confidence
                )));
            }
            if is_determined(&turn.language) {
                state.push(turn);
            }
        }
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// JSON form of [`Self::to_snapshot`]
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_snapshot())?)
    }

    /// Rebuild from [`Self::to_json`] output
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: ContextSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }
}

fn validate_params(max_turns: usize, decay: f64) -> Result<()> {
    if max_turns == 0 {
        return Err(Error::Configuration("max_turns must be at least 1".into()));
    }
    if !(decay > 0.0 && decay < 1.0) {
        return Err(Error::Configuration(format!(
            "decay factor {decay} must be within (0, 1)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_evicts_oldest() {
        let ctx = ConversationContext::with_params(2, 0.9).unwrap();
        ctx.update("en", 0.9);
        ctx.update("fr", 0.8);
        ctx.update("de", 0.7);
        let langs: Vec<String> = ctx.turns().into_iter().map(|t| t.language).collect();
        assert_eq!(langs, vec!["fr", "de"]);
    }

    #[test]
    fn test_undetermined_ignored() {
        let ctx = ConversationContext::new();
        assert!(!ctx.update("und", 0.9));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_prior_decays_with_age() {
        let ctx = ConversationContext::with_params(5, 0.5).unwrap();
        ctx.update("fr", 1.0);
        ctx.update("es", 1.0);
        let prior = ctx.prior();
        assert_eq!(prior["es"], 1.0);
        assert_eq!(prior["fr"], 0.5);

        let normalized = ctx.normalized_prior();
        assert!((normalized["es"] - 1.0 / 1.5).abs() < 1e-12);
        assert!(normalized.values().sum::<f64>() <= 1.0 + 1e-12);
    }

    #[test]
    fn test_empty_context_has_no_prior() {
        let ctx = ConversationContext::new();
        assert!(ctx.prior().is_empty());
        assert!(ctx.normalized_prior().is_empty());
        assert_eq!(ctx.dominant_language(), None);
    }

    #[test]
    fn test_streak_and_dominant_language() {
        let ctx = ConversationContext::with_params(10, 0.9).unwrap();
        ctx.update("es", 0.9);
        ctx.update("fr", 0.9);
        ctx.update("fr", 0.9);
        assert_eq!(ctx.language_streak(), Some(("fr".to_string(), 2)));
        assert_eq!(ctx.dominant_language().as_deref(), Some("fr"));
    }

    #[test]
    fn test_from_history() {
        let ctx = ConversationContext::from_history([("fr", 0.95), ("fr", 0.9), ("en", 0.5)]);
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx.dominant_language().as_deref(), Some("fr"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let ctx = ConversationContext::with_params(3, 0.75).unwrap();
        ctx.add_turn("Bonjour!", "fr", 0.95);
        ctx.update("fr", 0.6);

        let json = ctx.to_json().unwrap();
        let restored = ConversationContext::from_json(&json).unwrap();
        assert_eq!(restored.to_snapshot(), ctx.to_snapshot());
        assert_eq!(restored.max_turns(), 3);
        assert_eq!(restored.decay(), 0.75);
        assert_eq!(restored.last_turn().unwrap().confidence, 0.6);
    }

    #[test]
    fn test_invalid_params() {
        assert!(ConversationContext::with_params(0, 0.9).is_err());
        assert!(ConversationContext::with_params(2, 1.0).is_err());
        assert!(ConversationContext::with_params(2, 0.0).is_err());
        assert!(matches!(
            ConversationContext::from_json("{not json"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_clear() {
        let ctx = ConversationContext::new();
        ctx.update("en", 0.9);
        ctx.clear();
        assert!(ctx.is_empty());
        assert!(ctx.last_turn().is_none());
    }
}
