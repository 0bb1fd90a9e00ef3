//! Ensemble orchestration
//!
//! One call goes through: empty check, script short circuit, cache, backend
//! invocation (sequential or fanned out), hint injection, script filtering,
//! voting and confusion correction. The result is context-free; the
//! conversation prior is applied by the detector afterwards so cached
//! entries stay valid for every conversation.

use crate::backend::{BackendRegistry, LatencyClass, RegisteredBackend};
use crate::cache::{CacheKey, CacheStats, DetectionCache};
use crate::config::{DetectorConfig, ParallelConfig, Thresholds};
use crate::confusion::ConfusionResolver;
use crate::error::{Error, Result};
use crate::executor::{auto_select, ExecutionMode, Executor, Invocation, SequentialExecutor};
use crate::hints::HintDictionary;
use crate::normalize::{normalize_lang_tag, normalize_text};
use crate::preprocess::ProperNounFilter;
use crate::script::{classify, ScriptAnalysis};
use crate::types::{BackendResult, DetectionMode, DetectionResult, Reason};
use crate::voting::{vote, Ballot, VotingStrategy};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[cfg(feature = "parallel")]
use crate::executor::ParallelExecutor;
#[cfg(feature = "parallel")]
use std::sync::OnceLock;

/// Backend name of the synthetic hint result
pub const HINT_BACKEND: &str = "hints";
/// Reliability of the synthetic hint result
pub const HINT_RELIABILITY: u8 = 5;
/// Confidence of the synthetic hint result
pub const HINT_CONFIDENCE: f64 = 0.95;

/// Runs backends and combines their answers into one decision
pub struct Ensemble {
    registry: Arc<BackendRegistry>,
    cache: DetectionCache,
    confusion: Option<ConfusionResolver>,
    hints: RwLock<HintDictionary>,
    hint_revision: AtomicU64,
    weights: BTreeMap<String, f64>,
    thresholds: Thresholds,
    parallel: ParallelConfig,
    sequential: SequentialExecutor,
    #[cfg(feature = "parallel")]
    pool: OnceLock<Option<ParallelExecutor>>,
    filter: ProperNounFilter,
    use_script_filter: bool,
    allowed: BTreeSet<String>,
}

impl Ensemble {
    /// Build from a validated configuration
    pub fn new(config: &DetectorConfig, registry: Arc<BackendRegistry>) -> Result<Self> {
        config.validate()?;
        let confusion = config
            .confusion
            .enabled
            .then(|| ConfusionResolver::embedded().clone().with_top_k(config.confusion.top_k));

        Ok(Self {
            registry,
            cache: DetectionCache::new(config.cache_capacity),
            confusion,
            hints: RwLock::new(HintDictionary::new()),
            hint_revision: AtomicU64::new(0),
            weights: config.weights.clone(),
            thresholds: config.thresholds,
            parallel: config.parallel,
            sequential: SequentialExecutor::new(config.parallel.timeout()),
            #[cfg(feature = "parallel")]
            pool: OnceLock::new(),
            filter: ProperNounFilter::new(config.proper_nouns),
            use_script_filter: config.use_script_filter,
            allowed: config
                .allowed_languages
                .iter()
                .map(|lang| normalize_lang_tag(lang))
                .collect(),
        })
    }

    /// Backend registry in use
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Reliability thresholds
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached result
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Copy of the current hint dictionary
    pub fn hints(&self) -> HintDictionary {
        self.hints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace hints through `edit`.
    ///
    /// Every edit starts a new hint revision, so results computed against
    /// the previous dictionary are never served again, even when a detection
    /// was in flight during the edit.
    pub fn update_hints<F, T>(&self, edit: F) -> T
    where
        F: FnOnce(&mut HintDictionary) -> T,
    {
        let out = {
            let mut hints = self.hints.write().unwrap_or_else(PoisonError::into_inner);
            let out = edit(&mut hints);
            self.hint_revision.fetch_add(1, Ordering::AcqRel);
            out
        };
        self.cache.clear();
        out
    }

    fn permits(&self, language: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(language)
    }

    /// Identify the language of `text` without conversation context
    pub fn detect(
        &self,
        text: &str,
        mode: DetectionMode,
        requested: &[String],
        strategy: &VotingStrategy,
    ) -> Result<DetectionResult> {
        let normalized = normalize_text(text);
        let analysis = classify(text);
        if normalized.is_empty() {
            return Ok(DetectionResult::undetermined(
                Reason::EmptyInput,
                analysis.script,
            ));
        }

        if let Some(lang) = analysis.short_circuit().filter(|l| self.permits(l)) {
            tracing::debug!("script {} decides {lang}", analysis.script);
            return Ok(DetectionResult::certain(
                lang,
                Reason::ScriptUnambiguous,
                analysis.script,
            ));
        }

        let (active, mut failures) = self.resolve_backends(mode, requested);
        let filtered = self.filter.filter(text);
        // Scan and revision are read under one lock so the key matches the hints used
        let (hint, hint_revision) = {
            let hints = self.hints.read().unwrap_or_else(PoisonError::into_inner);
            (hints.scan(text), self.hint_revision.load(Ordering::Acquire))
        };

        let mut key = CacheKey::new(
            &normalized,
            mode,
            active.iter().map(|entry| entry.name().to_string()),
            self.registry.generation(),
        )
        .with_strategy(strategy.name())
        .with_hint_revision(hint_revision);
        if let Cow::Owned(input) = &filtered {
            key = key.with_backend_input(normalize_text(input));
        }
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let invocations = self.invoke(&filtered, &active);

        let mut ballots = Vec::with_capacity(invocations.len() + 1);
        for invocation in invocations {
            match invocation.outcome {
                Ok(result) => {
                    tracing::debug!(
                        "backend '{}' answered {} ({:.3}) in {:?}",
                        invocation.backend,
                        result.language(),
                        result.confidence(),
                        invocation.elapsed.unwrap_or_default()
                    );
                    let weight = self.weights.get(&invocation.backend).copied();
                    ballots.push(Ballot::new(result, invocation.reliability).with_weight(weight));
                }
                Err(e) => failures.push(e),
            }
        }
        for failure in &failures {
            tracing::warn!("excluding backend: {failure}");
        }

        if let Some(hint) = hint.filter(|m| m.unanimous) {
            tracing::debug!("hint words agree on {}", hint.language);
            let result = BackendResult::new(HINT_BACKEND, &hint.language, HINT_CONFIDENCE);
            ballots.push(Ballot::new(result, HINT_RELIABILITY));
        }

        if ballots.is_empty() {
            return Err(Error::Detection(if failures.is_empty() {
                "no backend is available".to_string()
            } else {
                format!("all {} backends failed", failures.len())
            }));
        }

        let result = self.decide(text, mode, &analysis, ballots, strategy);
        self.cache.put(key, result.clone());
        Ok(result)
    }

    /// Active entries for a request, plus soft failures for names that cannot run
    fn resolve_backends(
        &self,
        mode: DetectionMode,
        requested: &[String],
    ) -> (Vec<Arc<RegisteredBackend>>, Vec<Error>) {
        let mut failures = Vec::new();
        let mut active: Vec<Arc<RegisteredBackend>> = if requested.is_empty() {
            self.registry
                .snapshot()
                .into_iter()
                .filter(|entry| entry.is_available())
                .collect()
        } else {
            let names: BTreeSet<&str> = requested.iter().map(String::as_str).collect();
            names
                .into_iter()
                .filter_map(|name| match self.registry.get(name) {
                    Some(entry) if entry.is_available() => Some(entry),
                    Some(_) => {
                        failures.push(Error::BackendUnavailable {
                            name: name.to_string(),
                            reason: "availability probe failed".into(),
                        });
                        None
                    }
                    None => {
                        failures.push(Error::BackendUnavailable {
                            name: name.to_string(),
                            reason: "not registered".into(),
                        });
                        None
                    }
                })
                .collect()
        };

        if mode == DetectionMode::Short
            && active
                .iter()
                .any(|e| e.descriptor().latency() == LatencyClass::Fast)
        {
            active.retain(|e| e.descriptor().latency() == LatencyClass::Fast);
        }
        (active, failures)
    }

    fn invoke(&self, text: &str, active: &[Arc<RegisteredBackend>]) -> Vec<Invocation> {
        if active.is_empty() {
            return Vec::new();
        }
        match auto_select(
            active.len(),
            text.chars().count(),
            self.parallel.min_backends,
            self.parallel.min_chars,
        ) {
            #[cfg(feature = "parallel")]
            ExecutionMode::Parallel => match self.parallel_executor() {
                Some(pool) => pool.run(text, active),
                None => self.sequential.run(text, active),
            },
            _ => self.sequential.run(text, active),
        }
    }

    #[cfg(feature = "parallel")]
    fn parallel_executor(&self) -> Option<&ParallelExecutor> {
        self.pool
            .get_or_init(|| {
                match ParallelExecutor::new(self.parallel.max_workers, self.parallel.timeout()) {
                    Ok(pool) => Some(pool),
                    Err(e) => {
                        tracing::warn!("falling back to sequential invocation: {e}");
                        None
                    }
                }
            })
            .as_ref()
    }

    fn decide(
        &self,
        text: &str,
        mode: DetectionMode,
        analysis: &ScriptAnalysis,
        mut ballots: Vec<Ballot>,
        strategy: &VotingStrategy,
    ) -> DetectionResult {
        // Votes the script or the allow-list rule out are withdrawn
        for ballot in &mut ballots {
            let lang = ballot.result.language();
            let script_ok = !self.use_script_filter || analysis.allows(lang);
            if ballot.result.is_determined() && !(script_ok && self.permits(lang)) {
                tracing::debug!(
                    "dropping vote of '{}' for {lang} under script {}",
                    ballot.result.backend(),
                    analysis.script
                );
                ballot.result = BackendResult::undetermined(ballot.result.backend());
            }
        }

        let voters: Vec<String> = ballots
            .iter()
            .filter(|b| b.result.is_determined())
            .map(|b| b.result.backend().to_string())
            .collect();

        let outcome = vote(strategy, &ballots);
        let mut table = outcome.table;
        table.retain(|lang| {
            self.permits(lang) && (!self.use_script_filter || analysis.allows(lang))
        });

        if let Some(reason) = outcome.abstain {
            let mut result = DetectionResult::undetermined(reason, analysis.script);
            result.scores = Some(table);
            result.backends = voters;
            return result;
        }

        if let Some(resolver) = &self.confusion {
            resolver.resolve(text, &mut table);
        }

        let Some((language, score)) = table.winner() else {
            let mut result = DetectionResult::undetermined(Reason::NoEvidence, analysis.script);
            result.backends = voters;
            return result;
        };

        let reason = if voters.iter().all(|b| b == HINT_BACKEND) {
            Reason::HintMatch
        } else {
            Reason::Ensemble
        };
        let confidence = score.clamp(0.0, 1.0);
        DetectionResult {
            language,
            confidence,
            reliable: confidence >= self.thresholds.for_mode(mode),
            reason,
            script: analysis.script,
            scores: Some(table),
            backends: voters,
        }
    }
}

impl std::fmt::Debug for Ensemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ensemble")
            .field("backends", &self.registry.list_registered())
            .field("cache", &self.cache)
            .field("use_script_filter", &self.use_script_filter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, BackendDescriptor};
    use crate::preprocess::ProperNounStrategy;
    use crate::script::Script;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        language: &'static str,
        confidence: f64,
        calls: Arc<AtomicUsize>,
    }

    impl Backend for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn detect(&self, _text: &str) -> Result<BackendResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(BackendResult::new(self.name, self.language, self.confidence))
        }
    }

    struct Broken;

    impl Backend for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn detect(&self, _text: &str) -> Result<BackendResult> {
            Err(Error::backend("broken", "model crashed"))
        }
    }

    fn fixed(name: &'static str, language: &'static str, confidence: f64) -> Fixed {
        Fixed {
            name,
            language,
            confidence,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn ensemble(backends: Vec<(Arc<dyn Backend>, u8)>) -> Ensemble {
        let registry = Arc::new(BackendRegistry::new());
        for (backend, reliability) in backends {
            registry
                .register(BackendDescriptor::from_backend(backend).with_reliability(reliability))
                .unwrap();
        }
        Ensemble::new(&DetectorConfig::default(), registry).unwrap()
    }

    /// Answers Italian when it sees "maria", Spanish otherwise
    struct NameSensitive;

    impl Backend for NameSensitive {
        fn name(&self) -> &str {
            "names"
        }

        fn detect(&self, text: &str) -> Result<BackendResult> {
            let lang = if text.contains("maria") { "it" } else { "es" };
            Ok(BackendResult::new("names", lang, 0.9))
        }
    }

    fn run(ensemble: &Ensemble, text: &str) -> Result<DetectionResult> {
        ensemble.detect(text, DetectionMode::Default, &[], &VotingStrategy::Weighted)
    }

    #[test]
    fn test_empty_input() {
        let e = ensemble(vec![(Arc::new(fixed("a", "en", 0.9)), 3)]);
        let result = run(&e, "   \n").unwrap();
        assert_eq!(result.language, "und");
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.reason, Reason::EmptyInput);
    }

    #[test]
    fn test_script_short_circuit_skips_backends() {
        let backend = fixed("a", "en", 0.9);
        let calls = Arc::clone(&backend.calls);
        let e = ensemble(vec![(Arc::new(backend), 3)]);
        let result = run(&e, "안녕하세요").unwrap();
        assert_eq!(result.language, "ko");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.reason, Reason::ScriptUnambiguous);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unanimous_weighted() {
        let e = ensemble(vec![
            (Arc::new(fixed("a", "fr", 0.8)), 3),
            (Arc::new(fixed("b", "fr", 0.6)), 3),
        ]);
        let result = run(&e, "quelque chose").unwrap();
        assert_eq!(result.language, "fr");
        assert!((result.confidence - 0.7).abs() < 1e-9);
        assert_eq!(result.reason, Reason::Ensemble);
        assert_eq!(result.backends, vec!["a", "b"]);
    }

    #[test]
    fn test_soft_failure_excluded() {
        let e = ensemble(vec![
            (Arc::new(fixed("a", "de", 0.9)), 3),
            (Arc::new(Broken), 5),
        ]);
        let result = run(&e, "irgendwas").unwrap();
        assert_eq!(result.language, "de");
        assert_eq!(result.backends, vec!["a"]);
    }

    #[test]
    fn test_total_failure_is_error() {
        let e = ensemble(vec![(Arc::new(Broken), 3)]);
        assert!(matches!(run(&e, "anything"), Err(Error::Detection(_))));
    }

    #[test]
    fn test_unknown_requested_backend_is_soft() {
        let e = ensemble(vec![(Arc::new(fixed("a", "nl", 0.7)), 3)]);
        let result = e
            .detect(
                "iets",
                DetectionMode::Default,
                &["a".to_string(), "missing".to_string()],
                &VotingStrategy::Weighted,
            )
            .unwrap();
        assert_eq!(result.language, "nl");

        let only_missing = e.detect(
            "iets",
            DetectionMode::Default,
            &["missing".to_string()],
            &VotingStrategy::Weighted,
        );
        assert!(matches!(only_missing, Err(Error::Detection(_))));
    }

    #[test]
    fn test_cache_hit_skips_backends() {
        let backend = fixed("a", "it", 0.9);
        let calls = Arc::clone(&backend.calls);
        let e = ensemble(vec![(Arc::new(backend), 3)]);
        let first = run(&e, "ciao a tutti").unwrap();
        let second = run(&e, "Ciao  a tutti").unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(e.cache_stats().hits, 1);
    }

    #[test]
    fn test_registry_change_invalidates_cache() {
        let backend = fixed("a", "it", 0.9);
        let calls = Arc::clone(&backend.calls);
        let e = ensemble(vec![(Arc::new(backend), 3)]);
        run(&e, "ciao").unwrap();
        e.registry()
            .register(BackendDescriptor::from_backend(Arc::new(fixed("b", "it", 0.5))))
            .unwrap();
        e.registry().unregister("b");
        run(&e, "ciao").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_hint_injection() {
        let e = ensemble(vec![(Arc::new(fixed("a", "en", 0.4)), 2)]);
        e.update_hints(|hints| hints.add("merci", "fr")).unwrap();
        let result = run(&e, "merci").unwrap();
        assert_eq!(result.language, "fr");
        assert!(result.backends.contains(&HINT_BACKEND.to_string()));
    }

    #[test]
    fn test_update_beats_result_stored_by_in_flight_detection() {
        let e = ensemble(vec![(Arc::new(fixed("a", "en", 0.4)), 2)]);
        let stale_key = CacheKey::new(
            &normalize_text("merci"),
            DetectionMode::Default,
            ["a"],
            e.registry().generation(),
        )
        .with_strategy(VotingStrategy::Weighted.name())
        .with_hint_revision(0);

        e.update_hints(|hints| hints.add("merci", "fr")).unwrap();
        // A detection that started before the edit stores its result late
        e.cache.put(
            stale_key,
            DetectionResult::certain("en", Reason::Ensemble, Script::Latin),
        );

        assert_eq!(run(&e, "merci").unwrap().language, "fr");
    }

    #[test]
    fn test_cache_respects_proper_noun_filter() {
        for strategy in [ProperNounStrategy::Remove, ProperNounStrategy::Mask] {
            let registry = Arc::new(BackendRegistry::new());
            registry
                .register(BackendDescriptor::from_backend(Arc::new(NameSensitive)))
                .unwrap();
            let config = DetectorConfig {
                proper_nouns: strategy,
                ..DetectorConfig::default()
            };
            let e = Ensemble::new(&config, registry).unwrap();

            // The name is filtered out before the backend sees it
            assert_eq!(run(&e, "Hola Maria").unwrap().language, "es");
            // Lowercase, the word is kept and reaches the backend
            assert_eq!(run(&e, "hola maria").unwrap().language, "it");
        }
    }

    #[test]
    fn test_script_filter_drops_incompatible_votes() {
        let e = ensemble(vec![
            (Arc::new(fixed("a", "en", 0.9)), 3),
            (Arc::new(fixed("b", "ru", 0.6)), 3),
        ]);
        let result = run(&e, "привет как дела").unwrap();
        assert_eq!(result.language, "ru");
        assert_eq!(result.script, Script::Cyrillic);
    }

    #[test]
    fn test_consensus_failure() {
        let e = ensemble(vec![
            (Arc::new(fixed("a", "en", 0.9)), 3),
            (Arc::new(fixed("b", "fr", 0.9)), 3),
            (Arc::new(fixed("c", "de", 0.9)), 3),
        ]);
        let result = e
            .detect(
                "something",
                DetectionMode::Default,
                &[],
                &VotingStrategy::Consensus(2),
            )
            .unwrap();
        assert_eq!(result.language, "und");
        assert_eq!(result.reason, Reason::InsufficientConsensus);
    }
}
