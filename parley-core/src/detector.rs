//! Public detection entry point
//!
//! [`LanguageDetector`] wraps an [`Ensemble`] with the per-call options a
//! chat application needs: a conversation context whose prior is blended
//! into the scores, automatic context updates, detection modes and
//! code-switch analysis.

use crate::backend::BackendRegistry;
use crate::cache::CacheStats;
use crate::codeswitch::{CodeSwitchDetector, CodeSwitchResult};
use crate::config::DetectorConfig;
use crate::context::ConversationContext;
use crate::ensemble::Ensemble;
use crate::error::{Error, Result};
use crate::hints::HintDictionary;
use crate::types::{DetectionMode, DetectionResult, Reason};
use crate::voting::{Ballot, CustomStrategy, ScoreTable, StrategyRegistry, VotingStrategy};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

static DEFAULT_DETECTOR: OnceLock<std::result::Result<LanguageDetector, String>> =
    OnceLock::new();

/// Per-call options
#[derive(Debug, Clone)]
pub struct DetectOptions<'a> {
    /// Conversation the text belongs to
    pub context: Option<&'a ConversationContext>,
    /// Input length class
    pub mode: DetectionMode,
    /// Append the result to `context` as a new turn
    pub auto_update: bool,
    /// Backends to consult instead of the configured set
    pub backends: Option<Vec<String>>,
    /// Strategy to use instead of the configured one
    pub voting: Option<VotingStrategy>,
}

impl Default for DetectOptions<'_> {
    fn default() -> Self {
        Self {
            context: None,
            mode: DetectionMode::Default,
            auto_update: true,
            backends: None,
            voting: None,
        }
    }
}

impl<'a> DetectOptions<'a> {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a conversation
    pub fn context(mut self, context: &'a ConversationContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the mode
    pub fn mode(mut self, mode: DetectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable context updates
    pub fn auto_update(mut self, auto_update: bool) -> Self {
        self.auto_update = auto_update;
        self
    }

    /// Restrict the backends for this call
    pub fn backends<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backends = Some(backends.into_iter().map(Into::into).collect());
        self
    }

    /// Override the voting strategy for this call
    pub fn voting(mut self, voting: VotingStrategy) -> Self {
        self.voting = Some(voting);
        self
    }
}

/// Ensemble language detector for conversational text
#[derive(Debug)]
pub struct LanguageDetector {
    config: DetectorConfig,
    ensemble: Ensemble,
    strategies: StrategyRegistry,
    strategy: VotingStrategy,
    code_switch: CodeSwitchDetector,
}

impl LanguageDetector {
    /// Detector over the global registry with default settings
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Start a builder
    pub fn builder() -> DetectorBuilder {
        DetectorBuilder::new()
    }

    /// Detector from a configuration, using the global registry
    pub fn with_config(config: DetectorConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Active configuration
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Backend registry in use
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        self.ensemble.registry()
    }

    /// Configured voting strategy
    pub fn strategy(&self) -> &VotingStrategy {
        &self.strategy
    }

    /// Identify `text` with default options
    pub fn detect(&self, text: &str) -> Result<DetectionResult> {
        self.detect_with(text, &DetectOptions::default())
    }

    /// Identify `text` as the next turn of `context`
    pub fn detect_in_context(
        &self,
        text: &str,
        context: &ConversationContext,
    ) -> Result<DetectionResult> {
        self.detect_with(text, &DetectOptions::new().context(context))
    }

    /// Identify `text` with explicit options
    pub fn detect_with(&self, text: &str, options: &DetectOptions<'_>) -> Result<DetectionResult> {
        let strategy = options.voting.as_ref().unwrap_or(&self.strategy);
        let backends = options.backends.as_deref().unwrap_or(&self.config.backends);

        let mut result = self
            .ensemble
            .detect(text, options.mode, backends, strategy)?;

        if let Some(context) = options.context {
            self.apply_context(&mut result, context, options.mode);
            if options.auto_update && result.is_determined() {
                context.add_turn(text, &result.language, result.confidence);
            }
        }
        Ok(result)
    }

    /// Blend the conversation prior into a context-free result
    fn apply_context(
        &self,
        result: &mut DetectionResult,
        context: &ConversationContext,
        mode: DetectionMode,
    ) {
        let weight = self.config.context_weight;
        if weight <= 0.0 || context.is_empty() {
            return;
        }
        if matches!(
            result.reason,
            Reason::EmptyInput | Reason::ScriptUnambiguous | Reason::InsufficientConsensus
        ) {
            return;
        }

        let prior = context.normalized_prior();
        let table = result.scores.clone().unwrap_or_else(ScoreTable::new);
        let blended = table.blend(&prior, weight);
        if let Some((language, score)) = blended.winner() {
            if language != result.language {
                tracing::debug!(
                    "context prior moved the decision from {} to {language}",
                    result.language
                );
                result.reason = Reason::ContextPrior;
                result.language = language;
            }
            result.confidence = score.clamp(0.0, 1.0);
            result.reliable = result.confidence >= self.config.thresholds.for_mode(mode);
        }
        result.scores = Some(blended);
    }

    /// Identify several independent texts.
    ///
    /// Without a context the texts are processed concurrently; with one they
    /// are processed in order so each sees the turns before it.
    pub fn detect_batch(
        &self,
        texts: &[&str],
        options: &DetectOptions<'_>,
    ) -> Vec<Result<DetectionResult>> {
        if options.context.is_some() {
            return texts.iter().map(|t| self.detect_with(t, options)).collect();
        }

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            texts.par_iter().map(|t| self.detect_with(t, options)).collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            texts.iter().map(|t| self.detect_with(t, options)).collect()
        }
    }

    /// Segment `text` into language spans
    pub fn detect_code_switching(&self, text: &str) -> CodeSwitchResult {
        let window = |slice: &str| {
            self.ensemble.detect(
                slice,
                DetectionMode::Short,
                &self.config.backends,
                &self.strategy,
            )
        };
        self.code_switch.detect(text, &window)
    }

    /// Add a word hint
    pub fn add_hint(&self, word: &str, language: &str) -> Result<()> {
        self.ensemble.update_hints(|hints| hints.add(word, language))
    }

    /// Remove a word hint; returns whether it existed
    pub fn remove_hint(&self, word: &str) -> bool {
        self.ensemble.update_hints(|hints| hints.remove(word))
    }

    /// Layer a dictionary over the current hints
    pub fn load_hints(&self, dictionary: &HintDictionary) {
        self.ensemble
            .update_hints(|hints| *hints = hints.merge(dictionary));
    }

    /// Copy of the current hints
    pub fn hints(&self) -> HintDictionary {
        self.ensemble.hints()
    }

    /// Register a custom voting strategy usable through [`DetectOptions::voting`]
    pub fn register_strategy<F>(&self, name: &str, func: F) -> Result<()>
    where
        F: Fn(&[Ballot]) -> BTreeMap<String, f64> + Send + Sync + 'static,
    {
        self.strategies.register(name, func)
    }

    /// Resolve a built-in or registered strategy name
    pub fn resolve_strategy(&self, name: &str) -> Result<VotingStrategy> {
        self.strategies.resolve(name)
    }

    /// Registered custom strategy names
    pub fn custom_strategies(&self) -> Vec<String> {
        self.strategies.names()
    }

    /// Result cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.ensemble.cache_stats()
    }

    /// Drop all cached results
    pub fn clear_cache(&self) {
        self.ensemble.clear_cache();
    }
}

/// Builder for [`LanguageDetector`]
#[derive(Debug, Default)]
pub struct DetectorBuilder {
    config: DetectorConfig,
    registry: Option<Arc<BackendRegistry>>,
    hints: HintDictionary,
    strategies: Vec<CustomStrategy>,
}

impl DetectorBuilder {
    /// Builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a specific registry instead of the global one
    pub fn registry(mut self, registry: Arc<BackendRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Backends to consult; empty means all available
    pub fn backends<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.backends = backends.into_iter().map(Into::into).collect();
        self
    }

    /// Voting strategy name
    pub fn voting(mut self, name: impl Into<String>) -> Self {
        self.config.voting = name.into();
        self
    }

    /// Weight override for one backend
    pub fn weight(mut self, backend: impl Into<String>, weight: f64) -> Self {
        self.config.weights.insert(backend.into(), weight);
        self
    }

    /// Weight of the conversation prior
    pub fn context_weight(mut self, weight: f64) -> Self {
        self.config.context_weight = weight;
        self
    }

    /// Result cache size (0 disables caching)
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Per-call backend timeout in milliseconds
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.parallel.timeout_ms = timeout_ms;
        self
    }

    /// Size of the backend thread pool
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.config.parallel.max_workers = Some(workers);
        self
    }

    /// Initial hint dictionary
    pub fn hints(mut self, hints: HintDictionary) -> Self {
        self.hints = hints;
        self
    }

    /// Register a custom voting strategy
    pub fn custom_strategy<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&[Ballot]) -> BTreeMap<String, f64> + Send + Sync + 'static,
    {
        self.strategies.push(CustomStrategy::new(name, func));
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<LanguageDetector> {
        self.config.validate()?;

        let strategies = StrategyRegistry::new();
        for strategy in self.strategies {
            strategies.add(strategy)?;
        }
        let strategy = strategies.resolve(&self.config.voting)?;

        let registry = self.registry.unwrap_or_else(BackendRegistry::global);
        let ensemble = Ensemble::new(&self.config, registry)?;
        if !self.hints.is_empty() {
            let hints = self.hints;
            ensemble.update_hints(|current| *current = hints);
        }

        Ok(LanguageDetector {
            code_switch: CodeSwitchDetector::new(self.config.code_switch),
            config: self.config,
            ensemble,
            strategies,
            strategy,
        })
    }
}

/// Process-wide detector over the global registry with default settings
pub fn default_detector() -> Result<&'static LanguageDetector> {
    DEFAULT_DETECTOR
        .get_or_init(|| LanguageDetector::new().map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| Error::Configuration(e.clone()))
}

/// Identify `text` with the default detector
pub fn detect(text: &str) -> Result<DetectionResult> {
    default_detector()?.detect(text)
}

/// Identify `text` with the default detector and explicit options
pub fn detect_with(text: &str, options: &DetectOptions<'_>) -> Result<DetectionResult> {
    default_detector()?.detect_with(text, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, BackendDescriptor};
    use crate::types::BackendResult;

    struct Fixed(&'static str, &'static str, f64);

    impl Backend for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn detect(&self, _text: &str) -> Result<BackendResult> {
            Ok(BackendResult::new(self.0, self.1, self.2))
        }
    }

    fn detector(backends: Vec<Fixed>) -> LanguageDetector {
        let registry = Arc::new(BackendRegistry::new());
        for backend in backends {
            registry
                .register(BackendDescriptor::from_backend(Arc::new(backend)))
                .unwrap();
        }
        LanguageDetector::builder().registry(registry).build().unwrap()
    }

    #[test]
    fn test_auto_update_appends_turn() {
        let detector = detector(vec![Fixed("a", "de", 0.8)]);
        let context = ConversationContext::new();
        detector.detect_in_context("Guten Tag", &context).unwrap();
        assert_eq!(context.len(), 1);
        assert_eq!(context.last_turn().unwrap().language, "de");

        let options = DetectOptions::new().context(&context).auto_update(false);
        detector.detect_with("noch mal", &options).unwrap();
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_context_prior_changes_weak_decision() {
        let detector = detector(vec![Fixed("a", "es", 0.3)]);
        let context = ConversationContext::from_history([("pt", 0.9), ("pt", 0.95)]);
        let result = detector.detect_in_context("bem", &context).unwrap();
        assert_eq!(result.language, "pt");
        assert_eq!(result.reason, Reason::ContextPrior);
    }

    #[test]
    fn test_reliability_follows_mode() {
        let detector = detector(vec![Fixed("a", "en", 0.4)]);
        let short = detector
            .detect_with("hey", &DetectOptions::new().mode(DetectionMode::Short))
            .unwrap();
        assert!(short.reliable);
        let long = detector
            .detect_with("hey", &DetectOptions::new().mode(DetectionMode::Long))
            .unwrap();
        assert!(!long.reliable);
    }

    #[test]
    fn test_custom_strategy() {
        let registry = Arc::new(BackendRegistry::new());
        registry
            .register(BackendDescriptor::from_backend(Arc::new(Fixed("a", "en", 0.9))))
            .unwrap();
        let detector = LanguageDetector::builder()
            .registry(registry)
            .custom_strategy("always-fr", |_ballots: &[Ballot]| {
                BTreeMap::from([("fr".to_string(), 1.0)])
            })
            .voting("always-fr")
            .build()
            .unwrap();
        assert_eq!(detector.detect("hello").unwrap().language, "fr");
        assert_eq!(detector.custom_strategies(), vec!["always-fr"]);
        assert!(detector.register_strategy("always-fr", |_: &[Ballot]| BTreeMap::new()).is_err());
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result = LanguageDetector::builder()
            .registry(Arc::new(BackendRegistry::new()))
            .voting("plurality")
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_batch_preserves_order() {
        let detector = detector(vec![Fixed("a", "en", 0.9)]);
        let results = detector.detect_batch(&["one", "", "three"], &DetectOptions::new());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().language, "en");
        assert_eq!(results[1].as_ref().unwrap().language, "und");
    }

    #[test]
    fn test_hint_management() {
        let detector = detector(vec![Fixed("a", "en", 0.2)]);
        detector.add_hint("obrigado", "pt").unwrap();
        assert_eq!(detector.detect("obrigado").unwrap().language, "pt");
        assert!(detector.remove_hint("obrigado"));
        assert_eq!(detector.detect("obrigado").unwrap().language, "en");
    }
}
