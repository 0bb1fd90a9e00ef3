//! Detection backends and their registry
//!
//! A backend is any language identifier that maps text to a language code
//! and a confidence. Backends are registered through a [`BackendDescriptor`]
//! carrying a cheap availability probe and a factory; the factory runs on
//! first use only, so heavy models are never loaded just to list backends.

pub mod lexicon;
#[cfg(feature = "lingua")]
pub mod lingua;
mod registry;
#[cfg(feature = "whatlang")]
pub mod whatlang;

pub use registry::BackendRegistry;

use crate::error::{Error, Result};
use crate::types::BackendResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Reliability assigned when a descriptor does not set one
pub const DEFAULT_RELIABILITY: u8 = 3;

/// A language identifier
pub trait Backend: Send + Sync {
    /// Unique backend name
    fn name(&self) -> &str;

    /// Whether the backend can run right now
    fn is_available(&self) -> bool {
        true
    }

    /// Identify the language of `text`
    fn detect(&self, text: &str) -> Result<BackendResult>;

    /// Languages this backend can return; empty means unrestricted
    fn supported_languages(&self) -> Vec<String> {
        Vec::new()
    }

    /// Identify several texts
    fn detect_batch(&self, texts: &[&str]) -> Vec<Result<BackendResult>> {
        texts.iter().map(|text| self.detect(text)).collect()
    }
}

/// Rough cost of one backend call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyClass {
    /// Sub-millisecond lookups; used in short mode
    #[default]
    Fast,
    /// Model inference; skipped in short mode
    Heavy,
}

impl fmt::Display for LatencyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LatencyClass::Fast => "fast",
            LatencyClass::Heavy => "heavy",
        })
    }
}

type Probe = Arc<dyn Fn() -> bool + Send + Sync>;
type Factory = Arc<dyn Fn() -> Result<Arc<dyn Backend>> + Send + Sync>;

/// Everything the registry needs to know about a backend
#[derive(Clone)]
pub struct BackendDescriptor {
    name: String,
    reliability: u8,
    languages: Vec<String>,
    latency: LatencyClass,
    probe: Probe,
    factory: Factory,
}

impl BackendDescriptor {
    /// Descriptor with a lazy factory
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Backend>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            reliability: DEFAULT_RELIABILITY,
            languages: Vec::new(),
            latency: LatencyClass::Fast,
            probe: Arc::new(|| true),
            factory: Arc::new(factory),
        }
    }

    /// Descriptor around an already constructed backend
    pub fn from_backend(backend: Arc<dyn Backend>) -> Self {
        let name = backend.name().to_string();
        let languages = backend.supported_languages();
        let probe_backend = Arc::clone(&backend);
        Self::new(name, move || Ok(Arc::clone(&backend)))
            .with_languages(languages)
            .with_probe(move || probe_backend.is_available())
    }

    /// Static reliability, 1 (weak) to 5 (strong)
    pub fn with_reliability(mut self, reliability: u8) -> Self {
        self.reliability = reliability;
        self
    }

    /// Declared language set
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    /// Latency class
    pub fn with_latency(mut self, latency: LatencyClass) -> Self {
        self.latency = latency;
        self
    }

    /// Cheap availability check run before the factory
    pub fn with_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.probe = Arc::new(probe);
        self
    }

    /// Backend name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static reliability
    pub fn reliability(&self) -> u8 {
        self.reliability
    }

    /// Declared languages
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Latency class
    pub fn latency(&self) -> LatencyClass {
        self.latency
    }

    /// Run the availability probe
    pub fn probe(&self) -> bool {
        (self.probe)()
    }

    /// Check name and reliability
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Configuration("backend name is empty".into()));
        }
        if !(1..=5).contains(&self.reliability) {
            return Err(Error::Configuration(format!(
                "backend '{}' reliability {} is outside 1..=5",
                self.name, self.reliability
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name)
            .field("reliability", &self.reliability)
            .field("languages", &self.languages.len())
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

/// A descriptor plus its lazily created instance
pub struct RegisteredBackend {
    descriptor: BackendDescriptor,
    instance: OnceLock<std::result::Result<Arc<dyn Backend>, String>>,
    in_flight: AtomicBool,
}

impl RegisteredBackend {
    fn new(descriptor: BackendDescriptor) -> Self {
        Self {
            descriptor,
            instance: OnceLock::new(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Registration data
    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    /// Backend name
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Probe result, false once initialization has failed
    pub fn is_available(&self) -> bool {
        match self.instance.get() {
            Some(Err(_)) => false,
            Some(Ok(backend)) => self.descriptor.probe() && backend.is_available(),
            None => self.descriptor.probe(),
        }
    }

    /// Whether the factory has run
    pub fn is_initialized(&self) -> bool {
        self.instance.get().is_some()
    }

    /// The backend instance, created on first call.
    ///
    /// A failed initialization is remembered and reported as
    /// [`Error::BackendUnavailable`] on every later call.
    pub fn instance(&self) -> Result<Arc<dyn Backend>> {
        let slot = self.instance.get_or_init(|| {
            tracing::debug!("initializing backend '{}'", self.name());
            (self.descriptor.factory)().map_err(|e| e.to_string())
        });
        match slot {
            Ok(backend) => Ok(Arc::clone(backend)),
            Err(reason) => Err(Error::BackendUnavailable {
                name: self.name().to_string(),
                reason: reason.clone(),
            }),
        }
    }

    /// Whether a call is still running, including one abandoned after a timeout
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Reserve the backend for one call.
    ///
    /// Returns `None` while an earlier call has not returned, so a hung
    /// backend occupies at most one thread. The reservation ends when the
    /// guard drops.
    pub fn try_claim(self: &Arc<Self>) -> Option<CallGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(CallGuard {
            entry: Arc::clone(self),
        })
    }
}

impl fmt::Debug for RegisteredBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredBackend")
            .field("descriptor", &self.descriptor)
            .field("initialized", &self.is_initialized())
            .field("busy", &self.is_busy())
            .finish()
    }
}

/// Exclusive reservation of a backend, released on drop
#[derive(Debug)]
pub struct CallGuard {
    entry: Arc<RegisteredBackend>,
}

impl CallGuard {
    /// The reserved backend
    pub fn entry(&self) -> &RegisteredBackend {
        &self.entry
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.entry.in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed;

    impl Backend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&self, _text: &str) -> Result<BackendResult> {
            Ok(BackendResult::new("fixed", "en", 0.9))
        }
    }

    #[test]
    fn test_descriptor_validation() {
        let ok = BackendDescriptor::from_backend(Arc::new(Fixed));
        assert!(ok.validate().is_ok());
        assert_eq!(ok.reliability(), DEFAULT_RELIABILITY);

        assert!(ok.clone().with_reliability(0).validate().is_err());
        assert!(ok.with_reliability(6).validate().is_err());
    }

    #[test]
    fn test_factory_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let entry = RegisteredBackend::new(BackendDescriptor::new("lazy", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Fixed) as Arc<dyn Backend>)
        }));

        assert!(entry.is_available());
        assert!(!entry.is_initialized());
        entry.instance().unwrap();
        entry.instance().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_initialization_is_cached() {
        let entry = RegisteredBackend::new(BackendDescriptor::new("broken", || {
            Err(Error::backend("broken", "model missing"))
        }));
        assert!(matches!(entry.instance(), Err(Error::BackendUnavailable { .. })));
        assert!(!entry.is_available());
        assert!(entry.instance().is_err());
    }

    #[test]
    fn test_claim_is_exclusive_until_released() {
        let entry = Arc::new(RegisteredBackend::new(BackendDescriptor::from_backend(
            Arc::new(Fixed),
        )));
        let guard = entry.try_claim().unwrap();
        assert!(entry.is_busy());
        assert!(entry.try_claim().is_none());

        drop(guard);
        assert!(!entry.is_busy());
        assert!(entry.try_claim().is_some());
    }

    #[test]
    fn test_default_batch() {
        let results = Fixed.detect_batch(&["a", "b"]);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
    }
}
