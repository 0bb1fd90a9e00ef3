//! Name → backend registry

use super::{BackendDescriptor, RegisteredBackend};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

static GLOBAL: OnceLock<Arc<BackendRegistry>> = OnceLock::new();

/// Registered backends keyed by name.
///
/// Every successful registration or removal bumps a generation counter;
/// cache keys include it, so results computed against an older backend set
/// are never served again.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    entries: RwLock<BTreeMap<String, Arc<RegisteredBackend>>>,
    generation: AtomicU64,
}

impl BackendRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the backends compiled into this build
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for descriptor in builtin_descriptors() {
            if let Err(e) = registry.register(descriptor) {
                tracing::warn!("skipping built-in backend: {e}");
            }
        }
        registry
    }

    /// Process-wide registry, created with the built-ins on first use
    pub fn global() -> Arc<BackendRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::with_builtins())))
    }

    /// Add a backend; duplicate names and invalid reliabilities are rejected
    pub fn register(&self, descriptor: BackendDescriptor) -> Result<()> {
        descriptor.validate()?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(descriptor.name()) {
            return Err(Error::Configuration(format!(
                "backend '{}' is already registered",
                descriptor.name()
            )));
        }
        tracing::info!(
            "registered backend '{}' (reliability {}, {})",
            descriptor.name(),
            descriptor.reliability(),
            descriptor.latency()
        );
        entries.insert(
            descriptor.name().to_string(),
            Arc::new(RegisteredBackend::new(descriptor)),
        );
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Remove a backend; returns whether it was registered
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            self.generation.fetch_add(1, Ordering::SeqCst);
            tracing::info!("unregistered backend '{name}'");
        }
        removed
    }

    /// Remove every backend
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !entries.is_empty() {
            entries.clear();
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Names of all registered backends, sorted
    pub fn list_registered(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Names of backends whose probe succeeds; nothing is instantiated
    pub fn list_available(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|entry| entry.is_available())
            .map(|entry| entry.name().to_string())
            .collect()
    }

    /// Entry for a name
    pub fn get(&self, name: &str) -> Option<Arc<RegisteredBackend>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Whether a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Current generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// All entries, sorted by name
    pub fn snapshot(&self) -> Vec<Arc<RegisteredBackend>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Number of registered backends
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Descriptors of the backends enabled at compile time
pub fn builtin_descriptors() -> Vec<BackendDescriptor> {
    #[allow(unused_mut)]
    let mut descriptors = vec![super::lexicon::descriptor()];
    #[cfg(feature = "whatlang")]
    descriptors.push(super::whatlang::descriptor());
    #[cfg(feature = "lingua")]
    descriptors.push(super::lingua::descriptor());
    descriptors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::types::BackendResult;

    struct Named(&'static str);

    impl Backend for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn detect(&self, _text: &str) -> Result<BackendResult> {
            Ok(BackendResult::new(self.0, "en", 0.5))
        }
    }

    fn descriptor(name: &'static str) -> BackendDescriptor {
        BackendDescriptor::from_backend(Arc::new(Named(name)))
    }

    #[test]
    fn test_register_and_list() {
        let registry = BackendRegistry::new();
        registry.register(descriptor("b")).unwrap();
        registry.register(descriptor("a")).unwrap();
        assert_eq!(registry.list_registered(), vec!["a", "b"]);
        assert_eq!(registry.list_available(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = BackendRegistry::new();
        registry.register(descriptor("a")).unwrap();
        let err = registry.register(descriptor("a")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_generation_tracks_changes() {
        let registry = BackendRegistry::new();
        let start = registry.generation();
        registry.register(descriptor("a")).unwrap();
        assert_eq!(registry.generation(), start + 1);
        assert!(!registry.unregister("missing"));
        assert_eq!(registry.generation(), start + 1);
        assert!(registry.unregister("a"));
        assert_eq!(registry.generation(), start + 2);
    }

    #[test]
    fn test_unavailable_backend_not_listed() {
        let registry = BackendRegistry::new();
        registry
            .register(descriptor("off").with_probe(|| false))
            .unwrap();
        assert_eq!(registry.list_registered(), vec!["off"]);
        assert!(registry.list_available().is_empty());
    }

    #[test]
    fn test_builtins_present() {
        let registry = BackendRegistry::with_builtins();
        assert!(registry.contains("lexicon"));
        #[cfg(feature = "whatlang")]
        assert!(registry.contains("whatlang"));
        // Probing must not instantiate anything
        assert!(registry.snapshot().iter().all(|e| !e.is_initialized()));
    }
}
