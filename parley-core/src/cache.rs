//! Bounded LRU cache of finalized, context-free detection results

use crate::types::{DetectionMode, DetectionResult};
use lru::LruCache;
use serde::Serialize;
use smallvec::SmallVec;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Cache key: normalized text, mode, sorted active backend names, the
/// voting strategy and the registry generation they were resolved against.
///
/// When preprocessing hands the backends something other than the raw
/// text, the normalized backend input is part of the key as well, and so is
/// the revision of the hint dictionary the result was built with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    text: String,
    backend_input: Option<String>,
    mode: DetectionMode,
    backends: SmallVec<[String; 4]>,
    strategy: String,
    generation: u64,
    hint_revision: u64,
}

impl CacheKey {
    /// Build a key; backend names are sorted so request order does not matter
    pub fn new<I, S>(text: &str, mode: DetectionMode, backends: I, generation: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut backends: SmallVec<[String; 4]> = backends.into_iter().map(Into::into).collect();
        backends.sort_unstable();
        backends.dedup();
        Self {
            text: text.to_string(),
            backend_input: None,
            mode,
            backends,
            strategy: String::new(),
            generation,
            hint_revision: 0,
        }
    }

    /// Scope the key to a voting strategy
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    /// Record the normalized text the backends actually received
    pub fn with_backend_input(mut self, input: impl Into<String>) -> Self {
        self.backend_input = Some(input.into());
        self
    }

    /// Scope the key to a hint dictionary revision
    pub fn with_hint_revision(mut self, revision: u64) -> Self {
        self.hint_revision = revision;
        self
    }
}

/// Hit/miss counters and occupancy
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored
    pub size: usize,
    /// Maximum number of entries
    pub capacity: usize,
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that did not
    pub misses: u64,
}

impl CacheStats {
    /// Share of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe LRU cache. A capacity of zero disables caching.
pub struct DetectionCache {
    inner: Option<Mutex<LruCache<CacheKey, DetectionResult>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DetectionCache {
    /// Create a cache holding at most `capacity` results
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a result, refreshing its recency
    pub fn get(&self, key: &CacheKey) -> Option<DetectionResult> {
        let inner = self.inner.as_ref()?;
        let found = match inner.lock() {
            Ok(mut cache) => cache.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        };
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store a result, evicting the least recently used entry when full
    pub fn put(&self, key: CacheKey, value: DetectionResult) {
        let Some(inner) = self.inner.as_ref() else {
            return;
        };
        let mut cache = match inner.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.put(key, value);
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        if let Some(inner) = self.inner.as_ref() {
            match inner.lock() {
                Ok(mut cache) => cache.clear(),
                Err(poisoned) => poisoned.into_inner().clear(),
            }
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| match inner.lock() {
            Ok(cache) => cache.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        })
    }

    /// Whether the cache holds nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for DetectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionCache")
            .field("stats", &self.stats())
            .finish()
    }
}
