//! Persistence seam for conversation contexts

use super::{ContextSnapshot, ConversationContext};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Loads and saves contexts by session id
pub trait ContextStore: Send + Sync {
    /// Context stored for `session`, if any
    fn load(&self, session: &str) -> Result<Option<ConversationContext>>;

    /// Persist `context` under `session`, replacing what was there
    fn save(&self, session: &str, context: &ConversationContext) -> Result<()>;

    /// Remove a session; returns whether it existed
    fn delete(&self, session: &str) -> Result<bool>;
}

/// Process-local store keeping snapshots in a map
#[derive(Debug, Default)]
pub struct MemoryContextStore {
    sessions: RwLock<HashMap<String, ContextSnapshot>>,
}

impl MemoryContextStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored session ids
    pub fn sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

fn poisoned() -> Error {
    Error::Serialization("context store lock poisoned".into())
}

impl ContextStore for MemoryContextStore {
    fn load(&self, session: &str) -> Result<Option<ConversationContext>> {
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        sessions
            .get(session)
            .cloned()
            .map(ConversationContext::from_snapshot)
            .transpose()
    }

    fn save(&self, session: &str, context: &ConversationContext) -> Result<()> {
        let snapshot = context.to_snapshot();
        self.sessions
            .write()
            .map_err(|_| poisoned())?
            .insert(session.to_string(), snapshot);
        Ok(())
    }

    fn delete(&self, session: &str) -> Result<bool> {
        Ok(self
            .sessions
            .write()
            .map_err(|_| poisoned())?
            .remove(session)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryContextStore::new();
        assert!(store.load("s1").unwrap().is_none());

        let ctx = ConversationContext::new();
        ctx.update("fr", 0.9);
        store.save("s1", &ctx).unwrap();

        let loaded = store.load("s1").unwrap().unwrap();
        assert_eq!(loaded.to_snapshot(), ctx.to_snapshot());
        assert_eq!(store.sessions(), vec!["s1".to_string()]);

        assert!(store.delete("s1").unwrap());
        assert!(!store.delete("s1").unwrap());
    }
}
