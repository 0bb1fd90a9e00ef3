//! Conversation contexts persisted as one JSON file per session

use parley_core::context::ContextStore;
use parley_core::{ConversationContext, Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Directory-backed [`ContextStore`]
#[derive(Debug, Clone)]
pub struct FileContextStore {
    dir: PathBuf,
}

impl FileContextStore {
    /// Store rooted at `dir`; the directory is created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `session`
    pub fn path_for(&self, session: &str) -> Result<PathBuf> {
        validate_session(session)?;
        Ok(self.dir.join(format!("{session}.json")))
    }
}

/// Session ids become file names, so only a safe alphabet is accepted
fn validate_session(session: &str) -> Result<()> {
    let valid = !session.is_empty()
        && session.len() <= 128
        && session
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !session.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(Error::Configuration(format!("invalid session id '{session}'")))
    }
}

impl ContextStore for FileContextStore {
    fn load(&self, session: &str) -> Result<Option<ConversationContext>> {
        let path = self.path_for(session)?;
        match fs::read_to_string(&path) {
            Ok(json) => ConversationContext::from_json(&json).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, session: &str, context: &ConversationContext) -> Result<()> {
        let path = self.path_for(session)?;
        fs::create_dir_all(&self.dir)?;
        // Write then rename so readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, context.to_json()?)?;
        fs::rename(&tmp, &path)?;
        log::debug!("saved session '{session}' to {}", path.display());
        Ok(())
    }

    fn delete(&self, session: &str) -> Result<bool> {
        let path = self.path_for(session)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
