//! Sequential execution strategy

use super::{
    call_job, claim, spawn_detached, timeout_error, ExecutionMode, Executor, Invocation,
    DEFAULT_TIMEOUT,
};
use crate::backend::RegisteredBackend;
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// Runs backends one by one.
///
/// Each call is handed to a worker thread and awaited for at most the
/// timeout; a call still running past it is abandoned and keeps its backend
/// reserved until it returns.
#[derive(Debug, Clone)]
pub struct SequentialExecutor {
    timeout: Duration,
}

impl SequentialExecutor {
    /// Executor with a per-call timeout
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SequentialExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Executor for SequentialExecutor {
    fn run(&self, text: &str, backends: &[Arc<RegisteredBackend>]) -> Vec<Invocation> {
        let shared: Arc<str> = Arc::from(text);
        backends
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let (outcome, elapsed) = match claim(entry, self.timeout) {
                    Ok(guard) => {
                        let (tx, rx) = mpsc::channel();
                        let job = call_job(guard, Arc::clone(&shared), index, tx);
                        match spawn_detached(entry.name(), job) {
                            Ok(()) => match rx.recv_timeout(self.timeout) {
                                Ok((_, outcome, elapsed)) => (outcome, Some(elapsed)),
                                Err(_) => (Err(timeout_error(entry.name(), self.timeout)), None),
                            },
                            Err(e) => (Err(e), None),
                        }
                    }
                    Err(e) => (Err(e), None),
                };
                Invocation {
                    backend: entry.name().to_string(),
                    reliability: entry.descriptor().reliability(),
                    outcome,
                    elapsed,
                }
            })
            .collect()
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Sequential
    }
}
