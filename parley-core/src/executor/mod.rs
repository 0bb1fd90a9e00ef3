//! Backend invocation strategies

use crate::backend::{CallGuard, RegisteredBackend};
use crate::error::{Error, Result};
use crate::types::BackendResult;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

#[cfg(feature = "parallel")]
pub mod parallel;
pub mod sequential;

#[cfg(feature = "parallel")]
pub use parallel::ParallelExecutor;
pub use sequential::SequentialExecutor;

/// Per-call timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Execution mode selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One backend after the other, each bounded by the timeout
    Sequential,
    /// Backends fanned out over a thread pool
    Parallel,
}

/// Outcome of one backend call
#[derive(Debug)]
pub struct Invocation {
    /// Backend name
    pub backend: String,
    /// Static reliability of the backend
    pub reliability: u8,
    /// Result or soft failure
    pub outcome: Result<BackendResult>,
    /// Wall time spent, when the call finished
    pub elapsed: Option<Duration>,
}

/// Strategy for running a set of backends over one text
pub trait Executor: Send + Sync {
    /// Invoke every backend; the output follows the input order
    fn run(&self, text: &str, backends: &[Arc<RegisteredBackend>]) -> Vec<Invocation>;

    /// Get the execution mode
    fn mode(&self) -> ExecutionMode;
}

/// Pick the execution mode for a call.
///
/// Thread hand-off costs more than a couple of lookups on a short message,
/// so fan-out only pays off with several backends and some text.
pub fn auto_select(
    active_backends: usize,
    text_chars: usize,
    min_backends: usize,
    min_chars: usize,
) -> ExecutionMode {
    if active_backends < min_backends.max(2) || text_chars <= min_chars {
        return ExecutionMode::Sequential;
    }

    #[cfg(feature = "parallel")]
    return ExecutionMode::Parallel;

    #[cfg(not(feature = "parallel"))]
    ExecutionMode::Sequential
}

/// Call one backend, turning every failure into a backend-scoped error
pub(crate) fn invoke(entry: &RegisteredBackend, text: &str) -> Result<BackendResult> {
    if !entry.is_available() {
        return Err(Error::BackendUnavailable {
            name: entry.name().to_string(),
            reason: "availability probe failed".into(),
        });
    }
    let backend = entry.instance()?;
    match catch_unwind(AssertUnwindSafe(|| backend.detect(text))) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) if e.is_soft() => Err(e),
        Ok(Err(e)) => Err(Error::backend(entry.name(), e)),
        Err(_) => Err(Error::backend(entry.name(), "backend panicked")),
    }
}

pub(crate) fn timeout_error(name: &str, timeout: Duration) -> Error {
    Error::BackendTimeout {
        name: name.to_string(),
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

/// Answer of a call running off the calling thread, tagged with its slot
pub(crate) type Reply = (usize, Result<BackendResult>, Duration);

/// Reserve `entry` or report it as timed out while an earlier call still runs
pub(crate) fn claim(entry: &Arc<RegisteredBackend>, timeout: Duration) -> Result<CallGuard> {
    entry.try_claim().ok_or_else(|| {
        tracing::debug!("backend '{}' is still busy with an earlier call", entry.name());
        timeout_error(entry.name(), timeout)
    })
}

/// Work item for a reserved backend.
///
/// The reservation is released as soon as the backend returns, before the
/// answer is sent.
pub(crate) fn call_job(
    guard: CallGuard,
    text: Arc<str>,
    index: usize,
    tx: mpsc::Sender<Reply>,
) -> impl FnOnce() + Send + 'static {
    move || {
        let start = Instant::now();
        let outcome = invoke(guard.entry(), &text);
        let elapsed = start.elapsed();
        drop(guard);
        // The receiver is gone once the deadline has passed
        let _ = tx.send((index, outcome, elapsed));
    }
}

/// Run `job` on a thread of its own
pub(crate) fn spawn_detached(name: &str, job: impl FnOnce() + Send + 'static) -> Result<()> {
    std::thread::Builder::new()
        .name(format!("parley-{name}"))
        .spawn(job)
        .map(drop)
        .map_err(|e| Error::backend(name, format!("cannot start worker thread: {e}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::backend::{Backend, BackendDescriptor, BackendRegistry, RegisteredBackend};
    use crate::error::{Error, Result};
    use crate::types::BackendResult;
    use std::sync::Arc;
    use std::time::Duration;

    /// Answers a fixed language, optionally after a delay or with an error
    pub struct Scripted {
        pub name: &'static str,
        pub language: &'static str,
        pub delay: Duration,
        pub fail: bool,
    }

    impl Backend for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn detect(&self, _text: &str) -> Result<BackendResult> {
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(Error::backend(self.name, "scripted failure"));
            }
            Ok(BackendResult::new(self.name, self.language, 0.9))
        }
    }

    pub fn entries(backends: Vec<Scripted>) -> Vec<Arc<RegisteredBackend>> {
        let registry = BackendRegistry::new();
        for backend in backends {
            registry
                .register(BackendDescriptor::from_backend(Arc::new(backend)))
                .unwrap();
        }
        registry.snapshot()
    }

    pub fn quick(name: &'static str, language: &'static str) -> Scripted {
        Scripted {
            name,
            language,
            delay: Duration::ZERO,
            fail: false,
        }
    }
}
