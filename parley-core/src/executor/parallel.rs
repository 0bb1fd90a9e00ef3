//! Parallel execution strategy

use super::{
    call_job, claim, spawn_detached, timeout_error, ExecutionMode, Executor, Invocation,
    DEFAULT_TIMEOUT,
};
use crate::backend::RegisteredBackend;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

/// Fans backend calls out over a dedicated rayon pool.
///
/// Answers are collected through a channel until the deadline; a backend
/// still running at that point is reported as timed out and its eventual
/// answer is discarded. The abandoned call keeps its backend reserved, and
/// later runs report that backend as timed out without queueing another
/// call behind it. Once every worker is held by a running call, new calls
/// get a thread of their own.
#[derive(Debug)]
pub struct ParallelExecutor {
    pool: rayon::ThreadPool,
    timeout: Duration,
    running: Arc<AtomicUsize>,
}

impl ParallelExecutor {
    /// Build the pool; `max_workers` defaults to the CPU count
    pub fn new(max_workers: Option<usize>, timeout: Duration) -> Result<Self> {
        let threads = max_workers.unwrap_or_else(num_cpus::get).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("parley-backend-{i}"))
            .build()
            .map_err(|e| Error::Configuration(format!("thread pool: {e}")))?;
        Ok(Self {
            pool,
            timeout,
            running: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Pool with default sizing and timeout
    pub fn with_defaults() -> Result<Self> {
        Self::new(None, DEFAULT_TIMEOUT)
    }

    /// Worker count
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ParallelExecutor {
    /// Start one reserved call on a free worker, or on its own thread
    fn dispatch(&self, name: &str, job: impl FnOnce() + Send + 'static) -> Result<()> {
        if self.running.fetch_add(1, Ordering::AcqRel) < self.workers() {
            let running = Arc::clone(&self.running);
            self.pool.spawn(move || {
                job();
                running.fetch_sub(1, Ordering::AcqRel);
            });
            Ok(())
        } else {
            self.running.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!("all workers busy, starting '{name}' on its own thread");
            spawn_detached(name, job)
        }
    }
}

impl Executor for ParallelExecutor {
    fn run(&self, text: &str, backends: &[Arc<RegisteredBackend>]) -> Vec<Invocation> {
        let (tx, rx) = mpsc::channel();
        let shared: Arc<str> = Arc::from(text);

        let mut slots: Vec<Option<(Result<_>, Option<Duration>)>> =
            backends.iter().map(|_| None).collect();
        let mut pending = 0;
        for (index, entry) in backends.iter().enumerate() {
            let started = claim(entry, self.timeout).and_then(|guard| {
                let job = call_job(guard, Arc::clone(&shared), index, tx.clone());
                self.dispatch(entry.name(), job)
            });
            match started {
                Ok(()) => pending += 1,
                Err(e) => slots[index] = Some((Err(e), None)),
            }
        }
        drop(tx);

        let deadline = Instant::now() + self.timeout;
        while pending > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((index, outcome, elapsed)) => {
                    slots[index] = Some((outcome, Some(elapsed)));
                    pending -= 1;
                }
                Err(_) => break,
            }
        }

        backends
            .iter()
            .zip(slots)
            .map(|(entry, slot)| {
                let (outcome, elapsed) = slot
                    .unwrap_or_else(|| (Err(timeout_error(entry.name(), self.timeout)), None));
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
        ExecutionMode::Parallel
    }
}
