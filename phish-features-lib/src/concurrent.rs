//! Bounded-concurrency worker pool.
//!
//! The pool fans out one task per candidate, keeps at most `concurrency`
//! tasks in flight and yields reports in completion order. Each task runs on
//! its own tokio task so that an error or a panic is caught at the pool
//! boundary and reported as "no result" for that candidate only.

use crate::error::PipelineError;
use crate::types::Candidate;
use futures::stream::{self, Stream, StreamExt};
use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What a resolution function produced for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// The candidate resolved and produced an intermediate result
    Resolved(T),
    /// The candidate failed its existence check; no row is emitted
    Dropped,
}

impl<T> Resolution<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Resolution<U> {
        match self {
            Resolution::Resolved(value) => Resolution::Resolved(f(value)),
            Resolution::Dropped => Resolution::Dropped,
        }
    }

    /// Like [`Resolution::map`], dropping the candidate when `f` yields `None`.
    pub fn and_then<U, F: FnOnce(T) -> Option<U>>(self, f: F) -> Resolution<U> {
        match self {
            Resolution::Resolved(value) => f(value).map_or(Resolution::Dropped, Resolution::Resolved),
            Resolution::Dropped => Resolution::Dropped,
        }
    }
}

/// Pool-level view of a finished task.
#[derive(Debug, Clone)]
pub enum TaskOutcome<T> {
    Completed(T),
    Dropped,
    /// The task returned an error or panicked
    Failed(PipelineError),
}

/// One finished task together with the candidate it was dispatched for.
#[derive(Debug, Clone)]
pub struct TaskReport<T> {
    pub candidate: Candidate,
    pub outcome: TaskOutcome<T>,
}

/// Bounded random delay applied after every task before its slot frees up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub min: Duration,
    pub max: Duration,
}

impl Jitter {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    /// No delay at all.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    async fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::new(Duration::from_millis(10), Duration::from_millis(50))
    }
}

/// General-purpose worker pool shared by the DNS and script pipelines.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
    jitter: Jitter,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            jitter: Jitter::default(),
        }
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `worker` once per candidate and stream the reports as tasks finish.
    ///
    /// The stream always yields exactly one report per candidate.
    pub fn run<T, F, Fut>(
        &self,
        candidates: Vec<Candidate>,
        worker: Arc<F>,
    ) -> Pin<Box<dyn Stream<Item = TaskReport<T>> + Send>>
    where
        T: Send + 'static,
        F: Fn(Candidate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resolution<T>, PipelineError>> + Send + 'static,
    {
        let jitter = self.jitter;

        let tasks = candidates.into_iter().map(move |candidate| {
            let worker = Arc::clone(&worker);
            async move {
                let dispatched = candidate.clone();
                let handle = tokio::spawn(async move {
                    let result = worker(dispatched).await;
                    jitter.pause().await;
                    result
                });

                let outcome = match handle.await {
                    Ok(Ok(Resolution::Resolved(value))) => TaskOutcome::Completed(value),
                    Ok(Ok(Resolution::Dropped)) => {
                        debug!("dropped {}", candidate.display_name());
                        TaskOutcome::Dropped
                    }
                    Ok(Err(err)) => {
                        warn!("task for {} failed: {}", candidate.display_name(), err);
                        TaskOutcome::Failed(err)
                    }
                    Err(join_err) => {
                        let message = if join_err.is_panic() {
                            "task panicked"
                        } else {
                            "task was cancelled"
                        };
                        warn!("task for {} failed: {}", candidate.display_name(), message);
                        TaskOutcome::Failed(PipelineError::task_failed(&candidate.raw, message))
                    }
                };

                TaskReport { candidate, outcome }
            }
        });

        Box::pin(stream::iter(tasks).buffer_unordered(self.concurrency))
    }
}
