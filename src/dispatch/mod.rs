//! Barrier-synchronized fan-out of worker tasks.
//!
//! Each phase spawns one task per unit of work on a `JoinSet`, bounded by a
//! semaphore. Every task gets its own deadline, its own retries and its own
//! error capture. A phase returns only after every task has terminated, and
//! its output is addressed by input position, so completion order never
//! leaks into the result. Dropping a phase future drops its `JoinSet`,
//! which aborts all outstanding tasks.

pub mod analysis;
pub mod scoring;

pub use scoring::floor_score;

use crate::config::DispatchConfig;
use crate::error::{JudgeError, ValidationError};
use crate::worker::Worker;
use futures::FutureExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Deadline and retry budget of one kind of task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPolicy {
    /// Deadline of a single attempt.
    pub timeout: Duration,
    /// Extra attempts after a failure.
    pub retries: u32,
}

/// Settings for both phases.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub analysis: TaskPolicy,
    pub scoring: TaskPolicy,
    pub max_concurrency: usize,
    pub show_progress: bool,
}

impl From<&DispatchConfig> for DispatchPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            analysis: TaskPolicy {
                timeout: config.analysis_timeout(),
                retries: config.retries,
            },
            scoring: TaskPolicy {
                timeout: config.scoring_timeout(),
                retries: config.retries,
            },
            max_concurrency: config.max_concurrency,
            show_progress: true,
        }
    }
}

/// Runs worker tasks for both phases.
pub struct Dispatcher {
    worker: Arc<dyn Worker>,
    policy: DispatchPolicy,
    limiter: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(worker: Arc<dyn Worker>, policy: DispatchPolicy) -> Self {
        let limiter = Arc::new(Semaphore::new(policy.max_concurrency.max(1)));
        Self {
            worker,
            policy,
            limiter,
        }
    }

    fn progress(&self, len: usize, message: &'static str) -> ProgressBar {
        if !self.policy.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(message);
        pb
    }
}

/// A dispatcher with progress bars off, for tests.
#[cfg(test)]
pub(crate) fn quiet_dispatcher(worker: Arc<dyn Worker>, timeout: Duration, retries: u32) -> Dispatcher {
    let task = TaskPolicy { timeout, retries };
    Dispatcher::new(
        worker,
        DispatchPolicy {
            analysis: task,
            scoring: task,
            max_concurrency: 4,
            show_progress: false,
        },
    )
}

/// Run one task under `policy`: call the worker, check its output, retry on
/// any failure until the budget is spent. Panics in the worker are caught.
pub(crate) async fn run_attempts<T, F, Fut, C>(
    policy: TaskPolicy,
    task: &str,
    mut call: F,
    check: C,
) -> Result<T, JudgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Value>>,
    C: Fn(Value) -> Result<T, ValidationError>,
{
    let attempts = policy.retries + 1;
    let mut attempt = 1;

    loop {
        debug!("{}: attempt {}/{}", task, attempt, attempts);

        let guarded = AssertUnwindSafe(call()).catch_unwind();
        let error = match tokio::time::timeout(policy.timeout, guarded).await {
            Ok(Ok(Ok(raw))) => match check(raw) {
                Ok(value) => return Ok(value),
                Err(e) => JudgeError::Validation(e),
            },
            Ok(Ok(Err(e))) => JudgeError::WorkerFailure(format!("{:#}", e)),
            Ok(Err(_)) => JudgeError::WorkerFailure("worker panicked".to_string()),
            Err(_) => JudgeError::WorkerTimeout(policy.timeout),
        };

        if attempt >= attempts {
            return Err(error);
        }

        warn!(
            "{}: attempt {}/{} failed ({}), retrying",
            task, attempt, attempts, error
        );
        attempt += 1;
    }
}
