//! [`BatchRun`]: the public facade of a batch
//!
//! Wires task expansion, the bounded scheduler, the retrying executor,
//! progress estimation and error accumulation together, and dispatches
//! progress/error events to subscribers.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::config::BatchConfig;
use super::errors::{BatchError, ErrorAccumulator};
use super::progress::{BatchProgress, ProgressEstimator};
use super::scheduler::{BoundedScheduler, SchedulerObserver};
use super::task::{TaskDescriptor, TaskOutput, TaskSource};
use super::BatchRunError;
use crate::cancel::{CancellationCoordinator, SharedCancellation};
use crate::executor::TaskExecutor;
use crate::metrics::{generate_run_id, TaskMetrics};
use crate::retry::{RetryConfig, RetryError, RetryingExecutor};
use crate::Dimension;

type Subscriber<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Lifecycle of a [`BatchRun`] instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run has been started yet
    Idle,
    /// A run is executing
    Running,
    /// The last run drained every task
    Completed,
    /// The last run stopped early because cancellation was requested
    Cancelled,
}

/// Aggregate outcome of one run.
#[derive(Debug, Clone)]
pub struct BatchResult<A, B, T> {
    /// Identifier used in logs for this run
    pub run_id: String,
    /// Tasks in the expanded batch
    pub total: usize,
    /// Tasks that produced a value
    pub succeeded: usize,
    /// Tasks recorded as errors
    pub failed: usize,
    /// Successful outputs in completion order
    pub results: Vec<TaskOutput<A, B, T>>,
    /// Failures in arrival order
    pub errors: Vec<BatchError<A, B>>,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall-clock end
    pub finished_at: DateTime<Utc>,
    /// Elapsed run time
    pub duration: Duration,
    /// Whether cancellation kept some tasks from starting
    pub cancelled: bool,
}

impl<A, B, T> BatchResult<A, B, T> {
    /// Tasks that reached a terminal outcome.
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Tasks never started because of cancellation.
    pub fn skipped(&self) -> usize {
        self.total.saturating_sub(self.completed())
    }

    /// True when the batch had tasks and every one of them failed.
    pub fn is_total_failure(&self) -> bool {
        self.total > 0 && self.failed == self.total
    }

    /// One-line summary for logs and terminal output.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{}/{} tasks succeeded, {} failed in {:.1}s",
            self.succeeded,
            self.total,
            self.failed,
            self.duration.as_secs_f64()
        );
        if self.cancelled {
            line.push_str(&format!(" (cancelled, {} not started)", self.skipped()));
        }
        line
    }
}

/// Runs batches of independent tasks under a concurrency cap.
///
/// One instance runs at most one batch at a time; a call to [`BatchRun::run`]
/// while another is executing fails with [`BatchRunError::AlreadyRunning`].
/// Subscribers persist across runs until cleared.
pub struct BatchRun<A, B> {
    retry: RetryingExecutor,
    progress_subscribers: Mutex<Vec<Subscriber<BatchProgress<A, B>>>>,
    error_subscribers: Mutex<Vec<Subscriber<BatchError<A, B>>>>,
    state: Mutex<RunState>,
    cancel: SharedCancellation,
}

impl<A: Dimension, B: Dimension> BatchRun<A, B> {
    /// Create a batch runner using `retry_config` for every task.
    pub fn new(retry_config: RetryConfig) -> Result<Self, BatchRunError> {
        Ok(Self {
            retry: RetryingExecutor::new(retry_config)?,
            progress_subscribers: Mutex::new(Vec::new()),
            error_subscribers: Mutex::new(Vec::new()),
            state: Mutex::new(RunState::Idle),
            cancel: CancellationCoordinator::shared(),
        })
    }

    /// Register a progress callback. Invoked before each task start and once
    /// when the run drains.
    pub fn subscribe_progress<F>(&self, callback: F) -> &Self
    where
        F: Fn(&BatchProgress<A, B>) + Send + Sync + 'static,
    {
        lock(&self.progress_subscribers).push(Arc::new(callback));
        self
    }

    /// Register an error callback, invoked once per failed task.
    pub fn subscribe_error<F>(&self, callback: F) -> &Self
    where
        F: Fn(&BatchError<A, B>) + Send + Sync + 'static,
    {
        lock(&self.error_subscribers).push(Arc::new(callback));
        self
    }

    /// Drop every progress callback.
    pub fn clear_progress_subscribers(&self) {
        lock(&self.progress_subscribers).clear();
    }

    /// Drop every error callback.
    pub fn clear_error_subscribers(&self) {
        lock(&self.error_subscribers).clear();
    }

    /// Stop starting new tasks. Tasks already executing run to completion.
    ///
    /// Has no lasting effect when no run is active.
    pub fn request_cancel(&self) {
        if self.cancel.request_cancel() {
            info!("Batch cancellation requested");
        }
    }

    /// Coordinator that a signal handler can use to cancel this instance.
    pub fn cancellation(&self) -> SharedCancellation {
        self.cancel.clone()
    }

    /// Whether a run is currently executing.
    pub fn is_active(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    /// Expand `config` into tasks and run them all through `executor`.
    ///
    /// Per-task failures are retried per the retry configuration and then
    /// recorded in [`BatchResult::errors`]; they never fail the run. Resolves
    /// after every started task finished.
    pub async fn run<O, E>(
        &self,
        config: BatchConfig<A, B, O>,
        executor: &E,
    ) -> Result<BatchResult<A, B, E::Output>, BatchRunError>
    where
        O: Send + Sync + 'static,
        E: TaskExecutor<A, B, O> + ?Sized,
    {
        config.validate()?;
        let mut guard = RunGuard::acquire(&self.state)?;
        // A request made while idle must not leak into this run
        self.cancel.reset();

        let run_id = generate_run_id();
        let tasks = TaskSource::expand(&config);
        let total = tasks.len();
        let scheduler = BoundedScheduler::new(config.parallel_limit, self.cancel.clone())?;

        info!(
            run_id = %run_id,
            total_tasks = total,
            parallel_limit = config.parallel_limit,
            max_attempts = self.retry.policy().max_attempts(),
            "Starting batch run"
        );

        let started_at = Utc::now();
        let clock = tokio::time::Instant::now();
        let mut tracker = RunTracker::new(self, total);

        let retry = &self.retry;
        let options = &config.options;
        let per_task = move |task: TaskDescriptor<A, B>| async move {
            let operation = task.to_string();
            let admit = || async move {
                match executor.rate_limiter() {
                    Some(limiter) => limiter.acquire().await.map_err(anyhow::Error::from),
                    None => Ok(()),
                }
            };
            retry
                .execute_admitted(&operation, admit, || executor.execute(&task, options))
                .await
        };

        let pass = scheduler.run_all(&tasks, per_task, &mut tracker).await;
        tracker.emit_progress(None);

        let duration = clock.elapsed();
        let finished_at = Utc::now();
        let result = BatchResult {
            run_id,
            total,
            succeeded: tracker.succeeded,
            failed: tracker.failed,
            results: tracker.results,
            errors: tracker.errors.into_inner(),
            started_at,
            finished_at,
            duration,
            cancelled: pass.cancelled,
        };

        if result.cancelled {
            warn!(
                run_id = %result.run_id,
                completed = result.completed(),
                skipped = result.skipped(),
                "Batch run cancelled"
            );
            guard.finish(RunState::Cancelled);
        } else {
            guard.finish(RunState::Completed);
        }

        info!(
            run_id = %result.run_id,
            succeeded = result.succeeded,
            failed = result.failed,
            duration_ms = duration.as_millis() as u64,
            peak_in_flight = pass.peak_in_flight,
            "Batch run finished"
        );

        Ok(result)
    }
}

/// Marks the instance as running for the lifetime of one `run` call.
///
/// If the run future is dropped mid-flight the state falls back to
/// [`RunState::Cancelled`] so the instance stays usable.
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
    outcome: RunState,
}

impl<'a> RunGuard<'a> {
    fn acquire(state: &'a Mutex<RunState>) -> Result<Self, BatchRunError> {
        let mut current = lock(state);
        if *current == RunState::Running {
            return Err(BatchRunError::AlreadyRunning);
        }
        *current = RunState::Running;
        Ok(Self {
            state,
            outcome: RunState::Cancelled,
        })
    }

    fn finish(&mut self, outcome: RunState) {
        self.outcome = outcome;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *lock(self.state) = self.outcome;
    }
}

/// Scheduler observer holding the mutable bookkeeping of one run.
struct RunTracker<'a, A, B, T> {
    run: &'a BatchRun<A, B>,
    total: usize,
    completed: usize,
    succeeded: usize,
    failed: usize,
    estimator: ProgressEstimator,
    results: Vec<TaskOutput<A, B, T>>,
    errors: ErrorAccumulator<A, B>,
    task_metrics: HashMap<usize, TaskMetrics>,
}

impl<'a, A: Dimension, B: Dimension, T> RunTracker<'a, A, B, T> {
    fn new(run: &'a BatchRun<A, B>, total: usize) -> Self {
        Self {
            run,
            total,
            completed: 0,
            succeeded: 0,
            failed: 0,
            estimator: ProgressEstimator::new(),
            results: Vec::with_capacity(total),
            errors: ErrorAccumulator::new(),
            task_metrics: HashMap::new(),
        }
    }

    fn emit_progress(&self, current: Option<TaskDescriptor<A, B>>) {
        let progress = BatchProgress {
            completed: self.completed,
            total: self.total,
            percentage: BatchProgress::<A, B>::percentage_of(self.completed, self.total),
            current,
            success_count: self.succeeded,
            failure_count: self.failed,
            estimated_remaining: self.estimator.estimate(self.total - self.completed),
        };
        debug!("{}", progress.format_progress());
        dispatch(&self.run.progress_subscribers, &progress, "progress");
    }
}

impl<A: Dimension, B: Dimension, T> SchedulerObserver<A, B, T, RetryError>
    for RunTracker<'_, A, B, T>
{
    fn task_starting(&mut self, task: &TaskDescriptor<A, B>) {
        self.emit_progress(Some(task.clone()));
        self.task_metrics
            .insert(task.index, TaskMetrics::start(task.index));
    }

    fn task_finished(
        &mut self,
        task: TaskDescriptor<A, B>,
        outcome: Result<T, RetryError>,
        elapsed: Duration,
    ) {
        self.completed += 1;
        self.estimator.record(elapsed);
        let metrics = self.task_metrics.remove(&task.index);

        match outcome {
            Ok(value) => {
                self.succeeded += 1;
                if let Some(metrics) = metrics {
                    metrics.record_success();
                }
                self.results.push(TaskOutput {
                    task,
                    value,
                    elapsed,
                });
            }
            Err(cause) => {
                self.failed += 1;
                if let Some(metrics) = metrics {
                    metrics.record_failure(cause.is_retryable());
                }
                let failure = BatchError::new(task, cause);
                error!(
                    task_index = failure.task.index,
                    attempts = failure.cause.attempts(),
                    kind = %failure.cause.kind(),
                    error = %failure.message,
                    "Task failed"
                );
                dispatch(&self.run.error_subscribers, &failure, "error");
                self.errors.record(failure);
            }
        }
    }
}

/// Invoke every subscriber with `event`. A panicking subscriber is logged
/// and skipped; it never affects the run or the other subscribers.
fn dispatch<E>(subscribers: &Mutex<Vec<Subscriber<E>>>, event: &E, kind: &'static str) {
    // Snapshot so callbacks may subscribe or clear without deadlocking
    let snapshot: Vec<Subscriber<E>> = lock(subscribers).clone();
    for (position, callback) in snapshot.iter().enumerate() {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
            error!(
                subscriber = position,
                kind = kind,
                panic = %panic_message(panic.as_ref()),
                "Subscriber panicked, continuing"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
