//! Bounded fill-on-completion scheduler
//!
//! Runs at most `parallel_limit` tasks at once on the calling task. Every
//! in-flight task is multiplexed through one [`FuturesUnordered`], so the
//! "slot available?" check, the start decision and all completion handling
//! happen in a single serialized loop and never race each other.
//!
//! A finished task frees its slot for the very next pending task without
//! waiting for siblings started alongside it.

use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info};

use super::task::TaskDescriptor;
use crate::cancel::SharedCancellation;
use crate::retry::ConfigError;

/// Lifecycle hooks driven by [`BoundedScheduler::run_all`].
///
/// Both hooks run inside the scheduler loop, never concurrently with each
/// other, so implementors can mutate their state without locking.
pub trait SchedulerObserver<A, B, T, E> {
    /// Called immediately before `task` starts executing.
    fn task_starting(&mut self, task: &TaskDescriptor<A, B>);

    /// Called once `task` reached a terminal outcome.
    fn task_finished(&mut self, task: TaskDescriptor<A, B>, outcome: Result<T, E>, elapsed: Duration);
}

/// What a scheduler pass accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePass {
    /// Tasks handed to the scheduler
    pub total: usize,
    /// Tasks that were started (and therefore finished)
    pub started: usize,
    /// Highest number of tasks observed executing at once
    pub peak_in_flight: usize,
    /// Whether cancellation kept some tasks from starting
    pub cancelled: bool,
}

/// Keeps up to `parallel_limit` tasks executing until the list is drained
/// or cancellation is requested.
#[derive(Debug, Clone)]
pub struct BoundedScheduler {
    parallel_limit: usize,
    cancel: SharedCancellation,
}

impl BoundedScheduler {
    /// Create a scheduler. `parallel_limit` must be at least 1.
    pub fn new(parallel_limit: usize, cancel: SharedCancellation) -> Result<Self, ConfigError> {
        if parallel_limit < 1 {
            return Err(ConfigError::InvalidParallelLimit(parallel_limit));
        }
        Ok(Self {
            parallel_limit,
            cancel,
        })
    }

    /// Configured concurrency cap.
    pub fn parallel_limit(&self) -> usize {
        self.parallel_limit
    }

    /// Run every task through `per_task`, reporting to `observer`.
    ///
    /// Tasks start in list order. Cancellation is checked before each start;
    /// tasks already executing always run to completion. Returns once the
    /// cursor is exhausted (or cancelled) and nothing is executing.
    pub async fn run_all<A, B, T, E, F, Fut, Obs>(
        &self,
        tasks: &[TaskDescriptor<A, B>],
        mut per_task: F,
        observer: &mut Obs,
    ) -> SchedulePass
    where
        A: Clone,
        B: Clone,
        F: FnMut(TaskDescriptor<A, B>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Obs: SchedulerObserver<A, B, T, E>,
    {
        let mut in_flight = FuturesUnordered::new();
        let mut cursor = 0usize;
        let mut peak_in_flight = 0usize;
        let mut cancel_logged = false;

        loop {
            while in_flight.len() < self.parallel_limit && cursor < tasks.len() {
                if self.cancel.is_cancel_requested() {
                    if !cancel_logged {
                        info!(
                            started = cursor,
                            total = tasks.len(),
                            in_flight = in_flight.len(),
                            "Cancellation observed - no further tasks will start"
                        );
                        cancel_logged = true;
                    }
                    break;
                }

                let task = tasks[cursor].clone();
                cursor += 1;

                observer.task_starting(&task);
                debug!(
                    task_index = task.index,
                    in_flight = in_flight.len() + 1,
                    "Starting task"
                );

                let operation = per_task(task.clone());
                in_flight.push(async move {
                    let started = Instant::now();
                    let outcome = operation.await;
                    (task, outcome, started.elapsed())
                });
                peak_in_flight = peak_in_flight.max(in_flight.len());
            }

            match in_flight.next().await {
                Some((task, outcome, elapsed)) => {
                    debug!(
                        task_index = task.index,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Task finished"
                    );
                    observer.task_finished(task, outcome, elapsed);
                }
                None => break,
            }
        }

        SchedulePass {
            total: tasks.len(),
            started: cursor,
            peak_in_flight,
            cancelled: cursor < tasks.len(),
        }
    }
}
