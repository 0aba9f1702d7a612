//! Batch orchestration
//!
//! This module fans a batch of independent tasks out over a bounded pool of
//! concurrent slots and aggregates the outcome.
//!
//! # Overview
//!
//! 1. **Expansion**: [`task::TaskSource`] turns a [`config::BatchConfig`] into
//!    an ordered list of [`task::TaskDescriptor`]s (dimension A outer,
//!    dimension B inner)
//! 2. **Scheduling**: [`scheduler::BoundedScheduler`] keeps at most
//!    `parallel_limit` tasks executing, starting the next task as soon as a
//!    slot frees
//! 3. **Retry**: every task goes through the
//!    [`RetryingExecutor`](crate::retry::RetryingExecutor)
//! 4. **Progress**: [`progress::ProgressEstimator`] keeps a running mean of
//!    task durations for [`progress::BatchProgress`] events
//! 5. **Errors**: [`errors::ErrorAccumulator`] collects one
//!    [`errors::BatchError`] per failed task; the batch keeps going
//! 6. **Facade**: [`run::BatchRun`] wires it together and returns a
//!    [`run::BatchResult`]
//!
//! # Error Handling
//!
//! Per-task failures never abort a run. Only structural misuse surfaces as a
//! [`BatchRunError`]:
//! - [`BatchRunError::AlreadyRunning`] when runs overlap on one instance
//! - [`BatchRunError::InvalidConfig`] for out-of-range configuration

pub mod config;
pub mod errors;
pub mod progress;
pub mod run;
pub mod scheduler;
pub mod task;

pub use config::{BatchConfig, DEFAULT_PARALLEL_LIMIT, MAX_PARALLEL_LIMIT};
pub use errors::{BatchError, ErrorAccumulator};
pub use progress::{BatchProgress, ProgressEstimator};
pub use run::{BatchResult, BatchRun, RunState};
pub use scheduler::{BoundedScheduler, SchedulerObserver};
pub use task::{TaskDescriptor, TaskOutput, TaskSource};

use crate::retry::ConfigError;

/// Structural errors raised synchronously by [`BatchRun::run`]
#[derive(Debug, thiserror::Error)]
pub enum BatchRunError {
    /// A previous run on the same instance has not resolved yet
    #[error("a batch run is already in progress on this instance")]
    AlreadyRunning,

    /// Configuration out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}
