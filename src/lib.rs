//! # Batch Generator Library
//!
//! Fans out many independent "generate one artifact" requests against a
//! rate-limited, occasionally failing remote API. Work runs under a
//! concurrency cap, survives partial failures and reports live progress.
//!
//! ## Features
//!
//! - **Retry with Backoff**: Timeout-bounded attempts, signature-based
//!   transient/fatal classification and capped exponential backoff
//! - **Bounded Parallelism**: Fill-on-completion scheduling that keeps every
//!   slot busy under heterogeneous task latency
//! - **Partial-Failure Isolation**: Failed tasks become [`batch::BatchError`]
//!   records, the batch always runs to completion
//! - **Progress & ETA**: Running-mean duration estimate emitted before each
//!   task start
//! - **Cooperative Cancellation**: Stops new task starts, in-flight tasks
//!   finish naturally
//!
//! ## Quick Start
//!
//! ```no_run
//! use batch_generator::batch::{BatchConfig, BatchRun, TaskDescriptor};
//! use batch_generator::executor::executor_fn;
//! use batch_generator::retry::RetryConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let run = BatchRun::new(RetryConfig::default())?;
//! run.subscribe_progress(|progress: &batch_generator::BatchProgress<String, String>| {
//!     println!("{}", progress.format_progress())
//! });
//!
//! let config = BatchConfig::new(
//!     vec!["goryeo".to_string(), "joseon".to_string()],
//!     vec!["politics".to_string(), "culture".to_string()],
//!     (),
//! )
//! .with_parallel_limit(3);
//!
//! let executor = executor_fn(|task: TaskDescriptor<String, String>| async move {
//!     Ok::<_, anyhow::Error>(format!("artifact for {}/{}", task.dimension_a, task.dimension_b))
//! });
//!
//! let result = run.run(config, &executor).await?;
//! println!("{}", result.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`retry`] - Retry policy, timeout guard and the retrying executor
//! - [`batch`] - Task expansion, bounded scheduler, progress, errors and the
//!   [`batch::BatchRun`] facade
//! - [`executor`] - The collaborator seam ([`executor::TaskExecutor`]) and a
//!   reqwest-backed remote implementation
//! - [`cancel`] - Cancellation coordination shared with signal handlers
//! - [`metrics`] - Counters and histograms for retries and task outcomes

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::fmt::{Debug, Display};

/// Batch orchestration: task expansion, scheduling, progress and results
pub mod batch;

/// Cooperative cancellation shared across tasks
pub mod cancel;

/// CLI command implementations
pub mod cli;

/// Task executor collaborators
pub mod executor;

/// Observability metrics
pub mod metrics;

/// Retry policy and retrying executor
pub mod retry;

// Re-export commonly used types
pub use batch::{BatchConfig, BatchProgress, BatchResult, BatchRun, TaskDescriptor};
pub use executor::TaskExecutor;
pub use retry::{RetryConfig, RetryError};

/// A value along one batch dimension (e.g. a category or a topic).
///
/// Blanket-implemented for every type that is cheap to clone, printable and
/// shareable across tasks.
pub trait Dimension: Clone + Debug + Display + Send + Sync + 'static {}

impl<T> Dimension for T where T: Clone + Debug + Display + Send + Sync + 'static {}
