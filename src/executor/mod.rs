//! Task executor collaborators
//!
//! A [`TaskExecutor`] performs the actual work for one task, typically a
//! single request to a remote generation API. It knows nothing about
//! retries, timeouts or scheduling; the batch layer wraps every call.

use std::future::Future;

use async_trait::async_trait;

use crate::batch::TaskDescriptor;

pub mod http;
pub mod rate_limit;

pub use http::{ExecutorError, HttpTaskExecutor};
pub use rate_limit::{RateLimitError, RateLimiter};

/// Performs the work for one task
///
/// Errors are returned as [`anyhow::Error`]. The retry policy classifies
/// them by message substrings and by any [`StatusError`](crate::retry::StatusError)
/// in the error chain.
#[async_trait]
pub trait TaskExecutor<A, B, O>: Send + Sync {
    /// Value produced by a successful task
    type Output: Send + 'static;

    /// Execute `task` once with the batch-wide `options`
    ///
    /// # Arguments
    /// * `task` - Descriptor of the task being executed
    /// * `options` - Opaque options shared by every task of the batch
    async fn execute(&self, task: &TaskDescriptor<A, B>, options: &O) -> anyhow::Result<Self::Output>;

    /// Limiter the batch layer must pass before every attempt
    ///
    /// The permit wait happens outside the attempt deadline, so a task
    /// queued locally never times out before its request is sent.
    fn rate_limiter(&self) -> Option<&RateLimiter> {
        None
    }
}

/// Adapts an async closure into a [`TaskExecutor`] that ignores options.
pub struct FnExecutor<F> {
    operation: F,
}

/// Build a [`TaskExecutor`] from an async closure taking the task by value.
pub fn executor_fn<A, B, F, Fut, T>(operation: F) -> FnExecutor<F>
where
    F: Fn(TaskDescriptor<A, B>) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    FnExecutor { operation }
}

#[async_trait]
impl<A, B, O, F, Fut, T> TaskExecutor<A, B, O> for FnExecutor<F>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    O: Sync,
    F: Fn(TaskDescriptor<A, B>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<T>> + Send,
    T: Send + 'static,
{
    type Output = T;

    async fn execute(&self, task: &TaskDescriptor<A, B>, _options: &O) -> anyhow::Result<T> {
        (self.operation)(task.clone()).await
    }
}
