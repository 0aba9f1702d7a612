//! Per-attempt deadline enforcement

use std::future::Future;
use std::time::Duration;

/// A single attempt exceeded its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation timed out after {}ms", .0.as_millis())]
pub struct TimeoutError(pub Duration);

/// Races an operation against a timer.
///
/// When the timer wins the operation future is dropped, so the caller never
/// waits on the straggler. Whatever the remote side does with an abandoned
/// request is not observed.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    timeout: Duration,
}

impl TimeoutGuard {
    /// Create a guard with the given deadline.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Configured deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `operation`, converting a deadline overrun into [`TimeoutError`].
    pub async fn run<F, T>(&self, operation: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(TimeoutError(self.timeout).into()),
        }
    }
}
