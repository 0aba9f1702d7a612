//! Retry policy, timeout guard and the retrying executor
//!
//! This module turns one fallible asynchronous operation into a bounded
//! sequence of attempts against a remote API that is rate-limited and
//! occasionally unavailable.
//!
//! # Overview
//!
//! 1. **Policy**: [`policy::RetryPolicy`] classifies a failure as timeout,
//!    transient or fatal and computes the backoff for attempt *k*
//! 2. **Deadline**: [`timeout::TimeoutGuard`] bounds every attempt with a hard
//!    deadline and reports overruns as [`timeout::TimeoutError`]
//! 3. **Execution**: [`executor::RetryingExecutor`] composes both, invoking a
//!    fresh operation per attempt and sleeping between retryable failures
//!
//! # Quick Start
//!
//! ```no_run
//! use batch_generator::retry::{RetryConfig, RetryingExecutor};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = RetryingExecutor::new(
//!     RetryConfig::default()
//!         .with_max_attempts(4)
//!         .with_attempt_timeout(Duration::from_secs(10)),
//! )?;
//!
//! let value = executor
//!     .execute("fetch artifact", || async { Ok::<_, anyhow::Error>(42) })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Failures surface as [`RetryError`]:
//! - Fatal errors (no signature matched) surface on the first occurrence
//! - Timeouts and transient errors are retried until attempts run out,
//!   then surface as [`RetryError::Exhausted`]

pub mod config;
pub mod executor;
pub mod formatter;
pub mod policy;
pub mod timeout;

pub use config::{ConfigError, RetryConfig};
pub use executor::RetryingExecutor;
pub use policy::{ErrorSignature, FailureKind, RetryPolicy};
pub use timeout::{TimeoutError, TimeoutGuard};

/// Failure carrying a remote status code, raised by collaborators so that
/// status signatures can classify it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("HTTP {status}: {message}")]
pub struct StatusError {
    /// Status code reported by the remote API
    pub status: u16,
    /// Response body or reason phrase
    pub message: String,
}

impl StatusError {
    /// Create a status error.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Final outcome of a failed retrying execution
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// The error matched no transient signature and was not retried
    #[error("{operation} failed: {cause:#}")]
    Fatal {
        /// Name of the logical operation
        operation: String,
        /// Attempts made before giving up
        attempts: u32,
        /// Underlying error of the last attempt
        #[source]
        cause: anyhow::Error,
    },

    /// Every attempt failed with a retryable error
    #[error("{operation} failed after {attempts} attempts: {cause:#}")]
    Exhausted {
        /// Name of the logical operation
        operation: String,
        /// Attempts made before giving up
        attempts: u32,
        /// Classification of the last failure
        kind: FailureKind,
        /// Underlying error of the last attempt
        #[source]
        cause: anyhow::Error,
    },
}

impl RetryError {
    /// Name of the operation that failed.
    pub fn operation(&self) -> &str {
        match self {
            Self::Fatal { operation, .. } | Self::Exhausted { operation, .. } => operation,
        }
    }

    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Classification of the last failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Fatal { .. } => FailureKind::Fatal,
            Self::Exhausted { kind, .. } => *kind,
        }
    }

    /// Whether the last failure was retryable (true when attempts ran out).
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Underlying error of the last attempt.
    pub fn cause(&self) -> &anyhow::Error {
        match self {
            Self::Fatal { cause, .. } | Self::Exhausted { cause, .. } => cause,
        }
    }

    /// Whether the last failure was a deadline overrun.
    pub fn is_timeout(&self) -> bool {
        self.kind() == FailureKind::Timeout
    }
}
