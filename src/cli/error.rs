//! CLI error types and conversions

use crate::batch::BatchRunError;
use crate::executor::{ExecutorError, RateLimitError};

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Batch could not be started
    #[error("batch error: {0}")]
    BatchError(#[from] BatchRunError),

    /// Executor could not be built
    #[error("executor error: {0}")]
    ExecutorError(#[from] ExecutorError),

    /// Rate limiter could not be built
    #[error("rate limit error: {0}")]
    RateLimitError(#[from] RateLimitError),

    /// Output could not be serialized
    #[error("output error: {0}")]
    OutputError(#[from] serde_json::Error),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Every task of the batch failed
    #[error("all {total} tasks failed")]
    AllTasksFailed {
        /// Tasks in the batch
        total: usize,
    },
}
