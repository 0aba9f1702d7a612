//! Per-task failure records and their accumulator

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::task::TaskDescriptor;
use crate::retry::RetryError;

/// One failed task, recorded after retries ran out or a fatal error hit.
#[derive(Debug, Clone)]
pub struct BatchError<A, B> {
    /// Task that failed
    pub task: TaskDescriptor<A, B>,
    /// Rendered error message, including the cause chain
    pub message: String,
    /// Final classified error
    pub cause: Arc<RetryError>,
    /// When the failure was recorded
    pub occurred_at: DateTime<Utc>,
}

impl<A, B> BatchError<A, B> {
    /// Record a failure of `task` happening now.
    pub fn new(task: TaskDescriptor<A, B>, cause: RetryError) -> Self {
        Self {
            task,
            message: cause.to_string(),
            cause: Arc::new(cause),
            occurred_at: Utc::now(),
        }
    }

    /// Whether the final failure was retryable (retries exhausted).
    pub fn is_retryable(&self) -> bool {
        self.cause.is_retryable()
    }
}

/// Thread-safe, append-only list of [`BatchError`]s in arrival order.
#[derive(Debug)]
pub struct ErrorAccumulator<A, B> {
    errors: Mutex<Vec<BatchError<A, B>>>,
}

impl<A, B> Default for ErrorAccumulator<A, B> {
    fn default() -> Self {
        Self {
            errors: Mutex::new(Vec::new()),
        }
    }
}

impl<A: Clone, B: Clone> ErrorAccumulator<A, B> {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error. Never fails, even if a previous holder panicked.
    pub fn record(&self, error: BatchError<A, B>) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }

    /// Snapshot of all errors in arrival order.
    pub fn all(&self) -> Vec<BatchError<A, B>> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded errors.
    pub fn len(&self) -> usize {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no error has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the accumulator, returning the errors in arrival order.
    pub fn into_inner(self) -> Vec<BatchError<A, B>> {
        self.errors
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
