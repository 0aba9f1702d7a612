//! Retry message formatting.
//!
//! Keeps retry, recovery and final-failure log lines consistent across every
//! operation the [`RetryingExecutor`](super::RetryingExecutor) drives.

use std::time::Duration;

use super::policy::FailureKind;

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Classification of the failure that triggered the message
    pub kind: FailureKind,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Logical operation name (e.g., "task #4 goryeo/culture")
    pub operation: String,
    /// Original error message for details
    pub error_message: String,
}

impl RetryContext {
    /// Convenience constructor used by the retry loop.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        kind: FailureKind,
        backoff_duration: Duration,
        operation: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            kind,
            backoff_duration,
            operation: operation.into(),
            error_message: error_message.into(),
        }
    }

    /// Standardized retry message with attempt counters and wait time.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying {} (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.operation,
            self.attempt,
            self.max_attempts,
            self.kind.description(),
            self.backoff_duration.as_secs_f64()
        )
    }

    /// Message logged when a later attempt eventually succeeds.
    pub fn format_success(&self) -> String {
        format!(
            "Attempt {}/{} of {} succeeded",
            self.attempt, self.max_attempts, self.operation
        )
    }

    /// Final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "[FAILED] {} failed after {} attempt(s)",
            self.operation, self.attempt
        ));
        lines.push(format!("  Last error: {}", self.error_message));
        lines.push(format!("  Classification: {}", self.kind.description()));
        lines.push("  Suggestions:".to_string());

        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }

        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        let mut suggestions = vec![self.kind.suggestion().to_string()];
        if self.kind.is_retryable() {
            suggestions.push(format!(
                "Try increasing --max-attempts (current: {})",
                self.max_attempts
            ));
        }
        suggestions
    }
}
