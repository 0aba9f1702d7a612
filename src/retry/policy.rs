//! Failure classification and backoff calculation
//!
//! [`RetryPolicy`] is pure computation: it never sleeps and performs no I/O,
//! so classification and delays can be tested in isolation.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::config::RetryConfig;
use super::{StatusError, TimeoutError};

/// Classification of a single failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The attempt exceeded its deadline
    Timeout,
    /// The failure matched a configured transient signature
    Transient,
    /// Any other failure; never retried
    Fatal,
}

impl FailureKind {
    /// Whether failures of this kind are retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Fatal)
    }

    /// Short label used inside log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transient => "transient failure",
            Self::Fatal => "fatal error",
        }
    }

    /// Suggested remediation shown after the final failure.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Timeout => "Increase the attempt timeout or check remote API latency",
            Self::Transient => {
                "The remote API is throttling or unavailable; lower the parallel limit or wait longer"
            }
            Self::Fatal => "Check the request payload and credentials; retrying will not help",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A pattern identifying a transient failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorSignature {
    /// Case-insensitive fragment of the error message chain
    Substring(String),
    /// Remote status code
    Status(u16),
}

impl ErrorSignature {
    /// Message fragment signature, stored lowercase.
    pub fn substring(fragment: impl AsRef<str>) -> Self {
        Self::Substring(fragment.as_ref().to_lowercase())
    }

    fn matches(&self, message: &str, status: Option<u16>) -> bool {
        match self {
            Self::Substring(fragment) => !fragment.is_empty() && message.contains(fragment.as_str()),
            Self::Status(code) => status == Some(*code),
        }
    }
}

impl FromStr for ErrorSignature {
    type Err = String;

    /// Parses `status:<code>` as a status signature, anything else as a
    /// message fragment.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(code) = s.strip_prefix("status:") {
            return code
                .trim()
                .parse::<u16>()
                .map(ErrorSignature::Status)
                .map_err(|_| format!("invalid status code in signature: {s}"));
        }
        if s.is_empty() {
            return Err("signature must not be empty".to_string());
        }
        Ok(ErrorSignature::substring(s))
    }
}

impl fmt::Display for ErrorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Substring(fragment) => f.write_str(fragment),
            Self::Status(code) => write!(f, "status:{code}"),
        }
    }
}

/// Retry decisions and backoff delays derived from a [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    signatures: Vec<ErrorSignature>,
}

impl RetryPolicy {
    /// Build a policy from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            backoff_multiplier: config.backoff_multiplier,
            signatures: config.retryable_signatures.clone(),
        }
    }

    /// Total attempts allowed per operation.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Classify a failed attempt.
    ///
    /// Deadline overruns are always [`FailureKind::Timeout`]. Otherwise the
    /// full error chain is matched against the configured signatures.
    pub fn classify(&self, error: &anyhow::Error) -> FailureKind {
        if is_timeout(error) {
            return FailureKind::Timeout;
        }

        let message = format!("{error:#}").to_lowercase();
        let status = status_of(error);
        if self
            .signatures
            .iter()
            .any(|signature| signature.matches(&message, status))
        {
            return FailureKind::Transient;
        }

        FailureKind::Fatal
    }

    /// Whether another attempt should follow the failed `attempt` (1-based).
    pub fn should_retry(&self, error: &anyhow::Error, attempt: u32) -> bool {
        attempt < self.max_attempts && self.classify(error).is_retryable()
    }

    /// Delay to wait after failed attempt `attempt` (1-based):
    /// `min(initial_delay * multiplier^(attempt-1), max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nanos = self.initial_delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);

        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos as u64)
    }
}

fn is_timeout(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.is::<TimeoutError>()
            || cause
                .downcast_ref::<reqwest::Error>()
                .is_some_and(|e| e.is_timeout())
    })
}

fn status_of(error: &anyhow::Error) -> Option<u16> {
    error.chain().find_map(|cause| {
        if let Some(status) = cause.downcast_ref::<StatusError>() {
            return Some(status.status);
        }
        cause
            .downcast_ref::<reqwest::Error>()
            .and_then(|e| e.status())
            .map(|s| s.as_u16())
    })
}
