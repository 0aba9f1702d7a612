//! Retry configuration constants and validation

use std::time::Duration;

use super::policy::ErrorSignature;

/// Default number of attempts per operation (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Initial backoff delay in milliseconds.
/// 1 second is long enough for most rate limit windows to start draining.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

/// Maximum backoff delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Growth factor applied per attempt.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Hard deadline for a single attempt in milliseconds.
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 30_000;

/// Message fragments that mark a failure as transient.
pub const DEFAULT_TRANSIENT_SUBSTRINGS: &[&str] = &[
    "rate limit",
    "quota exceeded",
    "too many requests",
    "service unavailable",
    "internal server error",
    "timeout",
    "network error",
    "econnreset",
    "econnrefused",
    "503",
    "429",
    "500",
];

/// Status codes that mark a failure as transient.
pub const DEFAULT_TRANSIENT_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Build the default transient signature set.
pub fn default_signatures() -> Vec<ErrorSignature> {
    DEFAULT_TRANSIENT_SUBSTRINGS
        .iter()
        .map(|s| ErrorSignature::substring(*s))
        .chain(
            DEFAULT_TRANSIENT_STATUSES
                .iter()
                .map(|code| ErrorSignature::Status(*code)),
        )
        .collect()
}

/// Invalid configuration values
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// max_attempts must be at least 1
    #[error("max_attempts must be at least 1 (got {0})")]
    InvalidMaxAttempts(u32),

    /// backoff_multiplier must be finite and at least 1.0
    #[error("backoff_multiplier must be a finite value >= 1.0 (got {0})")]
    InvalidBackoffMultiplier(f64),

    /// initial_delay must not exceed max_delay
    #[error("initial_delay {initial:?} exceeds max_delay {max:?}")]
    InvalidDelays {
        /// Configured initial delay
        initial: Duration,
        /// Configured maximum delay
        max: Duration,
    },

    /// attempt_timeout must be non-zero
    #[error("attempt_timeout must be greater than zero")]
    ZeroTimeout,

    /// parallel_limit must be at least 1
    #[error("parallel_limit must be at least 1 (got {0})")]
    InvalidParallelLimit(usize),
}

/// Retry configuration. Immutable once handed to a
/// [`RetryingExecutor`](super::RetryingExecutor).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per operation, first try included
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single backoff delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
    /// Hard deadline for each attempt
    pub attempt_timeout: Duration,
    /// Signatures that mark a failure as transient
    pub retryable_signatures: Vec<ErrorSignature>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            attempt_timeout: Duration::from_millis(DEFAULT_ATTEMPT_TIMEOUT_MS),
            retryable_signatures: default_signatures(),
        }
    }
}

impl RetryConfig {
    /// Set the total number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the delay before the second attempt
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the backoff cap
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff growth factor
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the per-attempt deadline
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Replace the whole signature set
    pub fn with_signatures(mut self, signatures: Vec<ErrorSignature>) -> Self {
        self.retryable_signatures = signatures;
        self
    }

    /// Add one signature to the current set
    pub fn with_signature(mut self, signature: ErrorSignature) -> Self {
        self.retryable_signatures.push(signature);
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::InvalidMaxAttempts(self.max_attempts));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidBackoffMultiplier(
                self.backoff_multiplier,
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(ConfigError::InvalidDelays {
                initial: self.initial_delay,
                max: self.max_delay,
            });
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}
