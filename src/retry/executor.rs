//! Retrying executor: timeout-bounded attempts with exponential backoff

use std::future::Future;

use tracing::{debug, info, warn};

use super::config::{ConfigError, RetryConfig};
use super::formatter::RetryContext;
use super::policy::{FailureKind, RetryPolicy};
use super::timeout::TimeoutGuard;
use super::RetryError;
use crate::metrics;

/// Executes one logical operation with up to `max_attempts` attempts.
#[derive(Debug, Clone)]
pub struct RetryingExecutor {
    policy: RetryPolicy,
    guard: TimeoutGuard,
}

impl RetryingExecutor {
    /// Validate `config` and build an executor from it.
    pub fn new(config: RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            policy: RetryPolicy::from_config(&config),
            guard: TimeoutGuard::new(config.attempt_timeout),
        })
    }

    /// Classification and backoff policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Per-attempt deadline guard in use.
    pub fn timeout_guard(&self) -> &TimeoutGuard {
        &self.guard
    }

    /// Run `operation` until it succeeds, fails fatally or attempts run out.
    ///
    /// `operation` is invoked fresh for every attempt, so each attempt issues
    /// a new request inside a new deadline window.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.execute_admitted(
            operation_name,
            || std::future::ready(Ok::<(), anyhow::Error>(())),
            operation,
        )
        .await
    }

    /// Like [`execute`](Self::execute), but awaits `admit` before every
    /// attempt.
    ///
    /// Time spent in `admit` (queueing for a rate-limit slot, say) is not
    /// part of the attempt deadline. An admission error counts as a failed
    /// attempt and is classified like any other cause.
    pub async fn execute_admitted<G, AdmitFut, F, Fut, T>(
        &self,
        operation_name: &str,
        mut admit: G,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        G: FnMut() -> AdmitFut,
        AdmitFut: Future<Output = anyhow::Result<()>>,
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt: u32 = 1;

        loop {
            metrics::record_attempt(attempt);
            debug!(
                operation = %operation_name,
                attempt = attempt,
                max_attempts = max_attempts,
                "Starting attempt"
            );

            let outcome = match admit().await {
                Ok(()) => self.guard.run(operation()).await,
                Err(cause) => Err(cause),
            };
            let cause = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        let ctx = RetryContext::new(
                            attempt,
                            max_attempts,
                            FailureKind::Transient,
                            Default::default(),
                            operation_name,
                            "",
                        );
                        info!("{}", ctx.format_success());
                    }
                    return Ok(value);
                }
                Err(cause) => cause,
            };

            let kind = self.policy.classify(&cause);
            if kind == FailureKind::Timeout {
                metrics::record_timeout();
            }

            if !kind.is_retryable() {
                let ctx = RetryContext::new(
                    attempt,
                    max_attempts,
                    kind,
                    Default::default(),
                    operation_name,
                    format!("{cause:#}"),
                );
                warn!("{}", ctx.format_failure());
                return Err(RetryError::Fatal {
                    operation: operation_name.to_string(),
                    attempts: attempt,
                    cause,
                });
            }

            if attempt >= max_attempts {
                let ctx = RetryContext::new(
                    attempt,
                    max_attempts,
                    kind,
                    Default::default(),
                    operation_name,
                    format!("{cause:#}"),
                );
                warn!("{}", ctx.format_failure());
                return Err(RetryError::Exhausted {
                    operation: operation_name.to_string(),
                    attempts: attempt,
                    kind,
                    cause,
                });
            }

            let backoff = self.policy.delay_for(attempt);
            let ctx = RetryContext::new(
                attempt,
                max_attempts,
                kind,
                backoff,
                operation_name,
                format!("{cause:#}"),
            );
            warn!(
                operation = %operation_name,
                attempt = attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %format!("{cause:#}"),
                "{}",
                ctx.format_retry()
            );
            metrics::record_retry_backoff(backoff, attempt);

            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}
