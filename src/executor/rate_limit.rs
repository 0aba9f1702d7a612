//! Request-window rate limiting
//!
//! Caps how many requests may start within a sliding window. A permit is
//! held for the full window after it is acquired, so at most `max_requests`
//! requests start in any window-sized interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// Limits request starts per time window
#[derive(Debug, Clone)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    /// Create a limiter
    ///
    /// # Arguments
    /// * `max_requests` - Maximum requests per window (at least 1)
    /// * `window` - Time window for the limit
    pub fn per_window(max_requests: usize, window: Duration) -> Result<Self, RateLimitError> {
        if max_requests == 0 {
            return Err(RateLimitError::ZeroCapacity);
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(max_requests)),
            max_requests,
            window,
        })
    }

    /// Limiter allowing `max_requests` per minute
    pub fn per_minute(max_requests: usize) -> Result<Self, RateLimitError> {
        Self::per_window(max_requests, Duration::from_secs(60))
    }

    /// Configured requests per window
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Configured window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Permits currently available without waiting
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a request slot
    ///
    /// The permit is released automatically once the window elapses.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::AcquireError(e.to_string()))?;

        let window = self.window;
        tokio::spawn(async move {
            sleep(window).await;
            drop(permit);
        });

        Ok(())
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// A limiter must allow at least one request per window
    #[error("rate limit must allow at least one request per window")]
    ZeroCapacity,

    /// Failed to acquire a permit
    #[error("failed to acquire rate limit permit: {0}")]
    AcquireError(String),
}
