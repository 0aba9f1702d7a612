//! Remote HTTP task executor
//!
//! Posts each task as JSON to a generation endpoint and returns the JSON
//! response body. Non-success statuses surface as
//! [`StatusError`](crate::retry::StatusError) so status signatures can
//! classify them; transport failures carry a "network error" context.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::rate_limit::RateLimiter;
use super::TaskExecutor;
use crate::batch::TaskDescriptor;
use crate::retry::StatusError;

/// Executor construction errors
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Endpoint is not an absolute http(s) URL
    #[error("invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint {
        /// Rejected URL
        url: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Request body sent for every task
#[derive(Debug, Serialize)]
struct TaskRequest<'a, A, B, O> {
    index: usize,
    dimension_a: &'a A,
    dimension_b: &'a B,
    options: &'a O,
}

/// Executes tasks by POSTing them to a remote endpoint
#[derive(Debug, Clone)]
pub struct HttpTaskExecutor {
    client: Client,
    endpoint: Url,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl HttpTaskExecutor {
    /// Create an executor posting to `endpoint`
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client
    /// * `endpoint` - Absolute http or https URL
    pub fn new(client: Client, endpoint: &str) -> Result<Self, ExecutorError> {
        let url = Url::parse(endpoint).map_err(|e| ExecutorError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ExecutorError::InvalidEndpoint {
                url: endpoint.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(Self {
            client,
            endpoint: url,
            rate_limiter: None,
        })
    }

    /// Throttle request starts through `limiter`
    ///
    /// Permits are acquired by the batch layer before each attempt, outside
    /// the attempt deadline.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Endpoint every task is posted to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl<A, B, O> TaskExecutor<A, B, O> for HttpTaskExecutor
where
    A: Serialize + Send + Sync + 'static,
    B: Serialize + Send + Sync + 'static,
    O: Serialize + Sync,
{
    type Output = Value;

    async fn execute(&self, task: &TaskDescriptor<A, B>, options: &O) -> anyhow::Result<Value> {
        let body = TaskRequest {
            index: task.index,
            dimension_a: &task.dimension_a,
            dimension_b: &task.dimension_b,
            options,
        };

        debug!(task_index = task.index, endpoint = %self.endpoint, "Posting task");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("network error posting task #{}", task.index))?;

        let status = response.status();
        if !status.is_success() {
            let reason = status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_lowercase();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    debug!(
                        task_index = task.index,
                        status = status.as_u16(),
                        error = %e,
                        "Failed to read error response body"
                    );
                    String::new()
                }
            };
            let message = if text.trim().is_empty() {
                reason
            } else {
                format!("{reason}: {}", text.trim())
            };
            return Err(StatusError::new(status.as_u16(), message).into());
        }

        response
            .json::<Value>()
            .await
            .with_context(|| format!("invalid response body for task #{}", task.index))
    }

    fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.rate_limiter.as_deref()
    }
}
