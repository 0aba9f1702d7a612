//! Observability metrics for batch runs
//!
//! This module records retry behavior, timeouts and per-task outcomes so a
//! long batch against a throttled API can be monitored while it runs.
//!
//! ## Architecture
//!
//! - Uses the `metrics` crate facade; without an installed recorder every
//!   call is a cheap no-op
//! - Optional Prometheus exporter for a scrape endpoint (e.g. :9090/metrics)
//! - Only the binary installs the exporter; the library never does

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Run ID generator for log correlation
static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics system with Prometheus exporter
///
/// The function is idempotent and will not reinitialize if already called.
///
/// # Arguments
/// * `addr` - Socket address to bind Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "operation_attempts_total",
        Unit::Count,
        "Total number of attempts issued to the remote API"
    );

    describe_counter!(
        "operation_retries_total",
        Unit::Count,
        "Total number of retries after a transient failure"
    );

    describe_counter!(
        "operation_timeouts_total",
        Unit::Count,
        "Total number of attempts that exceeded their deadline"
    );

    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );

    describe_counter!(
        "batch_tasks_started_total",
        Unit::Count,
        "Total number of batch tasks started"
    );

    describe_counter!(
        "batch_tasks_succeeded_total",
        Unit::Count,
        "Total number of batch tasks that produced an artifact"
    );

    describe_counter!(
        "batch_tasks_failed_total",
        Unit::Count,
        "Total number of batch tasks that ended in an error"
    );

    describe_gauge!(
        "batch_tasks_in_flight",
        Unit::Count,
        "Batch tasks currently executing"
    );

    describe_histogram!(
        "task_duration_seconds",
        Unit::Seconds,
        "Wall-clock duration of a batch task, retries included"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Generate a new run ID for log correlation
pub fn generate_run_id() -> String {
    let id = RUN_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("run-{id:08x}")
}

/// Record one attempt against the remote API
pub fn record_attempt(attempt: u32) {
    counter!(
        "operation_attempts_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);
}

/// Record an attempt that exceeded its deadline
pub fn record_timeout() {
    counter!("operation_timeouts_total").increment(1);
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "operation_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!(
        "retry_backoff_duration_seconds",
        "attempt" => attempt.to_string(),
    )
    .record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Per-task metrics, started when the scheduler launches a task
///
/// The in-flight gauge is released on drop, so a task abandoned with its
/// run future still leaves the gauge balanced.
pub struct TaskMetrics {
    task_index: usize,
    start_time: Instant,
}

impl TaskMetrics {
    /// Start tracking a task
    pub fn start(task_index: usize) -> Self {
        counter!("batch_tasks_started_total").increment(1);
        gauge!("batch_tasks_in_flight").increment(1.0);

        Self {
            task_index,
            start_time: Instant::now(),
        }
    }

    /// Record successful task completion
    pub fn record_success(self) {
        counter!("batch_tasks_succeeded_total").increment(1);
        self.finish("success");
    }

    /// Record a failed task
    pub fn record_failure(self, retryable: bool) {
        counter!(
            "batch_tasks_failed_total",
            "retryable" => retryable.to_string(),
        )
        .increment(1);
        self.finish("failure");
    }

    fn finish(self, outcome: &'static str) {
        let duration = self.start_time.elapsed();
        histogram!("task_duration_seconds", "outcome" => outcome).record(duration.as_secs_f64());

        debug!(
            task_index = self.task_index,
            outcome = outcome,
            duration_ms = duration.as_millis() as u64,
            "Task metrics recorded"
        );
    }
}

impl Drop for TaskMetrics {
    fn drop(&mut self) {
        gauge!("batch_tasks_in_flight").decrement(1.0);
    }
}
