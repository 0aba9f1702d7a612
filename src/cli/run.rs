//! Run command implementation
//!
//! Expands `--categories` x `--topics` into a batch and posts every task to a
//! remote generation endpoint under the configured concurrency cap.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{info, warn};

use super::CliError;
use crate::batch::{
    BatchConfig, BatchError, BatchProgress, BatchResult, BatchRun, DEFAULT_PARALLEL_LIMIT,
    MAX_PARALLEL_LIMIT,
};
use crate::cancel::SharedCancellation;
use crate::executor::{HttpTaskExecutor, RateLimiter};
use crate::retry::{config as retry_defaults, ErrorSignature, RetryConfig};

/// Parse and validate the parallel limit
fn parse_parallel_limit(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("parallel limit must be at least 1".to_string());
    }
    if value > MAX_PARALLEL_LIMIT {
        return Err(format!(
            "parallel limit {value} exceeds maximum of {MAX_PARALLEL_LIMIT}"
        ));
    }
    Ok(value)
}

/// Batch generator CLI
#[derive(Parser, Debug)]
#[command(name = "batch-generator")]
#[command(about = "Fan out artifact generation requests with retries and bounded parallelism", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Number of tasks executing at once (default: 5, max: 32)
    ///
    /// The remote API is rate limited; values above 8 mostly trade retries
    /// for throughput.
    #[arg(long, global = true, default_value_t = DEFAULT_PARALLEL_LIMIT, value_parser = parse_parallel_limit)]
    pub parallel_limit: usize,

    /// Attempts per task, first try included (default: 3, range: 1-20)
    #[arg(long, global = true, default_value_t = retry_defaults::DEFAULT_MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: u32,

    /// Backoff before the first retry, in milliseconds
    #[arg(long, global = true, default_value_t = retry_defaults::DEFAULT_INITIAL_DELAY_MS)]
    pub initial_delay_ms: u64,

    /// Upper bound for any backoff, in milliseconds
    #[arg(long, global = true, default_value_t = retry_defaults::DEFAULT_MAX_DELAY_MS)]
    pub max_delay_ms: u64,

    /// Backoff growth factor per attempt
    #[arg(long, global = true, default_value_t = retry_defaults::DEFAULT_BACKOFF_MULTIPLIER)]
    pub backoff_multiplier: f64,

    /// Hard deadline per attempt, in milliseconds
    #[arg(long, global = true, default_value_t = retry_defaults::DEFAULT_ATTEMPT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Extra transient signature: a message fragment or `status:NNN` (repeatable)
    #[arg(long = "retry-on", global = true)]
    pub retry_on: Vec<ErrorSignature>,

    /// Expose Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Retry configuration assembled from the global flags
    pub fn retry_config(&self) -> RetryConfig {
        let mut config = RetryConfig::default()
            .with_max_attempts(self.max_attempts)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_multiplier(self.backoff_multiplier)
            .with_attempt_timeout(Duration::from_millis(self.timeout_ms));
        for signature in &self.retry_on {
            config = config.with_signature(signature.clone());
        }
        config
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate one artifact per category/topic pair
    Run(RunArgs),

    /// Print the task list a run would execute, without executing it
    Plan(super::PlanArgs),
}

/// Batch dimensions shared by `run` and `plan`
#[derive(Args, Debug, Clone)]
pub struct DimensionArgs {
    /// Outer dimension, comma-separated (e.g. goryeo,joseon)
    #[arg(long, value_delimiter = ',', required = true)]
    pub categories: Vec<String>,

    /// Inner dimension, comma-separated (e.g. politics,culture)
    #[arg(long, value_delimiter = ',', required = true)]
    pub topics: Vec<String>,
}

impl DimensionArgs {
    /// Trimmed, non-empty dimension values
    pub fn dimensions(&self) -> Result<(Vec<String>, Vec<String>), CliError> {
        let categories = clean_values(&self.categories, "categories")?;
        let topics = clean_values(&self.topics, "topics")?;
        Ok((categories, topics))
    }
}

fn clean_values(values: &[String], name: &str) -> Result<Vec<String>, CliError> {
    let cleaned: Vec<String> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    if cleaned.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "--{name} needs at least one non-empty value"
        )));
    }
    Ok(cleaned)
}

/// Run command arguments
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Batch dimensions
    #[command(flatten)]
    pub dimensions: DimensionArgs,

    /// Generation endpoint every task is POSTed to
    #[arg(long)]
    pub endpoint: String,

    /// JSON object forwarded to the endpoint as `options` with every task
    #[arg(long)]
    pub options_json: Option<String>,

    /// Maximum requests started per minute
    #[arg(long)]
    pub rate_limit: Option<usize>,
}

impl RunArgs {
    /// Parsed `--options-json`, defaulting to an empty object
    pub fn options(&self) -> Result<Value, CliError> {
        match &self.options_json {
            None => Ok(Value::Object(serde_json::Map::new())),
            Some(raw) => {
                let value: Value = serde_json::from_str(raw).map_err(|e| {
                    CliError::InvalidArgument(format!("--options-json is not valid JSON: {e}"))
                })?;
                if !value.is_object() {
                    return Err(CliError::InvalidArgument(
                        "--options-json must be a JSON object".to_string(),
                    ));
                }
                Ok(value)
            }
        }
    }

    /// Execute the run command
    pub async fn execute(&self, cli: &Cli, signal: SharedCancellation) -> Result<(), CliError> {
        let (categories, topics) = self.dimensions.dimensions()?;
        let options = self.options()?;

        let mut executor = HttpTaskExecutor::new(reqwest::Client::new(), &self.endpoint)?;
        if let Some(per_minute) = self.rate_limit {
            executor = executor.with_rate_limiter(Arc::new(RateLimiter::per_minute(per_minute)?));
        }

        let run = BatchRun::new(cli.retry_config())?;
        let config =
            BatchConfig::new(categories, topics, options).with_parallel_limit(cli.parallel_limit);

        let progress = create_progress_bar(config.task_count() as u64, cli.output_format);
        run.subscribe_progress({
            let progress = progress.clone();
            move |p: &BatchProgress<String, String>| update_progress_bar(&progress, p)
        })
        .subscribe_error({
            let progress = progress.clone();
            move |e: &BatchError<String, String>| {
                progress.println(format!("[ERROR] {}", e.message));
            }
        });

        // Forward Ctrl+C to this run
        let forward = tokio::spawn({
            let cancel = run.cancellation();
            async move {
                signal.wait_for_cancel().await;
                warn!("Cancellation requested - waiting for in-flight tasks to finish");
                cancel.request_cancel();
            }
        });

        info!(
            endpoint = %executor.endpoint(),
            tasks = config.task_count(),
            parallel_limit = cli.parallel_limit,
            "Starting generation batch"
        );

        let outcome = run.run(config, &executor).await;
        forward.abort();
        progress.finish_and_clear();
        let result = outcome?;

        match cli.output_format {
            OutputFormat::Json => output_json(&result)?,
            OutputFormat::Human => output_human(&result),
        }

        if result.is_total_failure() {
            return Err(CliError::AllTasksFailed {
                total: result.total,
            });
        }
        Ok(())
    }
}

/// Output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

fn create_progress_bar(total: u64, format: OutputFormat) -> ProgressBar {
    if format == OutputFormat::Json {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

fn update_progress_bar(pb: &ProgressBar, progress: &BatchProgress<String, String>) {
    pb.set_position(progress.completed as u64);
    let mut message = format!(
        "{} ok, {} failed",
        progress.success_count, progress.failure_count
    );
    if let Some(remaining) = progress.estimated_remaining {
        message.push_str(&format!(
            ", ~{} left",
            crate::batch::progress::format_duration(remaining)
        ));
    }
    pb.set_message(message);
}

/// JSON document describing a finished run
pub fn result_to_json(result: &BatchResult<String, String, Value>) -> Value {
    let results: Vec<Value> = result
        .results
        .iter()
        .map(|output| {
            serde_json::json!({
                "index": output.task.index,
                "category": output.task.dimension_a,
                "topic": output.task.dimension_b,
                "elapsed_ms": output.elapsed.as_millis() as u64,
                "value": output.value,
            })
        })
        .collect();

    let errors: Vec<Value> = result
        .errors
        .iter()
        .map(|failure| {
            serde_json::json!({
                "index": failure.task.index,
                "category": failure.task.dimension_a,
                "topic": failure.task.dimension_b,
                "message": failure.message,
                "kind": failure.cause.kind().to_string(),
                "attempts": failure.cause.attempts(),
                "occurred_at": failure.occurred_at.to_rfc3339(),
            })
        })
        .collect();

    serde_json::json!({
        "success": !result.is_total_failure(),
        "run_id": result.run_id,
        "total": result.total,
        "succeeded": result.succeeded,
        "failed": result.failed,
        "cancelled": result.cancelled,
        "started_at": result.started_at.to_rfc3339(),
        "finished_at": result.finished_at.to_rfc3339(),
        "duration_ms": result.duration.as_millis() as u64,
        "results": results,
        "errors": errors,
    })
}

fn output_json(result: &BatchResult<String, String, Value>) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(&result_to_json(result))?);
    Ok(())
}

fn output_human(result: &BatchResult<String, String, Value>) {
    if result.is_total_failure() {
        eprintln!("\nBatch failed!");
    } else if result.cancelled {
        println!("\nBatch cancelled.");
    } else {
        println!("\nBatch completed.");
    }
    println!("Run: {}", result.run_id);
    println!("{}", result.summary());

    if !result.errors.is_empty() {
        eprintln!("\nFailed tasks:");
        for failure in &result.errors {
            eprintln!("  {} ({})", failure.task, failure.message);
        }
    }
}
