//! Integration tests for logging and tracing

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use batch_generator::batch::{BatchConfig, BatchRun, TaskDescriptor};
use batch_generator::executor::executor_fn;
use batch_generator::retry::RetryConfig;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Shared in-memory sink for captured log output
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn events(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

fn json_subscriber(sink: &Captured) -> impl tracing::Subscriber + Send + Sync {
    let sink = sink.clone();
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new("batch_generator=debug"))
        .with_writer(move || sink.clone())
        .finish()
}

/// One task flaps once then succeeds, one fails fatally.
async fn run_mixed_batch() -> (usize, usize) {
    let run = BatchRun::new(
        RetryConfig::default()
            .with_max_attempts(2)
            .with_initial_delay(Duration::from_millis(10)),
    )
    .unwrap();
    let config = BatchConfig::new(vec!["goryeo"], vec!["politics", "culture"], ());
    let flapped = Arc::new(Mutex::new(false));
    let executor = executor_fn(move |task: TaskDescriptor<&'static str, &'static str>| {
        let flapped = flapped.clone();
        async move {
            if task.dimension_b == "culture" {
                anyhow::bail!("invalid prompt");
            }
            let mut flapped = flapped.lock().unwrap();
            if !*flapped {
                *flapped = true;
                anyhow::bail!("503 service unavailable");
            }
            Ok(task.index)
        }
    });

    let result = run.run(config, &executor).await.unwrap();
    (result.succeeded, result.failed)
}

fn field<'a>(event: &'a Value, name: &str) -> Option<&'a Value> {
    event.get("fields").and_then(|fields| fields.get(name))
}

#[tokio::test(start_paused = true)]
async fn test_retry_and_failure_events_carry_structured_fields() {
    let sink = Captured::default();
    let _guard = tracing::subscriber::set_default(json_subscriber(&sink));

    let (succeeded, failed) = run_mixed_batch().await;
    assert_eq!((succeeded, failed), (1, 1));

    let events = sink.events();

    let retry = events
        .iter()
        .find(|e| field(e, "backoff_ms").is_some())
        .expect("retry warning with backoff_ms");
    assert_eq!(retry["level"], "WARN");
    assert_eq!(field(retry, "attempt"), Some(&Value::from(1)));
    assert_eq!(field(retry, "backoff_ms"), Some(&Value::from(10)));

    let failure = events
        .iter()
        .find(|e| field(e, "message") == Some(&Value::from("Task failed")))
        .expect("task failure event");
    assert_eq!(failure["level"], "ERROR");
    assert_eq!(field(failure, "task_index"), Some(&Value::from(1)));
    assert_eq!(field(failure, "attempts"), Some(&Value::from(1)));

    let finished = events
        .iter()
        .find(|e| field(e, "message") == Some(&Value::from("Batch run finished")))
        .expect("run summary event");
    assert_eq!(field(finished, "succeeded"), Some(&Value::from(1)));
    assert_eq!(field(finished, "failed"), Some(&Value::from(1)));
}

#[tokio::test(start_paused = true)]
async fn test_failed_task_is_logged_at_error_once() {
    let sink = Captured::default();
    let _guard = tracing::subscriber::set_default(json_subscriber(&sink));

    run_mixed_batch().await;

    let errors: Vec<Value> = sink
        .events()
        .into_iter()
        .filter(|e| e["level"] == "ERROR")
        .collect();
    assert_eq!(errors.len(), 1, "error events: {errors:?}");
    assert_eq!(field(&errors[0], "task_index"), Some(&Value::from(1)));
}
