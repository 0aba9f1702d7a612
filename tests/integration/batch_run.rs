//! End-to-end batch runs against in-process executors

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use batch_generator::batch::{
    BatchConfig, BatchError, BatchProgress, BatchRun, BatchRunError, RunState, TaskDescriptor,
};
use batch_generator::executor::executor_fn;
use batch_generator::retry::{RetryConfig, StatusError};

type Task = TaskDescriptor<String, String>;

fn retry_config() -> RetryConfig {
    RetryConfig::default()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(1))
        .with_attempt_timeout(Duration::from_secs(5))
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn results_correlate_with_task_descriptors() {
    let run = BatchRun::new(retry_config()).unwrap();
    let config = BatchConfig::new(
        strings(&["goryeo", "joseon"]),
        strings(&["politics", "culture", "economy"]),
        (),
    )
    .with_parallel_limit(4);

    // Later tasks finish first so completion order differs from index order
    let executor = executor_fn(|task: Task| async move {
        tokio::time::sleep(Duration::from_millis(100 - task.index as u64 * 10)).await;
        Ok(format!("{}:{}", task.dimension_a, task.dimension_b))
    });

    let result = run.run(config, &executor).await.unwrap();

    assert_eq!(result.total, 6);
    assert_eq!(result.succeeded, 6);
    assert_eq!(result.failed, 0);
    assert!(!result.cancelled);

    let by_index: HashMap<usize, String> = result
        .results
        .iter()
        .map(|output| (output.task.index, output.value.clone()))
        .collect();
    assert_eq!(by_index[&0], "goryeo:politics");
    assert_eq!(by_index[&2], "goryeo:economy");
    assert_eq!(by_index[&3], "joseon:politics");
    assert_eq!(by_index[&5], "joseon:economy");
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_inside_the_batch() {
    let run = BatchRun::new(retry_config()).unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    let config = BatchConfig::new(strings(&["goryeo"]), strings(&["politics"]), ());
    let executor = executor_fn(move |_task: Task| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(anyhow::Error::new(StatusError::new(503, "service unavailable")));
            }
            Ok("artifact")
        }
    });

    let result = run.run(config, &executor).await.unwrap();

    assert_eq!(result.succeeded, 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_and_fatal_failures_become_batch_errors() {
    let run = BatchRun::new(retry_config()).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    run.subscribe_error(move |error: &BatchError<String, String>| {
        sink.lock().unwrap().push(error.task.index);
    });

    let config = BatchConfig::new(strings(&["a"]), strings(&["ok", "busy", "bad"]), ());
    let executor = executor_fn(|task: Task| async move {
        match task.dimension_b.as_str() {
            "busy" => anyhow::bail!("429 too many requests"),
            "bad" => anyhow::bail!("prompt rejected by content filter"),
            _ => Ok(task.index),
        }
    });

    let result = run.run(config, &executor).await.unwrap();

    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 2);
    assert!(!result.is_total_failure());

    let busy = result.errors.iter().find(|e| e.task.index == 1).unwrap();
    assert!(busy.is_retryable());
    assert_eq!(busy.cause.attempts(), 3);

    let bad = result.errors.iter().find(|e| e.task.index == 2).unwrap();
    assert!(!bad.is_retryable());
    assert_eq!(bad.cause.attempts(), 1);
    assert!(bad.message.contains("content filter"));

    let mut notified = seen.lock().unwrap().clone();
    notified.sort_unstable();
    assert_eq!(notified, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn every_task_failing_is_a_total_failure() {
    let run = BatchRun::new(retry_config().with_max_attempts(1)).unwrap();
    let config = BatchConfig::new(strings(&["a", "b"]), strings(&["x"]), ());
    let executor =
        executor_fn(|_task: Task| async move { Err::<(), _>(anyhow::anyhow!("invalid api key")) });

    let result = run.run(config, &executor).await.unwrap();

    assert!(result.is_total_failure());
    assert_eq!(result.errors.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn overlapping_run_is_rejected() {
    let run = BatchRun::new(retry_config()).unwrap();
    let executor = executor_fn(|task: Task| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(task.index)
    });

    let first = run.run(
        BatchConfig::new(strings(&["a"]), strings(&["x", "y"]), ()),
        &executor,
    );
    let second = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(run.is_active());
        run.run(BatchConfig::new(strings(&["b"]), strings(&["z"]), ()), &executor)
            .await
    };

    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap().succeeded, 2);
    assert!(matches!(second, Err(BatchRunError::AlreadyRunning)));
    assert_eq!(run.state(), RunState::Completed);
    assert!(!run.is_active());
}

#[tokio::test(start_paused = true)]
async fn sequential_runs_reuse_the_instance_and_subscribers() {
    let run = BatchRun::new(retry_config()).unwrap();
    let events = Arc::new(AtomicUsize::new(0));
    let counter = events.clone();
    run.subscribe_progress(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let executor = executor_fn(|task: Task| async move { Ok(task.index) });
    for _ in 0..2 {
        let config = BatchConfig::new(strings(&["a"]), strings(&["x", "y"]), ());
        let result = run.run(config, &executor).await.unwrap();
        assert_eq!(result.succeeded, 2);
    }

    // Two start events plus one final event per run
    assert_eq!(events.load(Ordering::SeqCst), 6);

    run.clear_progress_subscribers();
    let config = BatchConfig::new(strings(&["a"]), strings(&["x"]), ());
    run.run(config, &executor).await.unwrap();
    assert_eq!(events.load(Ordering::SeqCst), 6);
}

#[tokio::test(start_paused = true)]
async fn progress_reports_estimate_after_first_completion() {
    let run = BatchRun::new(retry_config()).unwrap();
    let estimates = Arc::new(Mutex::new(Vec::new()));
    let sink = estimates.clone();
    run.subscribe_progress(move |p| {
        sink.lock().unwrap().push(p.estimated_remaining);
    });

    let config = BatchConfig::new(strings(&["a"]), strings(&["x", "y", "z"]), ()).with_parallel_limit(1);
    let executor = executor_fn(|task: Task| async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(task.index)
    });
    run.run(config, &executor).await.unwrap();

    let estimates = estimates.lock().unwrap();
    let secs: Vec<Option<f64>> = estimates.iter().map(|e| e.map(|d| d.as_secs_f64())).collect();
    assert_eq!(secs.len(), 4);
    assert_eq!(secs[0], None);
    assert!((secs[1].unwrap() - 4.0).abs() < 0.01);
    assert!((secs[2].unwrap() - 2.0).abs() < 0.01);
    assert_eq!(secs[3], Some(0.0));
}

#[tokio::test(start_paused = true)]
async fn even_tasks_fail_odd_tasks_succeed() {
    let run = BatchRun::new(retry_config()).unwrap();
    let config = BatchConfig::new(strings(&["a"]), (0..10).map(|i| i.to_string()).collect(), ())
        .with_parallel_limit(3);
    let executor = executor_fn(|task: Task| async move {
        if task.index % 2 == 0 {
            anyhow::bail!("unsupported topic {}", task.dimension_b);
        }
        Ok(task.index)
    });

    let result = run.run(config, &executor).await.unwrap();

    assert_eq!(result.succeeded, 5);
    assert_eq!(result.failed, 5);
    assert!(result.results.iter().all(|o| o.task.index % 2 == 1));
    assert!(result.errors.iter().all(|e| e.task.index % 2 == 0));
}

#[tokio::test(start_paused = true)]
async fn completed_count_is_monotonic_and_ends_at_total() {
    let run = BatchRun::new(retry_config()).unwrap();
    let completed = Arc::new(Mutex::new(Vec::new()));
    let sink = completed.clone();
    run.subscribe_progress(move |p: &BatchProgress<String, String>| {
        sink.lock().unwrap().push(p.completed);
    });

    let config = BatchConfig::new(strings(&["a", "b"]), strings(&["x", "y", "z", "w"]), ())
        .with_parallel_limit(3);
    let executor = executor_fn(|task: Task| async move {
        tokio::time::sleep(Duration::from_millis(10 + (task.index as u64 * 13) % 40)).await;
        Ok(task.index)
    });
    let result = run.run(config, &executor).await.unwrap();

    let completed = completed.lock().unwrap();
    assert!(completed.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*completed.last().unwrap(), result.total);
}
