//! Cooperative cancellation of batch runs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use batch_generator::batch::{BatchConfig, BatchProgress, BatchRun, RunState, TaskDescriptor};
use batch_generator::executor::executor_fn;
use batch_generator::retry::RetryConfig;

type Task = TaskDescriptor<&'static str, u32>;

fn config(tasks: u32, limit: usize) -> BatchConfig<&'static str, u32, ()> {
    BatchConfig::new(vec!["x"], (0..tasks).collect(), ()).with_parallel_limit(limit)
}

#[tokio::test(start_paused = true)]
async fn cancel_from_subscriber_stops_new_starts() {
    let run = BatchRun::new(RetryConfig::default()).unwrap();
    let cancel = run.cancellation();
    let finals = Arc::new(Mutex::new(Vec::new()));
    let sink = finals.clone();
    run.subscribe_progress(move |p: &BatchProgress<&'static str, u32>| {
        if p.current.as_ref().map(|t| t.index) == Some(2) {
            cancel.request_cancel();
        }
        if p.current.is_none() {
            sink.lock().unwrap().push(p.completed);
        }
    });

    let executor = executor_fn(|task: Task| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<_, anyhow::Error>(task.index)
    });

    let result = run.run(config(10, 1), &executor).await.unwrap();

    // The task whose start triggered cancellation still runs
    assert_eq!(result.completed(), 3);
    assert_eq!(result.succeeded, 3);
    assert!(result.cancelled);
    assert_eq!(result.skipped(), 7);
    assert_eq!(run.state(), RunState::Cancelled);
    assert_eq!(*finals.lock().unwrap(), vec![3]);
}

#[tokio::test(start_paused = true)]
async fn in_flight_tasks_finish_after_cancel() {
    let run = BatchRun::new(RetryConfig::default()).unwrap();
    let started = Arc::new(AtomicUsize::new(0));
    let counter = started.clone();
    let executor = executor_fn(move |task: Task| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, anyhow::Error>(task.index)
        }
    });

    let batch = run.run(config(10, 3), &executor);
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        run.request_cancel();
    };
    let (result, ()) = tokio::join!(batch, canceller);
    let result = result.unwrap();

    assert_eq!(started.load(Ordering::SeqCst), 3);
    assert_eq!(result.succeeded, 3);
    assert_eq!(result.failed, 0);
    assert!(result.cancelled);
}

#[tokio::test(start_paused = true)]
async fn cancel_while_idle_does_not_affect_next_run() {
    let run = BatchRun::new(RetryConfig::default()).unwrap();
    run.request_cancel();

    let executor = executor_fn(|task: Task| async move { Ok::<_, anyhow::Error>(task.index) });
    let result = run.run(config(4, 2), &executor).await.unwrap();

    assert!(!result.cancelled);
    assert_eq!(result.succeeded, 4);
    assert_eq!(run.state(), RunState::Completed);
}

#[tokio::test(start_paused = true)]
async fn instance_is_reusable_after_cancelled_run() {
    let run = BatchRun::new(RetryConfig::default()).unwrap();
    let executor = executor_fn(|task: Task| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<_, anyhow::Error>(task.index)
    });

    let cancel = run.cancellation();
    run.subscribe_progress(move |_| {
        cancel.request_cancel();
    });
    let first = run.run(config(5, 1), &executor).await.unwrap();
    assert!(first.cancelled);
    assert_eq!(first.completed(), 1);

    run.clear_progress_subscribers();
    let second = run.run(config(5, 1), &executor).await.unwrap();
    assert!(!second.cancelled);
    assert_eq!(second.succeeded, 5);
}

#[tokio::test(start_paused = true)]
async fn dropped_run_future_leaves_instance_cancelled_and_reusable() {
    let run = BatchRun::new(RetryConfig::default()).unwrap();
    let executor = executor_fn(|task: Task| async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, anyhow::Error>(task.index)
    });

    let abandoned =
        tokio::time::timeout(Duration::from_millis(100), run.run(config(6, 2), &executor)).await;
    assert!(abandoned.is_err());
    assert_eq!(run.state(), RunState::Cancelled);
    assert!(!run.is_active());

    let second = run.run(config(3, 3), &executor).await.unwrap();
    assert!(!second.cancelled);
    assert_eq!(second.succeeded, 3);
    assert_eq!(run.state(), RunState::Completed);
}
