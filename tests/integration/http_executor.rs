//! HTTP task executor against a local canned-response server

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use batch_generator::batch::{BatchConfig, BatchRun, TaskDescriptor};
use batch_generator::executor::{HttpTaskExecutor, RateLimiter, TaskExecutor};
use batch_generator::retry::{RetryConfig, RetryError, StatusError};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn response(status_line: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Read one request and return its body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                return String::from_utf8_lossy(&buf[header_end + 4..header_end + 4 + content_length])
                    .to_string();
            }
        }
    }
    String::new()
}

/// Serve `responses` in order, one per connection, recording request bodies.
async fn serve(responses: Vec<String>) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let sink = bodies.clone();

    tokio::spawn(async move {
        for canned in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let body = read_request(&mut socket).await;
            sink.lock().unwrap().push(body);
            socket.write_all(canned.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
    });

    (addr, bodies)
}

fn task() -> TaskDescriptor<String, String> {
    TaskDescriptor {
        index: 0,
        dimension_a: "goryeo".to_string(),
        dimension_b: "culture".to_string(),
    }
}

#[tokio::test]
async fn posts_task_and_returns_json_body() {
    let (addr, bodies) = serve(vec![response("200 OK", r#"{"artifact":"ok"}"#)]).await;
    let executor =
        HttpTaskExecutor::new(reqwest::Client::new(), &format!("http://{addr}/generate")).unwrap();

    let value = executor
        .execute(&task(), &json!({"level": "beginner"}))
        .await
        .unwrap();
    assert_eq!(value, json!({"artifact": "ok"}));

    let sent: Value = serde_json::from_str(&bodies.lock().unwrap()[0]).unwrap();
    assert_eq!(
        sent,
        json!({
            "index": 0,
            "dimension_a": "goryeo",
            "dimension_b": "culture",
            "options": {"level": "beginner"}
        })
    );
}

#[tokio::test]
async fn non_success_status_becomes_status_error() {
    let (addr, _) = serve(vec![response("503 Service Unavailable", "")]).await;
    let executor =
        HttpTaskExecutor::new(reqwest::Client::new(), &format!("http://{addr}/generate")).unwrap();

    let err = executor.execute(&task(), &json!({})).await.unwrap_err();
    let status = err.downcast_ref::<StatusError>().unwrap();
    assert_eq!(status.status, 503);
    assert_eq!(status.message, "service unavailable");
}

#[tokio::test]
async fn batch_retries_unavailable_endpoint_then_succeeds() {
    let (addr, bodies) = serve(vec![
        response("503 Service Unavailable", ""),
        response("200 OK", r#"{"artifact":"second try"}"#),
    ])
    .await;
    let executor =
        HttpTaskExecutor::new(reqwest::Client::new(), &format!("http://{addr}/generate")).unwrap();

    let run = BatchRun::new(
        RetryConfig::default()
            .with_initial_delay(Duration::from_millis(20))
            .with_attempt_timeout(Duration::from_secs(5)),
    )
    .unwrap();
    let config = BatchConfig::new(
        vec!["goryeo".to_string()],
        vec!["culture".to_string()],
        json!({}),
    );

    let result = run.run(config, &executor).await.unwrap();

    assert_eq!(result.succeeded, 1);
    assert_eq!(result.results[0].value, json!({"artifact": "second try"}));
    assert_eq!(bodies.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn client_error_is_fatal_in_batch() {
    let (addr, _) = serve(vec![response("400 Bad Request", r#"{"error":"bad prompt"}"#)]).await;
    let executor =
        HttpTaskExecutor::new(reqwest::Client::new(), &format!("http://{addr}/generate")).unwrap();

    let run = BatchRun::new(RetryConfig::default()).unwrap();
    let config = BatchConfig::new(
        vec!["goryeo".to_string()],
        vec!["culture".to_string()],
        json!({}),
    );

    let result = run.run(config, &executor).await.unwrap();

    assert!(result.is_total_failure());
    let failure = &result.errors[0];
    assert!(matches!(*failure.cause, RetryError::Fatal { attempts: 1, .. }));
    assert!(failure.message.contains("HTTP 400"));
    assert!(failure.message.contains("bad prompt"));
}

#[tokio::test]
async fn rate_limit_wait_does_not_count_against_attempt_timeout() {
    let (addr, bodies) = serve(vec![
        response("200 OK", r#"{"artifact":"first"}"#),
        response("200 OK", r#"{"artifact":"second"}"#),
    ])
    .await;
    let limiter = Arc::new(RateLimiter::per_window(1, Duration::from_millis(400)).unwrap());
    let executor =
        HttpTaskExecutor::new(reqwest::Client::new(), &format!("http://{addr}/generate"))
            .unwrap()
            .with_rate_limiter(limiter);

    // The second task queues for a permit longer than one attempt may last
    let run = BatchRun::new(
        RetryConfig::default()
            .with_max_attempts(1)
            .with_attempt_timeout(Duration::from_millis(200)),
    )
    .unwrap();
    let config = BatchConfig::new(
        vec!["goryeo".to_string()],
        vec!["politics".to_string(), "culture".to_string()],
        json!({}),
    )
    .with_parallel_limit(2);

    let started = tokio::time::Instant::now();
    let result = run.run(config, &executor).await.unwrap();

    assert!(result.errors.is_empty(), "unexpected failures: {:?}", result.errors);
    assert_eq!(result.succeeded, 2);
    assert_eq!(bodies.lock().unwrap().len(), 2);
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn unreadable_error_body_keeps_status_classification() {
    // Declared length exceeds what is sent before the connection closes
    let truncated = "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 100\r\nConnection: close\r\n\r\npartial".to_string();
    let (addr, _) = serve(vec![truncated]).await;
    let executor =
        HttpTaskExecutor::new(reqwest::Client::new(), &format!("http://{addr}/generate")).unwrap();

    let err = executor.execute(&task(), &json!({})).await.unwrap_err();
    let status = err.downcast_ref::<StatusError>().unwrap();
    assert_eq!(status.status, 503);
    assert_eq!(status.message, "service unavailable");
}
