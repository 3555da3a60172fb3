//! End-to-end tests for the access log middleware.
//!
//! Requests are driven through `tower::ServiceExt::oneshot` against
//! `service_fn` handlers, so no socket is bound.

use buffered_access_log::interval::FlushInterval;
use buffered_access_log::memory_destination::MemoryDestination;
use buffered_access_log::{BufferedSink, ClientAddr, Config, RequestLogger, RequestLoggerLayer};
use http::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tower::{service_fn, Layer, ServiceExt};

// ── Helpers ───────────────────────────────────────────────────

fn request(method: Method, uri: &str, client: &str) -> Request<String> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap();
    req.extensions_mut()
        .insert(ClientAddr(client.parse().unwrap()));
    req
}

async fn ok_handler(_req: Request<String>) -> Result<Response<String>, Infallible> {
    let mut resp = Response::new("OK".to_string());
    *resp.status_mut() = StatusCode::OK;
    Ok(resp)
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

// ── Construction ──────────────────────────────────────────────

#[tokio::test]
async fn new_with_stdout() {
    let cancel = CancellationToken::new();
    let logger = RequestLogger::new(cancel.clone(), service_fn(ok_handler), &Config::new("", "1s"), "test")
        .await
        .unwrap();

    assert_eq!(logger.layer().name(), "test");
    assert!(!logger.sink().is_closed());
    logger.shutdown().await;
    assert!(logger.sink().is_closed());
}

#[tokio::test]
async fn new_with_file_creates_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");

    let cancel = CancellationToken::new();
    let config = Config::new(path.to_str().unwrap(), "500ms");
    let logger = RequestLogger::new(cancel.clone(), service_fn(ok_handler), &config, "test")
        .await
        .unwrap();

    assert!(path.exists());
    logger.close().await.unwrap();
    cancel.cancel();
}

#[tokio::test]
async fn new_with_invalid_file_fails() {
    let cancel = CancellationToken::new();
    let config = Config::new("/invalid/path/that/does/not/exist/access.log", "1s");
    let result = RequestLogger::new(cancel, service_fn(ok_handler), &config, "test").await;

    let err = result.err().expect("construction should fail");
    assert!(matches!(err, buffered_access_log::SinkError::Open { .. }));
}

// ── Request handling ──────────────────────────────────────────

#[tokio::test]
async fn serves_and_logs_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");

    let cancel = CancellationToken::new();
    let config = Config::new(path.to_str().unwrap(), "100ms");
    let logger = RequestLogger::new(cancel.clone(), service_fn(ok_handler), &config, "test")
        .await
        .unwrap();

    let resp = logger
        .clone()
        .oneshot(request(Method::GET, "http://example.com/test", "192.168.1.1:12345"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.body(), "OK");

    // buffered, not yet written
    assert_eq!(logger.sink().len(), 1);

    sleep(Duration::from_millis(250)).await;
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("192.168.1.1:12345"));
    assert!(content.contains("GET"));
    assert!(content.contains("example.com"));
    assert!(content.contains("/test"));
    assert!(logger.sink().is_empty());

    logger.shutdown().await;
}

#[tokio::test]
async fn log_line_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");

    let cancel = CancellationToken::new();
    let config = Config::new(path.to_str().unwrap(), "50ms");
    let slow = service_fn(|_req: Request<String>| async {
        sleep(Duration::from_millis(10)).await;
        Ok::<_, Infallible>(Response::new(String::new()))
    });
    let logger = RequestLogger::new(cancel.clone(), slow, &config, "test")
        .await
        .unwrap();

    logger
        .clone()
        .oneshot(request(Method::POST, "http://example.com/api/users", "10.0.0.1:54321"))
        .await
        .unwrap();
    sleep(Duration::from_millis(150)).await;

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 1);
    let parts: Vec<&str> = lines[0].split(' ').collect();
    assert_eq!(parts.len(), 6, "{}", lines[0]);

    assert_eq!(parts[0], "10.0.0.1:54321");
    let stamp = parts[1]
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .expect("bracketed timestamp");
    chrono::DateTime::parse_from_rfc3339(stamp).expect("RFC 3339 timestamp");
    assert_eq!(parts[2], "POST");
    assert_eq!(parts[3], "example.com");
    assert_eq!(parts[4], "/api/users");
    assert!(parts[5].ends_with("ms"), "{}", parts[5]);
    let millis: f64 = parts[5].trim_end_matches("ms").parse().unwrap();
    assert!(millis >= 10.0, "{}", parts[5]);

    logger.shutdown().await;
}

#[tokio::test]
async fn failing_handler_is_still_logged() {
    let out = MemoryDestination::new();
    let sink = Arc::new(BufferedSink::new(out.clone()));
    let cancel = CancellationToken::new();
    let layer = RequestLoggerLayer::with_sink(
        Arc::clone(&sink),
        &FlushInterval::parse("1h"),
        cancel.clone(),
        "test",
    );

    let failing = layer.layer(service_fn(|_req: Request<String>| async {
        Err::<Response<String>, _>("upstream unavailable")
    }));
    let err = failing
        .oneshot(request(Method::DELETE, "http://example.com/items/7", "10.1.1.1:9000"))
        .await
        .unwrap_err();
    assert_eq!(err, "upstream unavailable");

    layer.flush().await.unwrap();
    let lines = out.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("10.1.1.1:9000 ["));
    assert!(lines[0].contains("] DELETE example.com /items/7 "));

    layer.shutdown().await;
}

#[tokio::test]
async fn panicking_handler_is_still_logged() {
    let out = MemoryDestination::new();
    let sink = Arc::new(BufferedSink::new(out.clone()));
    let cancel = CancellationToken::new();
    let layer = RequestLoggerLayer::with_sink(sink, &FlushInterval::parse("1h"), cancel, "test");

    let panicking = layer.layer(service_fn(|_req: Request<String>| async {
        if true {
            panic!("handler blew up");
        }
        Ok::<Response<String>, Infallible>(Response::new(String::new()))
    }));
    let task = tokio::spawn(panicking.oneshot(request(Method::GET, "http://example.com/boom", "10.2.2.2:1")));
    assert!(task.await.unwrap_err().is_panic());

    layer.flush().await.unwrap();
    let lines = out.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" GET example.com /boom "));

    layer.shutdown().await;
}

#[tokio::test]
async fn multiple_requests() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");

    let cancel = CancellationToken::new();
    let config = Config::new(path.to_str().unwrap(), "100ms");
    let logger = RequestLogger::new(cancel.clone(), service_fn(ok_handler), &config, "test")
        .await
        .unwrap();

    for _ in 0..5 {
        logger
            .clone()
            .oneshot(request(Method::GET, "http://example.com/test", "192.168.1.1:12345"))
            .await
            .unwrap();
    }

    sleep(Duration::from_millis(250)).await;
    assert_eq!(read_lines(&path).len(), 5);

    logger.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");

    let cancel = CancellationToken::new();
    let config = Config::new(path.to_str().unwrap(), "100ms");
    let logger = RequestLogger::new(cancel.clone(), service_fn(ok_handler), &config, "test")
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..10 {
        let logger = logger.clone();
        tasks.push(tokio::spawn(async move {
            let client = format!("192.168.1.{}:12345", i + 1);
            let uri = format!("http://example.com/test/{i}");
            logger.oneshot(request(Method::GET, &uri, &client)).await.unwrap();
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    sleep(Duration::from_millis(250)).await;
    let lines = read_lines(&path);
    assert_eq!(lines.len(), 10);
    for i in 0..10 {
        let client = format!("192.168.1.{}:12345 ", i + 1);
        let tail = format!(" GET example.com /test/{i} ");
        let matching = lines
            .iter()
            .filter(|l| l.starts_with(&client) && l.contains(&tail))
            .count();
        assert_eq!(matching, 1, "request {i} in {lines:?}");
    }

    logger.shutdown().await;
}

// ── Scheduling modes ──────────────────────────────────────────

#[tokio::test]
async fn invalid_interval_flushes_promptly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");

    let cancel = CancellationToken::new();
    let config = Config::new(path.to_str().unwrap(), "invalid-interval");
    let logger = RequestLogger::new(cancel.clone(), service_fn(ok_handler), &config, "test")
        .await
        .unwrap();

    logger
        .clone()
        .oneshot(request(Method::GET, "http://example.com/fast", "127.0.0.1:1"))
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("/fast"));
    assert!(logger.sink().is_empty());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), logger.shutdown())
        .await
        .expect("scheduler did not stop");
}

#[tokio::test]
async fn cancellation_flushes_remaining_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");

    let cancel = CancellationToken::new();
    let config = Config::new(path.to_str().unwrap(), "1h");
    let logger = RequestLogger::new(cancel.clone(), service_fn(ok_handler), &config, "test")
        .await
        .unwrap();

    logger
        .clone()
        .oneshot(request(Method::PUT, "http://example.com/late", "127.0.0.1:2"))
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

    cancel.cancel();
    logger.shutdown().await;

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" PUT example.com /late "));
    assert!(logger.sink().is_closed());
}

#[tokio::test]
async fn explicit_close_then_flush_reports_closed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");

    let cancel = CancellationToken::new();
    let config = Config::new(path.to_str().unwrap(), "1h");
    let logger = RequestLogger::new(cancel.clone(), service_fn(ok_handler), &config, "test")
        .await
        .unwrap();

    logger.close().await.unwrap();
    logger
        .clone()
        .oneshot(request(Method::GET, "http://example.com/after", "127.0.0.1:3"))
        .await
        .unwrap();

    let err = logger.flush().await.unwrap_err();
    assert!(err.is_closed());
    assert!(logger.close().await.unwrap_err().is_closed());

    logger.shutdown().await;
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
}
