//! HTTP adapter retry behavior against a local scripted responder:
//! 5xx is retried with backoff, 4xx fails fast, and response parsing
//! matches each endpoint style.

use counsel::adapters::{Adapter, AdapterError, HttpInvoker, InvokeRequest, OllamaAdapter};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve a fixed sequence of responses on an ephemeral port, counting
/// requests. Each connection is closed after one response.
async fn scripted_server(responses: Vec<(u16, String)>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = hits.clone();

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            hits_clone.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let reason = match status {
                200 => "OK",
                400 => "Bad Request",
                503 => "Service Unavailable",
                _ => "Unknown",
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}"), hits)
}

#[tokio::test]
async fn test_503_retried_until_success() {
    let ok_body = r#"{"model":"llama3.3","response":"recovered","done":true}"#;
    let (base_url, hits) = scripted_server(vec![
        (503, r#"{"error":"overloaded"}"#.to_string()),
        (503, r#"{"error":"overloaded"}"#.to_string()),
        (200, ok_body.to_string()),
    ])
    .await;

    let adapter = OllamaAdapter::new(base_url, HttpInvoker::new(10, 3));
    let output = adapter
        .invoke(InvokeRequest::new("What is 2+2?", "llama3.3"))
        .await
        .unwrap();

    assert_eq!(output, "recovered");
    assert_eq!(hits.load(Ordering::SeqCst), 3, "exactly 3 POST attempts");
}

#[tokio::test]
async fn test_503_exhausts_retries() {
    let (base_url, hits) = scripted_server(vec![
        (503, "{}".to_string()),
        (503, "{}".to_string()),
        (503, "{}".to_string()),
    ])
    .await;

    let adapter = OllamaAdapter::new(base_url, HttpInvoker::new(10, 3));
    let err = adapter
        .invoke(InvokeRequest::new("What is 2+2?", "llama3.3"))
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Transient(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_400_never_retried() {
    let (base_url, hits) = scripted_server(vec![
        (400, r#"{"error":"bad prompt"}"#.to_string()),
        // A second response sits unserved; a retry would consume it
        (200, r#"{"response":"should not be reached"}"#.to_string()),
    ])
    .await;

    let adapter = OllamaAdapter::new(base_url, HttpInvoker::new(10, 3));
    let err = adapter
        .invoke(InvokeRequest::new("What is 2+2?", "llama3.3"))
        .await
        .unwrap_err();

    match err {
        AdapterError::Fatal(msg) => assert!(msg.contains("400")),
        other => panic!("expected Fatal, got {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1, "4xx must not be retried");
}

#[tokio::test]
async fn test_network_timeout_retried_then_succeeds() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = hits.clone();

    tokio::spawn(async move {
        // First connection: stall far past the client timeout, never respond
        let (mut first, _) = listener.accept().await.unwrap();
        hits_clone.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let mut buf = [0u8; 8192];
            let _ = first.read(&mut buf).await;
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        });
        // Second connection: respond immediately
        let (mut second, _) = listener.accept().await.unwrap();
        hits_clone.fetch_add(1, Ordering::SeqCst);
        let mut buf = [0u8; 8192];
        let _ = second.read(&mut buf).await;
        let body = r#"{"response":"late but fine"}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
             content-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = second.write_all(response.as_bytes()).await;
        let _ = second.shutdown().await;
    });

    // 1s request timeout: attempt 1 times out, attempt 2 succeeds
    let adapter = OllamaAdapter::new(format!("http://{addr}"), HttpInvoker::new(1, 3));
    let output = adapter
        .invoke(InvokeRequest::new("What is 2+2?", "llama3.3"))
        .await
        .unwrap();

    assert_eq!(output, "late but fine");
    assert_eq!(hits.load(Ordering::SeqCst), 2, "timed-out attempt must be retried");
}

#[tokio::test]
async fn test_timeout_surfaced_after_retries_exhausted() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = hits.clone();

    // Every connection stalls without responding
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            hits_clone.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            });
        }
    });

    let adapter = OllamaAdapter::new(format!("http://{addr}"), HttpInvoker::new(1, 2));
    let err = adapter
        .invoke(InvokeRequest::new("What is 2+2?", "llama3.3"))
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Timeout(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 2, "both attempts should run before giving up");
}

#[tokio::test]
async fn test_success_parses_generate_response() {
    let body = r#"{"model":"llama3.3","created_at":"2025-01-01T00:00:00Z","response":"The answer is 4.","done":true}"#;
    let (base_url, hits) = scripted_server(vec![(200, body.to_string())]).await;

    let adapter = OllamaAdapter::new(base_url, HttpInvoker::new(10, 3));
    let output = adapter
        .invoke(InvokeRequest::new("What is 2+2?", "llama3.3"))
        .await
        .unwrap();
    assert_eq!(output, "The answer is 4.");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
