//! Cache Protocol Integration Tests
//!
//! Drives the connection pool against a scripted cache daemon on a real
//! localhost socket, verifying:
//! - Length-prefixed framing round trips
//! - Socket reuse across sequential requests
//! - Request-level errors vs transport errors
//! - Failure timestamp bookkeeping on dead and truncating peers

use metricview::cache::{CacheError, CacheHost, CachePool, CacheRequest, CacheResponse};
use metricview::frame::{read_frame, write_frame};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

const TIMEOUT: Duration = Duration::from_millis(500);

fn pool_for(addr: SocketAddr) -> CachePool {
    let host = CacheHost {
        server: addr.ip().to_string(),
        port: addr.port(),
        instance: None,
    };
    CachePool::new(&[host], TIMEOUT)
}

/// A daemon answering cache-query with fixed datapoints and echoing
/// metadata operations. Counts accepted connections.
async fn spawn_daemon(connections: Arc<AtomicUsize>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                while let Ok(body) = read_frame(&mut stream).await {
                    let request: CacheRequest = serde_json::from_slice(&body).unwrap();
                    let response = match request {
                        CacheRequest::CacheQuery { metric } => {
                            if metric == "servers.missing.cpu" {
                                CacheResponse {
                                    error: Some("unknown metric".to_string()),
                                    ..Default::default()
                                }
                            } else {
                                CacheResponse {
                                    datapoints: Some(vec![(5, 99.0), (25, 77.0)]),
                                    ..Default::default()
                                }
                            }
                        }
                        CacheRequest::GetMetadata { key, .. } => CacheResponse {
                            value: Some(serde_json::json!(format!("value-of-{}", key))),
                            ..Default::default()
                        },
                        CacheRequest::SetMetadata { .. } => CacheResponse {
                            success: Some(true),
                            ..Default::default()
                        },
                    };
                    let payload = serde_json::to_vec(&response).unwrap();
                    if write_frame(&mut stream, &payload).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    addr
}

// ============================================================================
// Round trips
// ============================================================================

#[tokio::test]
async fn test_query_round_trip() {
    let addr = spawn_daemon(Arc::new(AtomicUsize::new(0))).await;
    let pool = pool_for(addr);

    let datapoints = pool.query("servers.web01.cpu").await.unwrap();
    assert_eq!(datapoints, vec![(5, 99.0), (25, 77.0)]);
}

#[tokio::test]
async fn test_metadata_round_trip() {
    let addr = spawn_daemon(Arc::new(AtomicUsize::new(0))).await;
    let pool = pool_for(addr);

    let value = pool
        .get_metadata("servers.web01.cpu", "aggregation")
        .await
        .unwrap();
    assert_eq!(value, serde_json::json!("value-of-aggregation"));

    let ack = pool
        .set_metadata("servers.web01.cpu", "aggregation", serde_json::json!("sum"))
        .await
        .unwrap();
    assert_eq!(ack.success, Some(true));
}

#[tokio::test]
async fn test_connection_reused_across_requests() {
    let connections = Arc::new(AtomicUsize::new(0));
    let addr = spawn_daemon(connections.clone()).await;
    let pool = pool_for(addr);

    for _ in 0..5 {
        pool.query("servers.web01.cpu").await.unwrap();
    }
    assert_eq!(
        connections.load(Ordering::SeqCst),
        1,
        "sequential requests should reuse one pooled socket"
    );
}

// ============================================================================
// Error taxonomy
// ============================================================================

#[tokio::test]
async fn test_error_response_is_request_error() {
    let addr = spawn_daemon(Arc::new(AtomicUsize::new(0))).await;
    let pool = pool_for(addr);

    let err = pool.query("servers.missing.cpu").await.unwrap_err();
    match &err {
        CacheError::Request(msg) => assert_eq!(msg, "unknown metric"),
        other => panic!("expected Request error, got {:?}", other),
    }
    assert!(!err.is_transport());

    // A request-level error leaves the connection healthy and pooled
    let datapoints = pool.query("servers.web01.cpu").await.unwrap();
    assert_eq!(datapoints.len(), 2);
}

#[tokio::test]
async fn test_connect_refused_is_transport_error() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let pool = pool_for(addr);
    let host = pool.select_host("servers.web01.cpu").unwrap();
    assert!(pool.last_failure(&host).is_none());

    let err = pool.query("servers.web01.cpu").await.unwrap_err();
    assert!(err.is_transport(), "expected transport error, got {:?}", err);
    assert!(
        pool.last_failure(&host).is_some(),
        "connect failure must be recorded"
    );
}

#[tokio::test]
async fn test_truncated_frame_fails_request() {
    // A daemon that declares a large frame, sends three bytes, and hangs up
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_frame(&mut stream).await;
        stream.write_all(&100u32.to_be_bytes()).await.unwrap();
        stream.write_all(b"abc").await.unwrap();
        // Dropped here: the client must fail, never surface a short payload
    });

    let pool = pool_for(addr);
    let host = pool.select_host("servers.web01.cpu").unwrap();
    let err = pool.query("servers.web01.cpu").await.unwrap_err();
    assert!(err.is_transport(), "expected transport error, got {:?}", err);
    assert!(pool.last_failure(&host).is_some());
}
