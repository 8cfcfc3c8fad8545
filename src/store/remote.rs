//! Remote peer stores.
//!
//! A peer exposes the same find/fetch surface as the local store, reached
//! over the crate's length-prefixed JSON framing. The trait keeps other
//! transports pluggable; [`TcpRemoteStore`] is the shipped client. Peers own
//! their availability flag: after a transport failure a peer reports itself
//! unavailable until a retry delay elapses, and the federated store skips
//! unavailable peers wholesale.

use crate::backends::FetchedData;
use crate::frame::{read_frame, write_frame};
use crate::store::Query;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

/// What a peer reports about one matched node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteNodeInfo {
    pub metric_path: String,
    pub real_metric: String,
    pub is_leaf: bool,
}

/// A request to a peer store, tagged by operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PeerRequest {
    Find {
        pattern: String,
        start_time: Option<u32>,
        end_time: Option<u32>,
    },
    Fetch {
        metric: String,
        start: u32,
        end: u32,
    },
}

/// A peer's reply; `error` preempts the result fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<RemoteNodeInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<FetchedData>,
}

#[derive(Debug)]
pub enum RemoteError {
    Io(io::Error),
    Timeout(&'static str),
    /// The peer answered with an `error` field or a malformed result.
    Peer(String),
    Serde(serde_json::Error),
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::Io(e) => write!(f, "peer I/O error: {}", e),
            RemoteError::Timeout(step) => write!(f, "peer {} timed out", step),
            RemoteError::Peer(msg) => write!(f, "peer error: {}", msg),
            RemoteError::Serde(e) => write!(f, "peer payload error: {}", e),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<io::Error> for RemoteError {
    fn from(e: io::Error) -> Self {
        RemoteError::Io(e)
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        RemoteError::Serde(e)
    }
}

/// One remote store in the cluster.
///
/// `find`/`fetch` return owned futures so the federated store can spawn them
/// before its local walk and harvest results afterwards.
pub trait RemotePeer: Send + Sync {
    fn host(&self) -> &str;

    /// Liveness flag owned by the peer; unavailable peers are skipped
    /// entirely by the federated store.
    fn is_available(&self) -> bool;

    fn find(&self, query: Query) -> BoxFuture<'static, Result<Vec<RemoteNodeInfo>, RemoteError>>;

    fn fetch(
        &self,
        metric: String,
        start: u32,
        end: u32,
    ) -> BoxFuture<'static, Result<FetchedData, RemoteError>>;
}

/// How long a peer stays flagged unavailable after a transport failure.
const RETRY_DELAY: Duration = Duration::from_secs(60);

struct PeerState {
    host: String,
    timeout: Duration,
    last_failure: Mutex<Option<Instant>>,
}

impl PeerState {
    fn mark_failed(&self) {
        *self.last_failure.lock() = Some(Instant::now());
    }

    async fn request(&self, request: &PeerRequest) -> Result<PeerResponse, RemoteError> {
        let result = self.exchange(request).await;
        if let Err(e) = &result {
            if !matches!(e, RemoteError::Peer(_)) {
                self.mark_failed();
            }
        }
        result
    }

    async fn exchange(&self, request: &PeerRequest) -> Result<PeerResponse, RemoteError> {
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.host))
            .await
            .map_err(|_| RemoteError::Timeout("connect"))??;

        let payload = serde_json::to_vec(request)?;
        tokio::time::timeout(self.timeout, write_frame(&mut stream, &payload))
            .await
            .map_err(|_| RemoteError::Timeout("send"))??;
        let body = tokio::time::timeout(self.timeout, read_frame(&mut stream))
            .await
            .map_err(|_| RemoteError::Timeout("receive"))??;

        let response: PeerResponse = serde_json::from_slice(&body)?;
        match response.error {
            Some(error) => Err(RemoteError::Peer(error)),
            None => Ok(response),
        }
    }
}

/// TCP client for a peer store at `host:port`.
pub struct TcpRemoteStore {
    state: Arc<PeerState>,
}

impl TcpRemoteStore {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        TcpRemoteStore {
            state: Arc::new(PeerState {
                host: host.into(),
                timeout,
                last_failure: Mutex::new(None),
            }),
        }
    }
}

impl RemotePeer for TcpRemoteStore {
    fn host(&self) -> &str {
        &self.state.host
    }

    fn is_available(&self) -> bool {
        match *self.state.last_failure.lock() {
            Some(at) => at.elapsed() >= RETRY_DELAY,
            None => true,
        }
    }

    fn find(&self, query: Query) -> BoxFuture<'static, Result<Vec<RemoteNodeInfo>, RemoteError>> {
        let state = self.state.clone();
        Box::pin(async move {
            debug!("remote find on {}: {}", state.host, query);
            let request = PeerRequest::Find {
                pattern: query.pattern,
                start_time: query.start_time,
                end_time: query.end_time,
            };
            let response = state.request(&request).await?;
            response
                .nodes
                .ok_or_else(|| RemoteError::Peer("find response missing nodes field".to_string()))
        })
    }

    fn fetch(
        &self,
        metric: String,
        start: u32,
        end: u32,
    ) -> BoxFuture<'static, Result<FetchedData, RemoteError>> {
        let state = self.state.clone();
        Box::pin(async move {
            let request = PeerRequest::Fetch {
                metric,
                start,
                end,
            };
            let response = state.request(&request).await?;
            response
                .data
                .ok_or_else(|| RemoteError::Peer("fetch response missing data field".to_string()))
        })
    }
}
