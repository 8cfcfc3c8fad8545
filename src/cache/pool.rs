//! Connection pool for the fleet of cache daemons.
//!
//! Each metric is authoritative on exactly one cache instance, located via
//! the consistent hash ring. The pool keeps reusable sockets per instance,
//! connects lazily, and records a last-failure timestamp per instance for
//! callers that want to skip recently-failed nodes. It is constructed once
//! from configuration and passed explicitly to whoever needs it.

use super::protocol::{CacheError, CacheRequest, CacheResponse};
use crate::frame::{read_frame, write_frame};
use crate::hashing::{ConsistentHashRing, RingNode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// One configured cache daemon endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHost {
    pub server: String,
    pub port: u16,
    pub instance: Option<String>,
}

impl CacheHost {
    fn key(&self) -> RingNode {
        RingNode::new(self.server.clone(), self.instance.clone())
    }
}

impl FromStr for CacheHost {
    type Err = String;

    /// Parse `"server:port"` or `"server:port:instance"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let server = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| format!("invalid cache host {:?}: missing server", s))?;
        let port = parts
            .next()
            .ok_or_else(|| format!("invalid cache host {:?}: missing port", s))?
            .parse::<u16>()
            .map_err(|e| format!("invalid cache host {:?}: bad port: {}", s, e))?;
        let instance = parts.next().map(|p| p.to_string());
        if parts.next().is_some() {
            return Err(format!("invalid cache host {:?}: too many fields", s));
        }
        Ok(CacheHost {
            server: server.to_string(),
            port,
            instance,
        })
    }
}

/// Process-wide pool of cache connections, safe to share behind an `Arc`.
pub struct CachePool {
    ports: HashMap<RingNode, u16>,
    timeout: Duration,
    hash_ring: ConsistentHashRing,
    connections: Mutex<HashMap<RingNode, Vec<TcpStream>>>,
    last_failure: Mutex<HashMap<RingNode, Instant>>,
}

impl CachePool {
    pub fn new(hosts: &[CacheHost], timeout: Duration) -> Self {
        let keys: Vec<RingNode> = hosts.iter().map(CacheHost::key).collect();
        let ports = hosts.iter().map(|h| (h.key(), h.port)).collect();
        let connections = keys.iter().map(|k| (k.clone(), Vec::new())).collect();

        CachePool {
            ports,
            timeout,
            hash_ring: ConsistentHashRing::new(keys),
            connections: Mutex::new(connections),
            last_failure: Mutex::new(HashMap::new()),
        }
    }

    /// The cache instance holding data for `metric`.
    pub fn select_host(&self, metric: &str) -> Result<RingNode, CacheError> {
        self.hash_ring
            .get_node(metric)
            .cloned()
            .ok_or(CacheError::NoHosts)
    }

    /// When `host` last failed a connect or exchange, if ever.
    pub fn last_failure(&self, host: &RingNode) -> Option<Instant> {
        self.last_failure.lock().get(host).copied()
    }

    fn record_failure(&self, host: &RingNode) {
        self.last_failure.lock().insert(host.clone(), Instant::now());
    }

    /// Pop a pooled socket for `host` or open a fresh one.
    async fn get_connection(&self, host: &RingNode) -> Result<TcpStream, CacheError> {
        if let Some(conn) = self
            .connections
            .lock()
            .get_mut(host)
            .and_then(|pool| pool.pop())
        {
            return Ok(conn);
        }

        let port = *self
            .ports
            .get(host)
            .ok_or_else(|| CacheError::Request(format!("unknown cache host {}", host)))?;
        debug!("cache pool creating a new socket for {}", host);

        let connect = TcpStream::connect((host.server.as_str(), port));
        let stream = match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.record_failure(host);
                return Err(CacheError::Io(e));
            }
            Err(_) => {
                self.record_failure(host);
                return Err(CacheError::Timeout("connect"));
            }
        };

        // Pooled sockets sit idle between queries; keepalive lets the OS
        // notice a silently dead peer.
        let sock = socket2::SockRef::from(&stream);
        if let Err(e) = sock.set_keepalive(true) {
            warn!("failed to enable keepalive for {}: {}", host, e);
        }
        Ok(stream)
    }

    fn return_connection(&self, host: &RingNode, conn: TcpStream) {
        self.connections
            .lock()
            .entry(host.clone())
            .or_default()
            .push(conn);
    }

    /// Route `request` to the authoritative instance and exchange one frame
    /// each way.
    ///
    /// On any transport failure the socket is discarded and the host's
    /// failure timestamp updated. A response carrying an `error` field is
    /// raised as [`CacheError::Request`] after the (healthy) socket returns
    /// to the pool.
    pub async fn send_request(&self, request: &CacheRequest) -> Result<CacheResponse, CacheError> {
        let host = self.select_host(request.metric())?;
        let mut conn = self.get_connection(&host).await?;
        let payload = serde_json::to_vec(request)?;

        match self.exchange(&mut conn, &payload).await {
            Ok(response) => {
                self.return_connection(&host, conn);
                match response.error {
                    Some(error) => Err(CacheError::Request(error)),
                    None => Ok(response),
                }
            }
            Err(e) => {
                // Socket state is unknown after a failed exchange; drop it
                self.record_failure(&host);
                Err(e)
            }
        }
    }

    async fn exchange(
        &self,
        conn: &mut TcpStream,
        payload: &[u8],
    ) -> Result<CacheResponse, CacheError> {
        tokio::time::timeout(self.timeout, write_frame(conn, payload))
            .await
            .map_err(|_| CacheError::Timeout("send"))??;
        let body = tokio::time::timeout(self.timeout, read_frame(conn))
            .await
            .map_err(|_| CacheError::Timeout("receive"))??;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Datapoints buffered for `metric` that have not been persisted yet.
    pub async fn query(&self, metric: &str) -> Result<Vec<(u32, f64)>, CacheError> {
        let request = CacheRequest::CacheQuery {
            metric: metric.to_string(),
        };
        let response = self.send_request(&request).await?;
        let datapoints = response
            .datapoints
            .ok_or_else(|| CacheError::Request("response missing datapoints field".to_string()))?;
        debug!(
            "cache-query for {} returned {} datapoints",
            metric,
            datapoints.len()
        );
        Ok(datapoints)
    }

    pub async fn get_metadata(
        &self,
        metric: &str,
        key: &str,
    ) -> Result<serde_json::Value, CacheError> {
        let request = CacheRequest::GetMetadata {
            metric: metric.to_string(),
            key: key.to_string(),
        };
        let response = self.send_request(&request).await?;
        response
            .value
            .ok_or_else(|| CacheError::Request("response missing value field".to_string()))
    }

    pub async fn set_metadata(
        &self,
        metric: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<CacheResponse, CacheError> {
        let request = CacheRequest::SetMetadata {
            metric: metric.to_string(),
            key: key.to_string(),
            value,
        };
        self.send_request(&request).await
    }
}
