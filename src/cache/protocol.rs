//! Wire payloads for the cache daemon protocol.
//!
//! Requests are a tagged union serialized as JSON and carried inside the
//! 4-byte length framing from [`crate::frame`]. Responses are a single
//! mapping holding either an `error` field or the operation's result.

use serde::{Deserialize, Serialize};
use std::io;

/// A request to a cache daemon, tagged by operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CacheRequest {
    CacheQuery {
        metric: String,
    },
    GetMetadata {
        metric: String,
        key: String,
    },
    SetMetadata {
        metric: String,
        key: String,
        value: serde_json::Value,
    },
}

impl CacheRequest {
    /// The metric this request routes by.
    pub fn metric(&self) -> &str {
        match self {
            CacheRequest::CacheQuery { metric } => metric,
            CacheRequest::GetMetadata { metric, .. } => metric,
            CacheRequest::SetMetadata { metric, .. } => metric,
        }
    }
}

/// A cache daemon's reply. Exactly one of the fields is populated per
/// operation; `error` preempts all of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `(timestamp, value)` pairs for cache-query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datapoints: Option<Vec<(u32, f64)>>,
    /// Result of get-metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Acknowledgement of set-metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// Errors from a cache exchange.
///
/// Transport failures ([`CacheError::Io`], [`CacheError::Timeout`]) poison
/// the connection they occurred on; [`CacheError::Request`] means the daemon
/// itself rejected the operation and the connection stays healthy.
#[derive(Debug)]
pub enum CacheError {
    Io(io::Error),
    /// An I/O step exceeded the configured timeout; names the step.
    Timeout(&'static str),
    /// The response payload carried an `error` field, or was missing the
    /// operation's result field.
    Request(String),
    Serde(serde_json::Error),
    /// No cache hosts are configured, so no metric can be routed.
    NoHosts,
}

impl CacheError {
    /// Transport errors (vs request-level rejections).
    pub fn is_transport(&self) -> bool {
        matches!(self, CacheError::Io(_) | CacheError::Timeout(_))
    }
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Io(e) => write!(f, "cache I/O error: {}", e),
            CacheError::Timeout(step) => write!(f, "cache {} timed out", step),
            CacheError::Request(msg) => write!(f, "cache request error: {}", msg),
            CacheError::Serde(e) => write!(f, "cache payload error: {}", e),
            CacheError::NoHosts => write!(f, "no cache hosts configured"),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<io::Error> for CacheError {
    fn from(e: io::Error) -> Self {
        CacheError::Io(e)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serde(e)
    }
}
