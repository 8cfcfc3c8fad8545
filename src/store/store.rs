//! The federated store: one find surface over local roots and remote peers.

use super::interface::is_local_interface;
use super::remote::{RemoteError, RemoteNodeInfo, RemotePeer, TcpRemoteStore};
use super::Query;
use crate::backends::{BackendSet, FetchedData, StorageError};
use crate::finder::{self, Node};
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Fatal store construction / environment errors.
#[derive(Debug)]
pub enum StoreError {
    /// Neither local directories nor remote peers were configured.
    NoSources,
    /// Every port in the ephemeral range failed while probing whether a
    /// peer address is local.
    InterfaceProbe { host: String, source: io::Error },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NoSources => {
                write!(f, "directories and remote peers cannot both be empty")
            }
            StoreError::InterfaceProbe { host, source } => write!(
                f,
                "exhausted all ports probing interface {}: {}",
                host, source
            ),
        }
    }
}

impl std::error::Error for StoreError {}

/// Failure fetching one discovered node's data.
#[derive(Debug)]
pub enum NodeFetchError {
    Storage(StorageError),
    Remote(RemoteError),
}

impl std::fmt::Display for NodeFetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeFetchError::Storage(e) => write!(f, "{}", e),
            NodeFetchError::Remote(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for NodeFetchError {}

/// A node discovered by a federated find: either a local filesystem node or
/// a peer's report, fetchable through that peer.
pub enum FoundNode {
    Local(Node),
    Remote {
        node: RemoteNodeInfo,
        peer: Arc<dyn RemotePeer>,
    },
}

impl FoundNode {
    pub fn metric_path(&self) -> &str {
        match self {
            FoundNode::Local(node) => &node.metric_path,
            FoundNode::Remote { node, .. } => &node.metric_path,
        }
    }

    /// The canonical name used as the cache-routing key.
    pub fn real_metric(&self) -> &str {
        match self {
            FoundNode::Local(node) => &node.real_metric,
            FoundNode::Remote { node, .. } => &node.real_metric,
        }
    }

    pub fn is_leaf(&self) -> bool {
        match self {
            FoundNode::Local(node) => node.is_leaf(),
            FoundNode::Remote { node, .. } => node.is_leaf,
        }
    }

    /// Fetch this node's samples. `Ok(None)` means the node holds no data
    /// of its own (branches and other container nodes).
    pub async fn fetch(
        &self,
        backends: &BackendSet,
        start: u32,
        end: u32,
    ) -> Result<Option<FetchedData>, NodeFetchError> {
        match self {
            FoundNode::Local(node) => node
                .fetch(backends, start, end)
                .map_err(NodeFetchError::Storage),
            FoundNode::Remote { node, peer } => {
                if !node.is_leaf {
                    return Ok(None);
                }
                peer.fetch(node.metric_path.clone(), start, end)
                    .await
                    .map(Some)
                    .map_err(NodeFetchError::Remote)
            }
        }
    }
}

impl std::fmt::Debug for FoundNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FoundNode::Local(node) => f.debug_tuple("Local").field(&node.metric_path).finish(),
            FoundNode::Remote { node, peer } => f
                .debug_struct("Remote")
                .field("metric_path", &node.metric_path)
                .field("peer", &peer.host())
                .finish(),
        }
    }
}

/// Presents one `find` surface across local data directories and remote
/// peer stores.
pub struct Store {
    directories: Vec<PathBuf>,
    remote_stores: Vec<Arc<dyn RemotePeer>>,
    backends: BackendSet,
}

impl Store {
    pub fn new(
        directories: Vec<PathBuf>,
        remote_stores: Vec<Arc<dyn RemotePeer>>,
        backends: BackendSet,
    ) -> Result<Self, StoreError> {
        if directories.is_empty() && remote_stores.is_empty() {
            return Err(StoreError::NoSources);
        }
        Ok(Store {
            directories,
            remote_stores,
            backends,
        })
    }

    /// Build TCP peers from configured addresses, dropping any address that
    /// turns out to be this machine (self-queries would recurse forever).
    pub fn peers_from_hosts(
        hosts: &[String],
        timeout: Duration,
    ) -> Result<Vec<Arc<dyn RemotePeer>>, StoreError> {
        let mut peers: Vec<Arc<dyn RemotePeer>> = Vec::new();
        for host in hosts {
            if is_local_interface(host)? {
                info!("skipping peer {}: local interface", host);
                continue;
            }
            peers.push(Arc::new(TcpRemoteStore::new(host.clone(), timeout)));
        }
        Ok(peers)
    }

    pub fn backends(&self) -> &BackendSet {
        &self.backends
    }

    /// Resolve `query` across every configured source.
    pub async fn find(&self, query: &Query) -> Vec<FoundNode> {
        info!(
            "find({}) directories={} peers={}",
            query,
            self.directories.len(),
            self.remote_stores.len()
        );
        if query.is_exact() {
            self.find_first(query).await.into_iter().collect()
        } else {
            self.find_all(query).await
        }
    }

    /// Exact-match convenience: the first node for a wildcard-free path.
    pub async fn find_metric(&self, metric_path: &str) -> Option<FoundNode> {
        self.find_first(&Query::new(metric_path.to_string(), None, None))
            .await
    }

    /// Search local roots only, yielding every match.
    pub fn find_local(&self, query: &Query) -> Vec<FoundNode> {
        let mut results = Vec::new();
        for directory in &self.directories {
            for node in finder::find(directory, query, &self.backends) {
                results.push(FoundNode::Local(node));
            }
        }
        results
    }

    /// First match wins: local roots in order, then peers in order. Remote
    /// requests only go out once every local root has come up empty.
    async fn find_first(&self, query: &Query) -> Option<FoundNode> {
        for directory in &self.directories {
            if let Some(node) = finder::find(directory, query, &self.backends)
                .into_iter()
                .next()
            {
                return Some(FoundNode::Local(node));
            }
        }

        for (peer, request) in self.spawn_remote_finds(query) {
            match request.await {
                Ok(Ok(nodes)) => {
                    if let Some(node) = nodes.into_iter().next() {
                        return Some(FoundNode::Remote { node, peer });
                    }
                }
                Ok(Err(e)) => warn!("remote find on {} failed: {}", peer.host(), e),
                Err(e) => warn!("remote find task on {} aborted: {}", peer.host(), e),
            }
        }
        None
    }

    /// Wildcard search. Remote finds launch before the local walk so network
    /// latency overlaps local disk I/O; remote results are then folded in
    /// with duplicate paths suppressed.
    async fn find_all(&self, query: &Query) -> Vec<FoundNode> {
        let requests = self.spawn_remote_finds(query);

        let mut found: HashSet<String> = HashSet::new();
        let mut results = Vec::new();
        for directory in &self.directories {
            for node in finder::find(directory, query, &self.backends) {
                // Local duplicates across roots surface on purpose: the same
                // logical metric may live in two formats and both count.
                found.insert(node.metric_path.clone());
                results.push(FoundNode::Local(node));
            }
        }

        for (peer, request) in requests {
            match request.await {
                Ok(Ok(nodes)) => {
                    for node in nodes {
                        if found.insert(node.metric_path.clone()) {
                            results.push(FoundNode::Remote {
                                node,
                                peer: peer.clone(),
                            });
                        }
                    }
                }
                Ok(Err(e)) => warn!("remote find on {} failed: {}", peer.host(), e),
                Err(e) => warn!("remote find task on {} aborted: {}", peer.host(), e),
            }
        }
        results
    }

    /// Start one find task per available peer without awaiting any of them.
    fn spawn_remote_finds(
        &self,
        query: &Query,
    ) -> Vec<(
        Arc<dyn RemotePeer>,
        JoinHandle<Result<Vec<RemoteNodeInfo>, RemoteError>>,
    )> {
        self.remote_stores
            .iter()
            .filter(|peer| peer.is_available())
            .map(|peer| (peer.clone(), tokio::spawn(peer.find(query.clone()))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_sources_is_fatal() {
        let result = Store::new(Vec::new(), Vec::new(), BackendSet::new());
        assert!(matches!(result, Err(StoreError::NoSources)));
    }

    #[test]
    fn test_local_only_store_constructs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(
            vec![dir.path().to_path_buf()],
            Vec::new(),
            BackendSet::new(),
        );
        assert!(store.is_ok());
    }
}
