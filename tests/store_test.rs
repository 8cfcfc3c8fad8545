//! Federated Store Integration Tests
//!
//! Runs a real peer store behind [`StoreServer`] on localhost and verifies:
//! - Wildcard fan-out with local-before-remote duplicate suppression
//! - Exact queries short-circuiting locally before going remote
//! - Remote nodes fetching through the peer
//! - Degradation when a peer is dead
//! - Local duplicates across multiple roots surviving on purpose

use metricview::backends::{BackendSet, FetchedData, StorageError, WhisperAdapter};
use metricview::store::{FoundNode, Query, RemotePeer, Store, StoreServer, TcpRemoteStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_millis(500);

/// Serves fixed dense data for any `.wsp` path.
struct FakeWhisper;

impl WhisperAdapter for FakeWhisper {
    fn fetch(&self, _path: &Path, start: u32, end: u32) -> Result<FetchedData, StorageError> {
        let step = 10;
        let slots = ((end - start) / step) as usize;
        Ok(FetchedData {
            start,
            end,
            step,
            values: (0..slots).map(|i| Some(i as f64 + 1.0)).collect(),
        })
    }

    fn fetch_compressed(
        &self,
        path: &Path,
        start: u32,
        end: u32,
    ) -> Result<FetchedData, StorageError> {
        self.fetch(path, start, end)
    }
}

fn backends() -> BackendSet {
    BackendSet::new().with_whisper(Arc::new(FakeWhisper))
}

fn make_tree(root: &Path, metrics: &[&str]) {
    for metric in metrics {
        let relative = metric.replace('.', "/") + ".wsp";
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();
    }
}

/// Boot a peer store over `metrics` and return a client for it.
async fn spawn_peer(metrics: &[&str]) -> (tempfile::TempDir, Arc<dyn RemotePeer>) {
    let dir = tempfile::tempdir().unwrap();
    make_tree(dir.path(), metrics);
    let store = Arc::new(
        Store::new(vec![dir.path().to_path_buf()], Vec::new(), backends()).unwrap(),
    );
    let server = StoreServer::bind("127.0.0.1:0", store).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    let peer: Arc<dyn RemotePeer> = Arc::new(TcpRemoteStore::new(addr.to_string(), TIMEOUT));
    (dir, peer)
}

fn paths(nodes: &[FoundNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.metric_path()).collect()
}

// ============================================================================
// Wildcard federation
// ============================================================================

#[tokio::test]
async fn test_wildcard_federated_find_deduplicates_remote() {
    let (_peer_dir, peer) = spawn_peer(&["servers.web01.cpu", "servers.web03.cpu"]).await;

    let local_dir = tempfile::tempdir().unwrap();
    make_tree(local_dir.path(), &["servers.web01.cpu", "servers.web02.cpu"]);
    let store = Store::new(
        vec![local_dir.path().to_path_buf()],
        vec![peer],
        backends(),
    )
    .unwrap();

    let nodes = store
        .find(&Query::new("servers.*.cpu".to_string(), None, None))
        .await;

    // Local matches come first; the peer's colliding web01 is suppressed and
    // only its web03 is added
    assert_eq!(
        paths(&nodes),
        vec![
            "servers.web01.cpu",
            "servers.web02.cpu",
            "servers.web03.cpu"
        ]
    );
    assert!(matches!(nodes[0], FoundNode::Local(_)));
    assert!(matches!(nodes[1], FoundNode::Local(_)));
    assert!(matches!(nodes[2], FoundNode::Remote { .. }));
}

#[tokio::test]
async fn test_local_duplicates_across_roots_both_surface() {
    let root_a = tempfile::tempdir().unwrap();
    let root_b = tempfile::tempdir().unwrap();
    make_tree(root_a.path(), &["servers.web01.cpu"]);
    make_tree(root_b.path(), &["servers.web01.cpu"]);

    let store = Store::new(
        vec![root_a.path().to_path_buf(), root_b.path().to_path_buf()],
        Vec::new(),
        backends(),
    )
    .unwrap();

    let nodes = store
        .find(&Query::new("servers.*.cpu".to_string(), None, None))
        .await;
    // The same logical metric in two local roots is two results: both
    // formats' data count
    assert_eq!(
        paths(&nodes),
        vec!["servers.web01.cpu", "servers.web01.cpu"]
    );
}

#[tokio::test]
async fn test_dead_peer_degrades_to_local_results() {
    let local_dir = tempfile::tempdir().unwrap();
    make_tree(local_dir.path(), &["servers.web01.cpu"]);

    // Nothing listens on this address
    let dead: Arc<dyn RemotePeer> = Arc::new(TcpRemoteStore::new(
        "127.0.0.1:1".to_string(),
        Duration::from_millis(100),
    ));
    let store = Store::new(
        vec![local_dir.path().to_path_buf()],
        vec![dead.clone()],
        backends(),
    )
    .unwrap();

    let nodes = store
        .find(&Query::new("servers.*.cpu".to_string(), None, None))
        .await;
    assert_eq!(paths(&nodes), vec!["servers.web01.cpu"]);

    // The failure flipped the peer's own availability flag, so the next
    // find skips it without connecting at all
    assert!(!dead.is_available());
    let nodes = store
        .find(&Query::new("servers.*.cpu".to_string(), None, None))
        .await;
    assert_eq!(nodes.len(), 1);
}

// ============================================================================
// Exact queries
// ============================================================================

#[tokio::test]
async fn test_exact_query_prefers_local() {
    let (_peer_dir, peer) = spawn_peer(&["servers.web01.cpu"]).await;

    let local_dir = tempfile::tempdir().unwrap();
    make_tree(local_dir.path(), &["servers.web01.cpu"]);
    let store = Store::new(
        vec![local_dir.path().to_path_buf()],
        vec![peer],
        backends(),
    )
    .unwrap();

    let nodes = store
        .find(&Query::new("servers.web01.cpu".to_string(), None, None))
        .await;
    assert_eq!(nodes.len(), 1);
    assert!(matches!(nodes[0], FoundNode::Local(_)));
}

#[tokio::test]
async fn test_exact_query_falls_through_to_peer() {
    let (_peer_dir, peer) = spawn_peer(&["servers.web09.cpu"]).await;

    let local_dir = tempfile::tempdir().unwrap();
    make_tree(local_dir.path(), &["servers.web01.cpu"]);
    let store = Store::new(
        vec![local_dir.path().to_path_buf()],
        vec![peer],
        backends(),
    )
    .unwrap();

    let nodes = store
        .find(&Query::new("servers.web09.cpu".to_string(), None, None))
        .await;
    assert_eq!(nodes.len(), 1);
    assert!(matches!(nodes[0], FoundNode::Remote { .. }));
    assert!(nodes[0].is_leaf());
}

#[tokio::test]
async fn test_find_metric_convenience() {
    let local_dir = tempfile::tempdir().unwrap();
    make_tree(local_dir.path(), &["servers.web01.cpu"]);
    let store = Store::new(
        vec![local_dir.path().to_path_buf()],
        Vec::new(),
        backends(),
    )
    .unwrap();

    assert!(store.find_metric("servers.web01.cpu").await.is_some());
    assert!(store.find_metric("servers.nothere.cpu").await.is_none());
}

// ============================================================================
// Remote fetch
// ============================================================================

#[tokio::test]
async fn test_remote_node_fetches_through_peer() {
    let (_peer_dir, peer) = spawn_peer(&["servers.web09.cpu"]).await;

    let local_dir = tempfile::tempdir().unwrap();
    let store = Store::new(
        vec![local_dir.path().to_path_buf()],
        vec![peer],
        backends(),
    )
    .unwrap();

    let nodes = store
        .find(&Query::new("servers.web09.cpu".to_string(), None, None))
        .await;
    assert_eq!(nodes.len(), 1);

    let data = nodes[0]
        .fetch(store.backends(), 0, 40)
        .await
        .unwrap()
        .expect("leaf must yield data");
    assert_eq!(data.step, 10);
    assert_eq!(
        data.values,
        vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]
    );
}
