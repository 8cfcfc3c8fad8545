//! Serving side of the peer protocol.
//!
//! Each cluster node runs one of these so its peers can federate over it.
//! Incoming finds are answered from local roots only — a peer answering
//! with its own peers' data would cascade queries around the cluster.

use super::remote::{PeerRequest, PeerResponse, RemoteNodeInfo};
use super::store::Store;
use super::Query;
use crate::frame::{read_frame, write_frame};
use std::io;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

pub struct StoreServer {
    listener: TcpListener,
    store: Arc<Store>,
}

impl StoreServer {
    pub async fn bind(addr: &str, store: Arc<Store>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(StoreServer { listener, store })
    }

    /// The bound address; useful when binding port 0.
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> io::Result<()> {
        info!("peer store listening on {}", self.listener.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let store = self.store.clone();
                    tokio::spawn(async move {
                        debug!("peer connected: {}", addr);
                        handle_peer(stream, store).await;
                        debug!("peer disconnected: {}", addr);
                    });
                }
                Err(e) => {
                    error!("failed to accept peer connection: {}", e);
                }
            }
        }
    }
}

/// Serve one peer connection: a sequence of framed requests, one framed
/// response each, until the peer hangs up.
async fn handle_peer(mut stream: TcpStream, store: Arc<Store>) {
    loop {
        let body = match read_frame(&mut stream).await {
            Ok(body) => body,
            // Clean disconnect or dead peer either way; nothing to answer
            Err(_) => return,
        };

        let response = match serde_json::from_slice::<PeerRequest>(&body) {
            Ok(request) => dispatch(&store, request).await,
            Err(e) => PeerResponse {
                error: Some(format!("malformed request: {}", e)),
                ..Default::default()
            },
        };

        let payload = match serde_json::to_vec(&response) {
            Ok(payload) => payload,
            Err(e) => {
                error!("failed to serialize peer response: {}", e);
                return;
            }
        };
        if write_frame(&mut stream, &payload).await.is_err() {
            return;
        }
    }
}

async fn dispatch(store: &Store, request: PeerRequest) -> PeerResponse {
    match request {
        PeerRequest::Find {
            pattern,
            start_time,
            end_time,
        } => {
            let query = Query::new(pattern, start_time, end_time);
            let nodes = store
                .find_local(&query)
                .iter()
                .map(|found| RemoteNodeInfo {
                    metric_path: found.metric_path().to_string(),
                    real_metric: found.real_metric().to_string(),
                    is_leaf: found.is_leaf(),
                })
                .collect();
            PeerResponse {
                nodes: Some(nodes),
                ..Default::default()
            }
        }
        PeerRequest::Fetch { metric, start, end } => {
            let query = Query::new(metric.clone(), None, None);
            let node = store.find_local(&query).into_iter().next();
            match node {
                Some(node) => match node.fetch(store.backends(), start, end).await {
                    Ok(Some(data)) => PeerResponse {
                        data: Some(data),
                        ..Default::default()
                    },
                    Ok(None) => PeerResponse {
                        error: Some(format!("{} holds no data", metric)),
                        ..Default::default()
                    },
                    Err(e) => PeerResponse {
                        error: Some(e.to_string()),
                        ..Default::default()
                    },
                },
                None => PeerResponse {
                    error: Some(format!("no such metric: {}", metric)),
                    ..Default::default()
                },
            }
        }
    }
}
