//! Federated metric store: local directory roots plus remote peers behind
//! one find surface, with exact-match short-circuiting and cross-source
//! duplicate suppression.

mod interface;
mod query;
mod remote;
mod server;
mod store;

pub use interface::is_local_interface;
pub use query::Query;
pub use remote::{PeerRequest, PeerResponse, RemoteError, RemoteNodeInfo, RemotePeer, TcpRemoteStore};
pub use server::StoreServer;
pub use store::{FoundNode, NodeFetchError, Store, StoreError};
