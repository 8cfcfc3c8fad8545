//! Client side of the cache daemon protocol: consistent-hash routing,
//! pooled TCP connections, and length-prefixed JSON request/response frames.

mod pool;
mod protocol;

pub use pool::{CacheHost, CachePool};
pub use protocol::{CacheError, CacheRequest, CacheResponse};
