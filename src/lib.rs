pub mod backends;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod finder;
pub mod frame;
pub mod hashing;
pub mod series;
pub mod store;
pub mod wide;

pub use cache::{CacheHost, CachePool};
pub use config::Settings;
pub use fetch::{fetch_data, fetch_wide, RequestContext};
pub use hashing::{ConsistentHashRing, RingNode};
pub use series::{merge_results, ConsolidationFunc, TimeSeries};
pub use store::{FoundNode, Query, Store, StoreServer};
