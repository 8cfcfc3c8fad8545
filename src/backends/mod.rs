//! Storage-format boundary.
//!
//! The on-disk database formats (fixed-interval archive files, round-robin
//! databases, chunked columnar directories) are external collaborators. This
//! module owns only the contract they are consumed through: a uniform
//! `fetch(start, end)` result and one adapter trait per format family,
//! bundled into an injectable [`BackendSet`]. An adapter left unset behaves
//! like an absent library: nodes of that format cannot be fetched and the
//! finder skips the format's special-case handling.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::Arc;

/// What a backend returns for a time range: the actual (possibly clipped)
/// interval it covered, its step, and one nullable sample per step.
/// Serializable because remote peers ship it back over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedData {
    pub start: u32,
    pub end: u32,
    pub step: u32,
    pub values: Vec<Option<f64>>,
}

/// Error raised at the storage boundary.
#[derive(Debug)]
pub enum StorageError {
    Io(io::Error),
    /// The format needed for this node has no adapter configured.
    Unsupported(&'static str),
    /// The adapter itself rejected the request.
    Adapter(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "storage I/O error: {}", e),
            StorageError::Unsupported(format) => {
                write!(f, "no adapter configured for {} data", format)
            }
            StorageError::Adapter(msg) => write!(f, "storage adapter error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        StorageError::Io(e)
    }
}

/// Fixed-interval archive files (`.wsp`), plus their gzip-compressed form.
pub trait WhisperAdapter: Send + Sync {
    fn fetch(&self, path: &Path, start: u32, end: u32) -> Result<FetchedData, StorageError>;

    /// Fetch through a gzip wrapper (`.wsp.gz`). Adapters without
    /// decompression support return [`StorageError::Unsupported`].
    fn fetch_compressed(
        &self,
        path: &Path,
        start: u32,
        end: u32,
    ) -> Result<FetchedData, StorageError>;
}

/// Round-robin database files (`.rrd`) holding named internal datasources.
///
/// Best-effort: adapter errors are treated as data errors by callers (node
/// skipped, logged) rather than request failures.
pub trait RrdAdapter: Send + Sync {
    fn datasource_names(&self, path: &Path) -> Result<Vec<String>, StorageError>;

    fn fetch_datasource(
        &self,
        path: &Path,
        datasource: &str,
        start: u32,
        end: u32,
    ) -> Result<FetchedData, StorageError>;
}

/// Chunked columnar directories: a directory subtree is a data node when the
/// format's marker files are present.
pub trait ChunkedDirAdapter: Send + Sync {
    fn is_node_dir(&self, path: &Path) -> bool;

    /// Whether the node holds any data overlapping the interval. Unbounded
    /// ends are `None`.
    fn has_data_for_interval(
        &self,
        path: &Path,
        start: Option<u32>,
        end: Option<u32>,
    ) -> Result<bool, StorageError>;

    fn fetch(&self, path: &Path, start: u32, end: u32) -> Result<FetchedData, StorageError>;
}

/// The set of format adapters a finder/store operates with. Cloning shares
/// the underlying adapters.
#[derive(Clone, Default)]
pub struct BackendSet {
    pub whisper: Option<Arc<dyn WhisperAdapter>>,
    pub rrd: Option<Arc<dyn RrdAdapter>>,
    pub chunked: Option<Arc<dyn ChunkedDirAdapter>>,
}

impl BackendSet {
    pub fn new() -> Self {
        BackendSet::default()
    }

    pub fn with_whisper(mut self, adapter: Arc<dyn WhisperAdapter>) -> Self {
        self.whisper = Some(adapter);
        self
    }

    pub fn with_rrd(mut self, adapter: Arc<dyn RrdAdapter>) -> Self {
        self.rrd = Some(adapter);
        self
    }

    pub fn with_chunked(mut self, adapter: Arc<dyn ChunkedDirAdapter>) -> Self {
        self.chunked = Some(adapter);
        self
    }
}

impl std::fmt::Debug for BackendSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSet")
            .field("whisper", &self.whisper.is_some())
            .field("rrd", &self.rrd.is_some())
            .field("chunked", &self.chunked.is_some())
            .finish()
    }
}
