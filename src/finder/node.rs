//! Typed handles to discovered metric locations.

use crate::backends::{BackendSet, FetchedData, StorageError};
use std::path::{Path, PathBuf};

/// The storage format behind a leaf node. The format set is closed and
/// dispatched exhaustively at the extension-match point in the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafKind {
    Whisper,
    GzippedWhisper,
    /// A round-robin database file. The file itself is a container for its
    /// datasources, so it is enumerable but not directly fetchable.
    RrdFile,
    RrdSource {
        datasource: String,
    },
    ChunkedDir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A directory with children; fetch yields nothing.
    Branch,
    Leaf(LeafKind),
}

/// One metric location discovered by a find. Constructed fresh per query and
/// discarded once the caller has extracted series data.
#[derive(Debug, Clone)]
pub struct Node {
    /// Backend locator (filesystem path for every local format).
    pub fs_path: PathBuf,
    /// Dot-delimited logical name as seen by the query.
    pub metric_path: String,
    /// Canonical name after resolving filesystem symlinks; equals
    /// `metric_path` unless the query traversed an aliased subtree. This is
    /// the cache-routing key.
    pub real_metric: String,
    /// Last path segment.
    pub name: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(fs_path: PathBuf, metric_path: String, kind: NodeKind) -> Self {
        let name = metric_path.rsplit('.').next().unwrap_or_default().to_string();
        Node {
            fs_path,
            real_metric: metric_path.clone(),
            metric_path,
            name,
            kind,
        }
    }

    /// Branches and RRD container files are enumerable but hold no samples
    /// of their own.
    pub fn is_leaf(&self) -> bool {
        match &self.kind {
            NodeKind::Branch => false,
            NodeKind::Leaf(LeafKind::RrdFile) => false,
            NodeKind::Leaf(_) => true,
        }
    }

    /// Fetch this node's samples through the configured adapters.
    ///
    /// `Ok(None)` means the node kind holds no data (branches, RRD
    /// containers) — distinct from an adapter failure.
    pub fn fetch(
        &self,
        backends: &BackendSet,
        start: u32,
        end: u32,
    ) -> Result<Option<FetchedData>, StorageError> {
        match &self.kind {
            NodeKind::Branch | NodeKind::Leaf(LeafKind::RrdFile) => Ok(None),
            NodeKind::Leaf(LeafKind::Whisper) => {
                let adapter = backends
                    .whisper
                    .as_ref()
                    .ok_or(StorageError::Unsupported("whisper"))?;
                adapter.fetch(&self.fs_path, start, end).map(Some)
            }
            NodeKind::Leaf(LeafKind::GzippedWhisper) => {
                let adapter = backends
                    .whisper
                    .as_ref()
                    .ok_or(StorageError::Unsupported("whisper"))?;
                adapter.fetch_compressed(&self.fs_path, start, end).map(Some)
            }
            NodeKind::Leaf(LeafKind::RrdSource { datasource }) => {
                let adapter = backends
                    .rrd
                    .as_ref()
                    .ok_or(StorageError::Unsupported("rrd"))?;
                adapter
                    .fetch_datasource(&self.fs_path, datasource, start, end)
                    .map(Some)
            }
            NodeKind::Leaf(LeafKind::ChunkedDir) => {
                let adapter = backends
                    .chunked
                    .as_ref()
                    .ok_or(StorageError::Unsupported("chunked"))?;
                adapter.fetch(&self.fs_path, start, end).map(Some)
            }
        }
    }

    /// Re-derive the canonical metric name when some component of `fs_path`
    /// was reached through a symlink.
    ///
    /// The nominal path decomposes as `<base>/<metric as path><suffix>`;
    /// stripping `<base>` and `<suffix>` from the resolved path and turning
    /// separators back into dots gives the name the metric is stored under.
    pub(crate) fn resolve_real_metric(&mut self, suffix: &str) {
        let real_fs_path = match std::fs::canonicalize(&self.fs_path) {
            Ok(p) => p,
            Err(_) => return,
        };
        if real_fs_path == self.fs_path {
            return;
        }

        let nominal = self.fs_path.to_string_lossy().into_owned();
        let resolved = real_fs_path.to_string_lossy().into_owned();
        let relative = format!(
            "{}{}",
            self.metric_path.replace('.', std::path::MAIN_SEPARATOR_STR),
            suffix
        );

        let base_len = match nominal.len().checked_sub(relative.len()) {
            Some(n) if nominal.ends_with(&relative) => n,
            _ => return,
        };
        let base = &nominal[..base_len];

        if let Some(relative_real) = resolved.strip_prefix(base) {
            let trimmed = relative_real.strip_suffix(suffix).unwrap_or(relative_real);
            self.real_metric = trimmed.replace(std::path::MAIN_SEPARATOR, ".");
        }
    }
}

/// Derive the dot-delimited metric path of `absolute_path` relative to
/// `root_dir`, with any extension already stripped by the caller.
pub(crate) fn metric_path_for(root_dir: &Path, absolute_path: &Path) -> String {
    let relative = absolute_path
        .strip_prefix(root_dir)
        .unwrap_or(absolute_path);
    relative
        .to_string_lossy()
        .trim_start_matches(std::path::MAIN_SEPARATOR)
        .replace(std::path::MAIN_SEPARATOR, ".")
}
