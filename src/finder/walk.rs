//! Recursive pattern walk over a metric tree rooted at a data directory.

use super::glob::{glob_filter, glob_match};
use super::node::{metric_path_for, LeafKind, Node, NodeKind};
use crate::backends::BackendSet;
use crate::store::Query;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A filesystem match before format dispatch.
enum RawMatch {
    Path(PathBuf),
    /// An RRD base file matched at the second-to-last segment; the final
    /// segment filters the file's internal datasource names.
    RrdSources {
        path: PathBuf,
        datasource_pattern: String,
    },
}

/// Enumerate nodes beneath `root_dir` matching the query pattern, each
/// resolved to its most specific backend type. Matches within each directory
/// level come out in sorted order.
pub fn find(root_dir: &Path, query: &Query, backends: &BackendSet) -> Vec<Node> {
    let pattern_parts: Vec<&str> = query.pattern.split('.').collect();
    let mut raw = Vec::new();
    walk(root_dir, &pattern_parts, backends.rrd.is_some(), &mut raw);

    let mut nodes = Vec::new();
    for m in raw {
        match m {
            RawMatch::Path(path) => {
                if let Some(node) = resolve_path(root_dir, &path, query, backends) {
                    nodes.push(node);
                }
            }
            RawMatch::RrdSources {
                path,
                datasource_pattern,
            } => {
                expand_rrd_sources(root_dir, &path, &datasource_pattern, backends, &mut nodes);
            }
        }
    }
    nodes
}

/// One recursion level consumes one pattern segment.
fn walk(current_dir: &Path, patterns: &[&str], rrd_enabled: bool, out: &mut Vec<RawMatch>) {
    let segment = match patterns.first() {
        Some(segment) => *segment,
        None => return,
    };
    let remaining = &patterns[1..];

    let entries = match std::fs::read_dir(current_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("failed to list {}: {}", current_dir.display(), e);
            return;
        }
    };

    let mut subdirs = Vec::new();
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        // metadata() follows symlinks, so an aliased subtree still counts
        // as a directory.
        match std::fs::metadata(entry.path()) {
            Ok(meta) if meta.is_dir() => subdirs.push(name),
            Ok(meta) if meta.is_file() => files.push(name),
            _ => {}
        }
    }

    let mut matching_subdirs = glob_filter(subdirs.iter().map(String::as_str), segment);
    matching_subdirs.sort();

    // The last pattern segment may address datasources inside an RRD file
    // found at this level.
    if remaining.len() == 1 && rrd_enabled {
        let mut rrd_files = glob_filter(
            files.iter().map(String::as_str),
            &format!("{}.rrd", segment),
        );
        rrd_files.sort();
        for rrd_file in rrd_files {
            out.push(RawMatch::RrdSources {
                path: current_dir.join(rrd_file),
                datasource_pattern: remaining[0].to_string(),
            });
        }
    }

    if !remaining.is_empty() {
        for subdir in matching_subdirs {
            walk(&current_dir.join(subdir), remaining, rrd_enabled, out);
        }
    } else {
        let mut matching_files = glob_filter(
            files.iter().map(String::as_str),
            &format!("{}.*", segment),
        );
        matching_files.sort();
        for basename in matching_subdirs.into_iter().chain(matching_files) {
            out.push(RawMatch::Path(current_dir.join(basename)));
        }
    }
}

/// Dispatch one matched path to its node type, or `None` when the path is of
/// no known format or holds no data for the query interval.
fn resolve_path(
    root_dir: &Path,
    absolute_path: &Path,
    query: &Query,
    backends: &BackendSet,
) -> Option<Node> {
    let metric_path = metric_path_for(root_dir, absolute_path);

    if absolute_path.is_dir() {
        if let Some(chunked) = &backends.chunked {
            if chunked.is_node_dir(absolute_path) {
                match chunked.has_data_for_interval(absolute_path, query.start_time, query.end_time)
                {
                    Ok(true) => {
                        let mut node = Node::new(
                            absolute_path.to_path_buf(),
                            metric_path,
                            NodeKind::Leaf(LeafKind::ChunkedDir),
                        );
                        node.resolve_real_metric("");
                        return Some(node);
                    }
                    Ok(false) => {
                        debug!(
                            "chunked dir {} has no data in the requested interval",
                            absolute_path.display()
                        );
                        return None;
                    }
                    Err(e) => {
                        warn!(
                            "chunked dir probe failed for {}: {}",
                            absolute_path.display(),
                            e
                        );
                        return None;
                    }
                }
            }
        }
        return Some(Node::new(
            absolute_path.to_path_buf(),
            metric_path,
            NodeKind::Branch,
        ));
    }

    let file_name = absolute_path.file_name()?.to_string_lossy().into_owned();
    if file_name.ends_with(".wsp.gz") {
        let metric_path = metric_path.strip_suffix(".wsp.gz")?.to_string();
        let mut node = Node::new(
            absolute_path.to_path_buf(),
            metric_path,
            NodeKind::Leaf(LeafKind::GzippedWhisper),
        );
        node.resolve_real_metric(".wsp.gz");
        Some(node)
    } else if file_name.ends_with(".wsp") {
        let metric_path = metric_path.strip_suffix(".wsp")?.to_string();
        let mut node = Node::new(
            absolute_path.to_path_buf(),
            metric_path,
            NodeKind::Leaf(LeafKind::Whisper),
        );
        node.resolve_real_metric(".wsp");
        Some(node)
    } else if file_name.ends_with(".rrd") && backends.rrd.is_some() {
        let metric_path = metric_path.strip_suffix(".rrd")?.to_string();
        Some(Node::new(
            absolute_path.to_path_buf(),
            metric_path,
            NodeKind::Leaf(LeafKind::RrdFile),
        ))
    } else {
        // Unknown extension: not a metric database
        None
    }
}

/// Yield one leaf per datasource matching the final pattern segment.
/// Best-effort: an unreadable RRD file is logged and skipped.
fn expand_rrd_sources(
    root_dir: &Path,
    path: &Path,
    datasource_pattern: &str,
    backends: &BackendSet,
    out: &mut Vec<Node>,
) {
    let adapter = match &backends.rrd {
        Some(adapter) => adapter,
        None => return,
    };
    let names = match adapter.datasource_names(path) {
        Ok(names) => names,
        Err(e) => {
            warn!("failed to read datasources from {}: {}", path.display(), e);
            return;
        }
    };

    let base_metric = metric_path_for(root_dir, path);
    let base_metric = base_metric.strip_suffix(".rrd").unwrap_or(&base_metric);
    for name in names {
        if glob_match(datasource_pattern, &name) {
            out.push(Node::new(
                path.to_path_buf(),
                format!("{}.{}", base_metric, name),
                NodeKind::Leaf(LeafKind::RrdSource { datasource: name }),
            ));
        }
    }
}
