//! Wide-column scan boundary.
//!
//! The remote wide-column store is an external collaborator consumed through
//! an opaque scan service: we build a [`ScanSpec`] describing row-key
//! intervals and a nanosecond time range, and the scanner invokes a callback
//! once per returned cell. The metric index that maps a path expression to
//! concrete metric names (and their declared reporting rates) is consumed
//! the same way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Row-plus-column bounds for one metric's cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellInterval {
    pub start_row: String,
    pub start_column: String,
    pub start_inclusive: bool,
    pub end_row: String,
    pub end_column: String,
    pub end_inclusive: bool,
}

impl CellInterval {
    /// Bound every cell of `row` between two column strings, inclusively.
    pub fn for_row(row: &str, start_column: String, end_column: String) -> Self {
        CellInterval {
            start_row: row.to_string(),
            start_column,
            start_inclusive: true,
            end_row: row.to_string(),
            end_column,
            end_inclusive: true,
        }
    }
}

/// One scan request: cell intervals, a nanosecond time range, and how many
/// versions of each cell the scan may return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSpec {
    pub cell_intervals: Vec<CellInterval>,
    pub start_time_nanos: i64,
    pub end_time_nanos: i64,
    pub versions: u32,
}

/// One cell handed to the scan callback. The value is opaque bytes; callers
/// decide how to decode it.
#[derive(Debug, Clone)]
pub struct Cell {
    pub row: String,
    pub column_family: String,
    pub column: String,
    pub value: Vec<u8>,
    pub timestamp_nanos: i64,
}

#[derive(Debug)]
pub enum WideError {
    Scan(String),
    Index(String),
}

impl std::fmt::Display for WideError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WideError::Scan(msg) => write!(f, "wide-column scan error: {}", msg),
            WideError::Index(msg) => write!(f, "metric index error: {}", msg),
        }
    }
}

impl std::error::Error for WideError {}

/// Opaque scan service over the wide-column store.
pub trait WideColumnScanner: Send + Sync {
    fn scan(&self, spec: &ScanSpec, callback: &mut dyn FnMut(Cell)) -> Result<(), WideError>;
}

/// One index entry: a concrete metric name and its declared reporting rate,
/// if it has one.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedMetric {
    pub name: String,
    pub rate: Option<u32>,
}

/// Index resolving a path expression to the metrics it covers.
pub trait MetricIndex: Send + Sync {
    fn find_metrics(&self, path_expr: &str) -> Result<Vec<IndexedMetric>, WideError>;
}

/// Hour-granular column bound for a scan: cells are columned by the hour
/// they belong to.
pub fn column_bound(at: DateTime<Utc>) -> String {
    at.format("metric:%Y-%m-%d %H").to_string()
}

pub fn add_prefix(prefix: Option<&str>, path: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}.{}", prefix, path),
        None => path.to_string(),
    }
}

pub fn remove_prefix(prefix: Option<&str>, path: &str) -> String {
    match prefix {
        Some(prefix) => path
            .strip_prefix(&format!("{}.", prefix))
            .unwrap_or(path)
            .to_string(),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_column_bound_format() {
        let at = Utc.with_ymd_and_hms(2014, 3, 7, 16, 45, 12).unwrap();
        assert_eq!(column_bound(at), "metric:2014-03-07 16");
    }

    #[test]
    fn test_prefix_round_trip() {
        assert_eq!(add_prefix(Some("prod"), "servers.cpu"), "prod.servers.cpu");
        assert_eq!(
            remove_prefix(Some("prod"), "prod.servers.cpu"),
            "servers.cpu"
        );
        assert_eq!(add_prefix(None, "servers.cpu"), "servers.cpu");
        // A path without the prefix comes back untouched
        assert_eq!(remove_prefix(Some("prod"), "servers.cpu"), "servers.cpu");
    }

    #[test]
    fn test_cell_interval_for_row() {
        let interval = CellInterval::for_row(
            "prod.servers.cpu",
            "metric:2014-03-07 00".to_string(),
            "metric:2014-03-08 00".to_string(),
        );
        assert_eq!(interval.start_row, interval.end_row);
        assert!(interval.start_inclusive && interval.end_inclusive);
    }
}
