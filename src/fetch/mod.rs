//! Query entry points for the rendering layer.
//!
//! [`fetch_data`] resolves a path expression through the federated store and
//! reconciles each discovered node's persisted data with the cache fleet's
//! unflushed samples. [`fetch_wide`] serves the same expression from the
//! remote wide-column store, resampling its finer-grained cells to each
//! metric's declared rate.

use crate::cache::CachePool;
use crate::config::Settings;
use crate::series::{merge_results, resample, MergedResult, TimeSeries};
use crate::store::{Query, Store};
use crate::wide::{
    add_prefix, column_bound, remove_prefix, CellInterval, MetricIndex, ScanSpec,
    WideColumnScanner, NANOS_PER_SEC,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// What the rendering layer knows about a request: the window as calendar
/// timestamps, and whether to stay off the network.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub local_only: bool,
}

impl RequestContext {
    pub fn start_timestamp(&self) -> u32 {
        self.start_time.timestamp().max(0) as u32
    }

    pub fn end_timestamp(&self) -> u32 {
        self.end_time.timestamp().max(0) as u32
    }
}

/// Resolve `path_expr` and return one series per discovered metric, each
/// reconciled with the cache instance holding its unflushed samples.
///
/// Degrades rather than fails: an unfetchable node is skipped, and a cache
/// exchange failure serves that metric from disk alone.
pub async fn fetch_data(
    ctx: &RequestContext,
    path_expr: &str,
    store: &Store,
    cache: &CachePool,
) -> Vec<TimeSeries> {
    let start = ctx.start_timestamp();
    let end = ctx.end_timestamp();
    let query = Query::new(path_expr.to_string(), Some(start), Some(end));

    let nodes = if ctx.local_only {
        store.find_local(&query)
    } else {
        store.find(&query).await
    };

    let mut series_list = Vec::new();
    for node in nodes {
        debug!("fetching {}", node.metric_path());
        let db_results = match node.fetch(store.backends(), start, end).await {
            Ok(data) => data,
            Err(e) => {
                warn!("fetch failed for {}: {}", node.metric_path(), e);
                continue;
            }
        };

        let cache_results = match cache.query(node.real_metric()).await {
            Ok(datapoints) => datapoints,
            Err(e) if e.is_transport() => {
                warn!(
                    "cache query for {} failed in transit: {}; serving disk data only",
                    node.real_metric(),
                    e
                );
                Vec::new()
            }
            Err(e) => {
                warn!(
                    "cache rejected query for {}: {}; serving disk data only",
                    node.real_metric(),
                    e
                );
                Vec::new()
            }
        };

        match merge_results(db_results, cache_results) {
            Some(MergedResult::Series(data)) => {
                series_list.push(TimeSeries::new(
                    node.metric_path().to_string(),
                    data.start,
                    data.end,
                    data.step,
                    data.values,
                ));
            }
            Some(MergedResult::Points(_)) => {
                // Cache samples with no disk timing to anchor them; nothing
                // renderable for this node
                debug!(
                    "{} has only cache samples and no disk data; skipping",
                    node.metric_path()
                );
            }
            None => {}
        }
    }
    series_list
}

/// Serve `path_expr` from the wide-column store.
///
/// The metric index supplies concrete names and declared rates; metrics
/// without a rate are excluded (bucket sizing is undefined for them). Each
/// metric's cells are resampled onto its rate and returned sorted by name.
pub fn fetch_wide(
    ctx: &RequestContext,
    path_expr: &str,
    index: &dyn MetricIndex,
    scanner: &dyn WideColumnScanner,
    settings: &Settings,
) -> Vec<TimeSeries> {
    info!("fetching {} from wide-column store", path_expr);
    let prefix = settings.wide_prefix.as_deref();
    let path_expr = add_prefix(prefix, path_expr);

    let metric_data = match index.find_metrics(&path_expr) {
        Ok(metric_data) => metric_data,
        Err(e) => {
            error!("metric index lookup for {} failed: {}", path_expr, e);
            return Vec::new();
        }
    };

    let mut rates: HashMap<String, u32> = HashMap::new();
    for metric in metric_data {
        match metric.rate {
            Some(rate) => {
                rates.insert(metric.name, rate);
            }
            None => {
                info!(
                    "metric {} doesn't specify a rate; excluding from results",
                    metric.name
                );
            }
        }
    }
    if rates.is_empty() {
        return Vec::new();
    }

    let start = ctx.start_timestamp();
    let end = ctx.end_timestamp();
    let start_column = column_bound(ctx.start_time);
    let end_column = column_bound(ctx.end_time);

    let cell_intervals = rates
        .keys()
        .map(|metric| CellInterval::for_row(metric, start_column.clone(), end_column.clone()))
        .collect();
    let spec = ScanSpec {
        cell_intervals,
        start_time_nanos: i64::from(start) * NANOS_PER_SEC,
        end_time_nanos: i64::from(end) * NANOS_PER_SEC,
        versions: settings.wide_column_interval_secs / settings.wide_min_interval_secs.max(1),
    };

    let mut values_map: HashMap<String, Vec<(u32, f64)>> = HashMap::new();
    let scan_result = scanner.scan(&spec, &mut |cell| {
        let timestamp = (cell.timestamp_nanos / NANOS_PER_SEC).max(0) as u32;
        let value = std::str::from_utf8(&cell.value)
            .ok()
            .and_then(|raw| raw.trim().parse::<f64>().ok());
        match value {
            Some(value) => values_map.entry(cell.row).or_default().push((timestamp, value)),
            None => debug!("unparsable cell value for {}", cell.row),
        }
    });
    if let Err(e) = scan_result {
        error!("wide-column scan failed: {}", e);
        return Vec::new();
    }

    let mut names: Vec<String> = values_map.keys().cloned().collect();
    names.sort();

    let mut series_list = Vec::new();
    for name in names {
        let rate = match rates.get(&name) {
            Some(rate) => *rate,
            // The scan returned a row the index never declared; without a
            // rate its buckets are undefined
            None => {
                info!("scan returned unindexed metric {}; excluding", name);
                continue;
            }
        };
        let values = resample(&values_map[&name], start, end, rate);
        series_list.push(TimeSeries::new(
            remove_prefix(prefix, &name),
            start,
            end,
            rate,
            values,
        ));
    }
    series_list
}
