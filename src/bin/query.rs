//! Query one pattern against the configured stores and print the result.
//!
//! ```text
//! MV_DATA_DIRS=/var/lib/metrics mv-query 'servers.web*.cpu' [minutes-back]
//! ```

use chrono::{Duration as ChronoDuration, Utc};
use metricview::{fetch_data, CachePool, Query, RequestContext, Settings, Store};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let pattern = match args.next() {
        Some(pattern) => pattern,
        None => {
            eprintln!("usage: mv-query <pattern> [minutes-back]");
            std::process::exit(2);
        }
    };
    let minutes_back: i64 = args
        .next()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(60);

    let settings = Settings::from_env();
    let cache_hosts = match settings.cache_hosts() {
        Ok(hosts) => hosts,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let cache = CachePool::new(&cache_hosts, settings.cache_timeout());

    let peers = match Store::peers_from_hosts(&settings.cluster_peers, settings.remote_timeout()) {
        Ok(peers) => peers,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let backends = metricview::backends::BackendSet::new();
    let store = match Store::new(settings.data_dirs.clone(), peers, backends) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let now = Utc::now();
    let ctx = RequestContext {
        start_time: now - ChronoDuration::minutes(minutes_back),
        end_time: now,
        local_only: false,
    };

    let query = Query::new(
        pattern.clone(),
        Some(ctx.start_timestamp()),
        Some(ctx.end_timestamp()),
    );
    let nodes = store.find(&query).await;
    println!("{} node(s) match {}", nodes.len(), pattern);
    for node in &nodes {
        let marker = if node.is_leaf() { "" } else { " (branch)" };
        println!("  {}{}", node.metric_path(), marker);
    }

    let series_list = fetch_data(&ctx, &pattern, &store, &cache).await;
    for series in &series_list {
        let points: Vec<String> = series
            .iter()
            .map(|v| match v {
                Some(v) => format!("{:.2}", v),
                None => "-".to_string(),
            })
            .collect();
        println!(
            "{} [{}..{} step {}s]: {}",
            series.name,
            series.start,
            series.end,
            series.step,
            points.join(" ")
        );
    }
}
