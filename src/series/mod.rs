//! Time series model and the algorithms that reconcile disk and cache data.

mod merge;
mod timeseries;

pub use merge::{merge_results, resample, MergedResult};
pub use timeseries::{ConsolidatedValues, ConsolidationFunc, TimeSeries};
