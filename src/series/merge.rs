//! Overlay merge of cache samples onto disk data, and wide-column resampling.

use crate::backends::FetchedData;

/// Outcome of [`merge_results`]: whichever side survived, unmodified when the
/// other was absent.
#[derive(Debug, Clone, PartialEq)]
pub enum MergedResult {
    /// Dense fixed-step data (disk, possibly overlaid with cache samples).
    Series(FetchedData),
    /// Sparse cache samples returned verbatim because no disk data existed.
    Points(Vec<(u32, f64)>),
}

/// Overlay sparse cache samples onto a dense on-disk array.
///
/// The cache holds recent, still-unflushed writes, so it is authoritative for
/// any timestamp both sides cover: each `(timestamp, value)` sample overwrites
/// the disk slot `(timestamp - timestamp % step - start) / step`. Samples
/// landing outside the array are silently dropped. If either side is absent
/// the other is returned unmodified; `None` when both are.
pub fn merge_results(
    db_results: Option<FetchedData>,
    cache_results: Vec<(u32, f64)>,
) -> Option<MergedResult> {
    let mut db = match db_results {
        Some(db) => db,
        None => {
            if cache_results.is_empty() {
                return None;
            }
            return Some(MergedResult::Points(cache_results));
        }
    };

    if db.step == 0 {
        return Some(MergedResult::Series(db));
    }

    for (timestamp, value) in cache_results {
        let interval = timestamp - (timestamp % db.step);
        let index = (i64::from(interval) - i64::from(db.start)) / i64::from(db.step);
        if index >= 0 && (index as usize) < db.values.len() {
            db.values[index as usize] = Some(value);
        }
    }

    Some(MergedResult::Series(db))
}

/// Bucket finer-grained samples into an array matching a metric's declared
/// reporting rate.
///
/// Produces `(end - start) / rate` slots; each sample lands in
/// `round((timestamp - start) / rate)` clamped to the final slot so late
/// timestamps never overflow. Later samples overwrite earlier ones in the
/// same bucket (the scan's own ordering decides who wins). Samples before
/// `start` are dropped.
pub fn resample(points: &[(u32, f64)], start: u32, end: u32, rate: u32) -> Vec<Option<f64>> {
    debug_assert!(rate > 0, "Invariant violated: rate must be positive");
    let buckets = ((end.saturating_sub(start)) / rate) as usize;
    let mut values: Vec<Option<f64>> = vec![None; buckets];
    if buckets == 0 {
        return values;
    }

    for &(timestamp, value) in points {
        if timestamp < start {
            continue;
        }
        let offset = f64::from(timestamp - start) / f64::from(rate);
        let bucket = (offset.round() as usize).min(buckets - 1);
        values[bucket] = Some(value);
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(start: u32, step: u32, values: Vec<Option<f64>>) -> FetchedData {
        let end = start + step * values.len() as u32;
        FetchedData {
            start,
            end,
            step,
            values,
        }
    }

    #[test]
    fn test_overlay_merge() {
        let db = disk(0, 10, vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]);
        let cached = vec![(5, 99.0), (25, 77.0)];

        match merge_results(Some(db), cached).unwrap() {
            MergedResult::Series(merged) => {
                assert_eq!(
                    merged.values,
                    vec![Some(99.0), Some(2.0), Some(77.0), Some(4.0)]
                );
            }
            other => panic!("expected merged series, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_cache_is_identity() {
        let db = disk(0, 10, vec![Some(1.0), None, Some(3.0)]);
        let expected = db.clone();
        assert_eq!(
            merge_results(Some(db), vec![]),
            Some(MergedResult::Series(expected))
        );
    }

    #[test]
    fn test_cache_only_returned_verbatim() {
        let cached = vec![(10, 1.5), (20, 2.5)];
        assert_eq!(
            merge_results(None, cached.clone()),
            Some(MergedResult::Points(cached))
        );
    }

    #[test]
    fn test_both_absent() {
        assert_eq!(merge_results(None, vec![]), None);
    }

    #[test]
    fn test_out_of_range_samples_dropped() {
        let db = disk(100, 10, vec![Some(1.0), Some(2.0)]);
        // One before the window, one past its end
        let cached = vec![(50, 9.0), (500, 9.0)];

        match merge_results(Some(db), cached).unwrap() {
            MergedResult::Series(merged) => {
                assert_eq!(merged.values, vec![Some(1.0), Some(2.0)]);
            }
            other => panic!("expected merged series, got {:?}", other),
        }
    }

    #[test]
    fn test_resample_bucket_count_and_clamp() {
        let points = vec![(0, 1.0), (60, 2.0), (179, 3.0)];
        let values = resample(&points, 0, 180, 60);
        assert_eq!(values.len(), 3);
        // t=179 rounds to bucket 3 but clamps into the final bucket
        assert_eq!(values, vec![Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_resample_last_write_wins() {
        let points = vec![(10, 1.0), (12, 2.0)];
        let values = resample(&points, 0, 120, 60);
        assert_eq!(values[0], Some(2.0));
    }

    #[test]
    fn test_resample_drops_samples_before_start() {
        let points = vec![(5, 1.0), (65, 2.0)];
        let values = resample(&points, 60, 180, 60);
        assert_eq!(values, vec![Some(2.0), None]);
    }
}
