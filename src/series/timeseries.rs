//! Fixed-step sequences of nullable samples with lazy consolidation.

use serde::{Deserialize, Serialize};

/// How multiple raw samples collapse into one output point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidationFunc {
    Sum,
    Average,
}

impl ConsolidationFunc {
    fn apply(self, usable: &[f64]) -> f64 {
        let sum: f64 = usable.iter().sum();
        match self {
            ConsolidationFunc::Sum => sum,
            ConsolidationFunc::Average => sum / usable.len() as f64,
        }
    }
}

/// An ordered, fixed-step sequence of nullable numeric samples.
///
/// `values.len() == (end - start) / step` holds at creation. Consolidation is
/// a traversal-time view: [`TimeSeries::consolidate`] changes how many raw
/// samples collapse into each yielded point, but never mutates `values`, so a
/// fresh [`TimeSeries::iter`] with a different factor re-reads the same data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub step: u32,
    pub values: Vec<Option<f64>>,
    pub consolidation_func: ConsolidationFunc,
    values_per_point: usize,
}

impl TimeSeries {
    pub fn new(
        name: impl Into<String>,
        start: u32,
        end: u32,
        step: u32,
        values: Vec<Option<f64>>,
    ) -> Self {
        debug_assert!(step > 0, "Invariant violated: step must be positive");
        debug_assert_eq!(
            values.len() as u32,
            (end - start) / step,
            "Invariant violated: values length does not cover [start, end) at step"
        );
        TimeSeries {
            name: name.into(),
            start,
            end,
            step,
            values,
            consolidation_func: ConsolidationFunc::Average,
            values_per_point: 1,
        }
    }

    pub fn with_consolidation(mut self, func: ConsolidationFunc) -> Self {
        self.consolidation_func = func;
        self
    }

    /// Set how many raw samples each traversed point covers. A factor of 1
    /// restores raw iteration.
    pub fn consolidate(&mut self, values_per_point: usize) {
        self.values_per_point = values_per_point.max(1);
    }

    pub fn values_per_point(&self) -> usize {
        self.values_per_point
    }

    /// Lazily traverse the series under the current consolidation factor.
    ///
    /// Each call starts a fresh traversal; groups are consolidated over their
    /// non-null members only, an all-null group yields `None`, and a final
    /// group short of the factor still yields one point.
    pub fn iter(&self) -> ConsolidatedValues<'_> {
        ConsolidatedValues {
            series: self,
            at: 0,
        }
    }

    /// Number of points one full traversal yields.
    pub fn points(&self) -> usize {
        if self.values.is_empty() {
            0
        } else {
            self.values.len().div_ceil(self.values_per_point)
        }
    }
}

impl std::fmt::Display for TimeSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TimeSeries(name={}, start={}, end={}, step={})",
            self.name, self.start, self.end, self.step
        )
    }
}

/// Lazy consolidating traversal over a [`TimeSeries`].
pub struct ConsolidatedValues<'a> {
    series: &'a TimeSeries,
    at: usize,
}

impl Iterator for ConsolidatedValues<'_> {
    type Item = Option<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        let values = &self.series.values;
        if self.at >= values.len() {
            return None;
        }
        let group_end = (self.at + self.series.values_per_point).min(values.len());
        let usable: Vec<f64> = values[self.at..group_end].iter().flatten().copied().collect();
        self.at = group_end;

        if usable.is_empty() {
            Some(None)
        } else {
            Some(Some(self.series.consolidation_func.apply(&usable)))
        }
    }
}
