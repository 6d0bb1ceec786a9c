//! Summary statistics over usage samples
//!
//! Percentiles use the nearest-rank method with floor indexing: the sorted
//! samples are indexed at `floor(count * q)`, clamped to the last index. There
//! is no interpolation, so results are reproducible across runs and a single
//! sample yields that sample for every percentile.

use serde::{Deserialize, Serialize};

/// Quantile used for the 95th percentile
pub const P95: f64 = 0.95;

/// Quantile used for the 99th percentile
pub const P99: f64 = 0.99;

/// Numeric domain the statistics engine can summarize
pub trait Sample: Copy + PartialOrd + Default {
    /// Arithmetic mean of a non-empty slice, in input order
    fn mean(values: &[Self]) -> Self;

    /// Sort ascending in place
    fn sort(values: &mut [Self]);
}

impl Sample for f64 {
    fn mean(values: &[Self]) -> Self {
        let sum: f64 = values.iter().sum();
        sum / values.len() as f64
    }

    fn sort(values: &mut [Self]) {
        values.sort_by(|a, b| a.total_cmp(b));
    }
}

impl Sample for i64 {
    // Truncating integer division, accumulated wide to survive large byte counts
    fn mean(values: &[Self]) -> Self {
        let sum: i128 = values.iter().map(|&v| v as i128).sum();
        (sum / values.len() as i128) as i64
    }

    fn sort(values: &mut [Self]) {
        values.sort_unstable();
    }
}

/// Average, maximum and tail percentiles of a sample sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary<T> {
    pub avg: T,
    pub max: T,
    pub p95: T,
    pub p99: T,
}

/// Index of the nearest-rank percentile in a sorted sequence of `count` items
pub fn nearest_rank_index(count: usize, quantile: f64) -> usize {
    if count == 0 {
        return 0;
    }
    let index = (count as f64 * quantile).floor() as usize;
    index.min(count - 1)
}

/// Summarize samples. Empty input yields an all-zero summary; callers must
/// check the sample count before trusting the result.
pub fn summarize<T: Sample>(samples: &[T]) -> Summary<T> {
    if samples.is_empty() {
        return Summary::default();
    }

    let mut sorted = samples.to_vec();
    T::sort(&mut sorted);

    Summary {
        avg: T::mean(samples),
        max: sorted[sorted.len() - 1],
        p95: sorted[nearest_rank_index(sorted.len(), P95)],
        p99: sorted[nearest_rank_index(sorted.len(), P99)],
    }
}
