use crate::StatsError;
use std::fmt;

/// Summary of one test's latency samples, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub avg: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
}

impl LatencyStats {
    pub fn from_samples(samples: &[f64]) -> Result<Self, StatsError> {
        if samples.is_empty() {
            return Err(StatsError::EmptySampleSet);
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let sum: f64 = sorted.iter().sum();
        Ok(Self {
            avg: sum / sorted.len() as f64,
            median: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
        })
    }

    /// `(name, value)` pairs in report order.
    pub fn fields(&self) -> [(&'static str, f64); 6] {
        [
            ("avg", self.avg),
            ("median", self.median),
            ("p95", self.p95),
            ("p99", self.p99),
            ("min", self.min),
            ("max", self.max),
        ]
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, min={:.2}ms, max={:.2}ms",
            self.avg, self.median, self.p95, self.p99, self.min, self.max
        )
    }
}

/// How percentiles are picked. Reports are only comparable with each other while this holds.
pub const PERCENTILE_RULE: &str = "nearest rank, zero-based: sorted[floor(q * (n - 1))]";

/// Index of the `quantile` sample within `len` ascending samples.
///
/// See [`PERCENTILE_RULE`]: `floor(quantile * (len - 1))`, no interpolation. The median is the
/// `0.5` case, which picks the lower middle element for even `len`.
pub fn percentile_index(quantile: f64, len: usize) -> usize {
    debug_assert!((0.0..=1.0).contains(&quantile));
    if len == 0 {
        return 0;
    }
    let idx = (quantile * (len - 1) as f64).floor() as usize;
    idx.min(len - 1)
}

/// `sorted` must be ascending and non-empty.
pub fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    sorted[percentile_index(quantile, sorted.len())]
}
