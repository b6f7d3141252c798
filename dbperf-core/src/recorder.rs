use crate::{LatencyStats, StatsError};
use std::time::Duration;

/// Latency samples for one test, in milliseconds.
///
/// Single writer. Concurrent workers each own a recorder and the runner merges them with
/// [`LatencyRecorder::extend`] once every worker is done.
#[derive(Debug, Clone, Default)]
pub struct LatencyRecorder {
    samples: Vec<f64>,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, duration_ms: f64) {
        self.samples.push(duration_ms);
    }

    pub fn record_duration(&mut self, elapsed: Duration) {
        self.record(elapsed.as_secs_f64() * 1_000.);
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Moves every sample of `other` into this recorder.
    pub fn extend(&mut self, other: LatencyRecorder) {
        self.samples.extend(other.samples);
    }

    pub fn summarize(&self) -> Result<LatencyStats, StatsError> {
        LatencyStats::from_samples(&self.samples)
    }
}
