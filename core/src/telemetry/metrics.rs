use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Per-pipeline cycle counters.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub processed: usize,
    pub acquisition_failures: usize,
    pub skipped_estimates: usize,
    pub buffer_resets: usize,
}

#[derive(Default)]
struct Metrics {
    snapshot: MetricsSnapshot,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_processed(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.snapshot.processed += 1;
        }
    }

    pub fn record_acquisition_failure(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.snapshot.acquisition_failures += 1;
        }
    }

    pub fn record_skipped(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.snapshot.skipped_estimates += 1;
        }
    }

    pub fn record_reset(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.snapshot.buffer_resets += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            metrics.snapshot
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = MetricsRecorder::new();
        metrics.record_processed();
        metrics.record_processed();
        metrics.record_skipped();
        metrics.record_acquisition_failure();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.skipped_estimates, 1);
        assert_eq!(snapshot.acquisition_failures, 1);
        assert_eq!(snapshot.buffer_resets, 0);
    }
}
