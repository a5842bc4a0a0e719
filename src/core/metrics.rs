//! Operation metrics, injected into the ledger and processor
//!
//! There are no process-wide counters. Whoever builds the ledger picks a
//! recorder: [`NoopMetrics`] when nobody is watching, [`InMemoryMetrics`] when
//! a test or the replay summary wants to read the numbers back.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Sink for operation counters, latencies and batch sizes
pub trait MetricsRecorder: Send + Sync {
    /// Count one occurrence of `operation` ending with `outcome`
    fn record_operation(&self, operation: &'static str, outcome: &'static str);

    fn observe_duration(&self, operation: &'static str, elapsed: Duration);

    /// Record the size of a flushed deposit batch
    fn observe_batch(&self, size: usize);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn record_operation(&self, _operation: &'static str, _outcome: &'static str) {}

    fn observe_duration(&self, _operation: &'static str, _elapsed: Duration) {}

    fn observe_batch(&self, _size: usize) {}
}

/// Counters kept in memory, readable at any time
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    operations: DashMap<(&'static str, &'static str), u64>,
    durations: DashMap<&'static str, (u64, Duration)>,
    batches: AtomicU64,
    batched_items: AtomicU64,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// How often `operation` finished with `outcome`
    pub fn count(&self, operation: &'static str, outcome: &'static str) -> u64 {
        self.operations
            .get(&(operation, outcome))
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// Number of samples and their summed duration for `operation`
    pub fn timing(&self, operation: &'static str) -> (u64, Duration) {
        self.durations
            .get(&operation)
            .map(|entry| *entry)
            .unwrap_or((0, Duration::ZERO))
    }

    /// Flushed batches and the total number of transactions they carried
    pub fn batches(&self) -> (u64, u64) {
        (
            self.batches.load(Ordering::Relaxed),
            self.batched_items.load(Ordering::Relaxed),
        )
    }
}

impl MetricsRecorder for InMemoryMetrics {
    fn record_operation(&self, operation: &'static str, outcome: &'static str) {
        *self.operations.entry((operation, outcome)).or_insert(0) += 1;
    }

    fn observe_duration(&self, operation: &'static str, elapsed: Duration) {
        let mut entry = self
            .durations
            .entry(operation)
            .or_insert((0, Duration::ZERO));
        entry.0 += 1;
        entry.1 += elapsed;
    }

    fn observe_batch(&self, size: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.batched_items.fetch_add(size as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_operation_and_outcome() {
        let metrics = InMemoryMetrics::new();
        metrics.record_operation("deposit", "completed");
        metrics.record_operation("deposit", "completed");
        metrics.record_operation("deposit", "failed");

        assert_eq!(metrics.count("deposit", "completed"), 2);
        assert_eq!(metrics.count("deposit", "failed"), 1);
        assert_eq!(metrics.count("transfer", "completed"), 0);
    }

    #[test]
    fn test_durations_and_batches_accumulate() {
        let metrics = InMemoryMetrics::new();
        metrics.observe_duration("transfer", Duration::from_millis(3));
        metrics.observe_duration("transfer", Duration::from_millis(4));
        metrics.observe_batch(10);
        metrics.observe_batch(2);

        assert_eq!(metrics.timing("transfer"), (2, Duration::from_millis(7)));
        assert_eq!(metrics.batches(), (2, 12));
    }
}
