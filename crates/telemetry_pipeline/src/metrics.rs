//! Pipeline-wide counters.
//!
//! One `PipelineMetrics` instance belongs to one pipeline; it is never a
//! process-wide singleton, so tests can run independent pipelines side by
//! side. All counters are atomics updated with relaxed increments and
//! readable from any context without touching the queue lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the queue, the flush worker, and the processor handle.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Records delivered in successfully exported batches.
    records_exported: AtomicU64,
    /// Batches the exporter accepted.
    batches_exported: AtomicU64,
    /// Records discarded by queue overflow or at shutdown timeout.
    records_dropped: AtomicU64,
    /// Batches discarded after retries or the export budget ran out.
    batches_dropped: AtomicU64,
    /// Individual failed `export` calls, including ones that were retried.
    export_failures: AtomicU64,
}

impl PipelineMetrics {
    pub fn records_exported(&self) -> u64 {
        self.records_exported.load(Ordering::Relaxed)
    }

    pub fn batches_exported(&self) -> u64 {
        self.batches_exported.load(Ordering::Relaxed)
    }

    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    pub fn batches_dropped(&self) -> u64 {
        self.batches_dropped.load(Ordering::Relaxed)
    }

    pub fn export_failures(&self) -> u64 {
        self.export_failures.load(Ordering::Relaxed)
    }

    pub(crate) fn record_export_success(&self, record_count: u64) {
        self.records_exported
            .fetch_add(record_count, Ordering::Relaxed);
        self.batches_exported.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_export_failure(&self) {
        self.export_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_records(&self, count: u64) {
        self.records_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_batch(&self) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }
}
