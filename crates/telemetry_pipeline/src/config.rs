//! Pipeline configuration.

use crate::queue::OverflowPolicy;
use std::time::Duration;

/// Default maximum queue size.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 2_048;
/// Default maximum number of records per exported batch.
pub const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 512;
/// Default delay between two consecutive scheduled flushes.
pub const DEFAULT_SCHEDULE_DELAY: Duration = Duration::from_secs(5);
/// Default wall-clock budget for exporting one batch, retries included.
pub const DEFAULT_MAX_EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the batching pipeline.
///
/// Retry behavior is configured separately via [`RetryPolicy`].
///
/// [`RetryPolicy`]: crate::retry::RetryPolicy
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of records buffered for delayed processing. When the
    /// queue is full the overflow policy decides which record is dropped.
    pub max_queue_size: usize,
    /// Maximum number of records per batch. Reaching this queue length
    /// triggers an immediate flush ahead of the timer.
    pub max_export_batch_size: usize,
    /// Interval between scheduled flushes.
    pub schedule_delay: Duration,
    /// Total wall-clock budget for one batch's export attempts.
    pub max_export_timeout: Duration,
    /// Which record to discard when the queue is full.
    pub overflow_policy: OverflowPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
            schedule_delay: DEFAULT_SCHEDULE_DELAY,
            max_export_timeout: DEFAULT_MAX_EXPORT_TIMEOUT,
            overflow_policy: OverflowPolicy::DropOldest,
        }
    }
}

impl PipelineConfig {
    /// Batch size never exceeds queue capacity.
    pub(crate) fn effective_batch_size(&self) -> usize {
        self.max_export_batch_size.min(self.max_queue_size)
    }
}
