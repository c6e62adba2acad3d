//! The batch processor: decouples record production from export.
//!
//! Producers call [`BatchProcessor::enqueue`], which never blocks. A single
//! background worker drains the queue into batches and drives the exporter,
//! waking on a schedule-delay timer or as soon as the queue reaches one full
//! batch. Export failures are retried with capped exponential backoff inside
//! a wall-clock budget and are never surfaced to producers.

use crate::config::PipelineConfig;
use crate::exporter::RecordExporterBoxed;
use crate::metrics::PipelineMetrics;
use crate::queue::BatchQueue;
use crate::record::{Batch, Record};
use crate::retry::{JitterSource, RandomJitter, RetryPolicy};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Returned when a record or control request arrives after shutdown began.
///
/// Recoverable: the caller should drop or redirect the record. Telemetry
/// pressure must never break the producing application.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("telemetry pipeline is closed")]
pub struct PipelineClosed;

/// Lifecycle of a pipeline. Transitions are forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    ShuttingDown,
    Stopped,
}

const STATE_RUNNING: u8 = 0;
const STATE_SHUTTING_DOWN: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Control requests handled by the flush worker.
enum Control {
    /// Drain and export everything currently queued, then acknowledge.
    ForceFlush(oneshot::Sender<()>),
    /// Drain until empty or the deadline, acknowledge, and exit.
    Shutdown {
        deadline: Instant,
        ack: oneshot::Sender<()>,
    },
}

/// Orchestrates the batching pipeline.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct BatchProcessor {
    queue: Arc<BatchQueue>,
    metrics: Arc<PipelineMetrics>,
    state: AtomicU8,
    flush_notify: Arc<Notify>,
    control_tx: mpsc::UnboundedSender<Control>,
    worker: Mutex<Option<JoinHandle<()>>>,
    // Records drained but not yet exported or counted. Whoever swaps this
    // to zero claims them, so the worker and the shutdown abort path never
    // count the same batch twice.
    in_flight: Arc<AtomicU64>,
    max_export_batch_size: usize,
}

impl BatchProcessor {
    /// Creates a processor with default retry policy, random jitter, and a
    /// fresh metrics instance. Must be called within a tokio runtime.
    pub fn new(config: PipelineConfig, exporter: Arc<dyn RecordExporterBoxed>) -> Self {
        Self::with_options(
            config,
            exporter,
            RetryPolicy::default(),
            Box::new(RandomJitter::new()),
            Arc::new(PipelineMetrics::default()),
        )
    }

    /// Creates a processor with an explicit retry policy.
    pub fn with_retry(
        config: PipelineConfig,
        exporter: Arc<dyn RecordExporterBoxed>,
        retry: RetryPolicy,
    ) -> Self {
        Self::with_options(
            config,
            exporter,
            retry,
            Box::new(RandomJitter::new()),
            Arc::new(PipelineMetrics::default()),
        )
    }

    /// Fully explicit construction: injectable jitter source and metrics,
    /// for deterministic tests and shared counters.
    pub fn with_options(
        config: PipelineConfig,
        exporter: Arc<dyn RecordExporterBoxed>,
        retry: RetryPolicy,
        jitter: Box<dyn JitterSource>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let max_export_batch_size = config.effective_batch_size();
        let queue = Arc::new(BatchQueue::with_metrics(
            config.max_queue_size,
            config.overflow_policy,
            Arc::clone(&metrics),
        ));
        let flush_notify = Arc::new(Notify::new());
        let in_flight = Arc::new(AtomicU64::new(0));
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let worker = Worker {
            queue: Arc::clone(&queue),
            exporter,
            retry,
            jitter,
            metrics: Arc::clone(&metrics),
            flush_notify: Arc::clone(&flush_notify),
            in_flight: Arc::clone(&in_flight),
            schedule_delay: config.schedule_delay,
            max_export_timeout: config.max_export_timeout,
            max_export_batch_size,
        };
        let handle = tokio::spawn(worker.run(control_rx));

        Self {
            queue,
            metrics,
            state: AtomicU8::new(STATE_RUNNING),
            flush_notify,
            control_tx,
            worker: Mutex::new(Some(handle)),
            in_flight,
            max_export_batch_size,
        }
    }

    /// Appends a record to the queue.
    ///
    /// Never blocks. A full queue triggers the overflow policy and is
    /// reported through the dropped-record counter, not to the caller.
    /// Fails only once shutdown has begun.
    pub fn enqueue(&self, record: Record) -> Result<(), PipelineClosed> {
        if self.state.load(Ordering::Acquire) != STATE_RUNNING {
            return Err(PipelineClosed);
        }
        self.queue.enqueue(record);
        // Shutdown may have completed between the state check and the push.
        // The worker is gone then, so count the stranded records ourselves.
        if self.state.load(Ordering::Acquire) == STATE_STOPPED {
            let stranded = self.queue.drain(usize::MAX).len() as u64;
            if stranded > 0 {
                self.metrics.record_dropped_records(stranded);
            }
            return Err(PipelineClosed);
        }
        if self.queue.len() >= self.max_export_batch_size {
            self.flush_notify.notify_one();
        }
        Ok(())
    }

    /// Drains and exports everything currently queued, waiting for the
    /// worker's acknowledgement.
    pub async fn force_flush(&self) -> Result<(), PipelineClosed> {
        if self.state.load(Ordering::Acquire) != STATE_RUNNING {
            return Err(PipelineClosed);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.control_tx
            .send(Control::ForceFlush(ack_tx))
            .map_err(|_| PipelineClosed)?;
        ack_rx.await.map_err(|_| PipelineClosed)
    }

    /// Shuts the pipeline down: rejects new records, drains and exports the
    /// remaining queue until empty or `timeout` elapses, then stops.
    ///
    /// Never suspends the caller longer than `timeout` (plus scheduling
    /// slack). Records still queued past the deadline are dropped and
    /// counted; an in-flight export attempt is abandoned. Returns
    /// `Err(PipelineClosed)` if shutdown already ran.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), PipelineClosed> {
        if self
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_SHUTTING_DOWN,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(PipelineClosed);
        }

        let deadline = Instant::now() + timeout;
        let handle = self.worker.lock().unwrap().take();
        let (ack_tx, ack_rx) = oneshot::channel();

        if self
            .control_tx
            .send(Control::Shutdown {
                deadline,
                ack: ack_tx,
            })
            .is_ok()
        {
            match tokio::time::timeout(timeout, ack_rx).await {
                Ok(_) => {
                    if let Some(handle) = handle {
                        let _ = handle.await;
                    }
                }
                Err(_) => {
                    // Deadline reached with the worker still exporting.
                    // Abandon the in-flight attempt; its records were already
                    // drained from the queue, so claim and count them here
                    // along with whatever is still queued.
                    if let Some(handle) = handle {
                        handle.abort();
                    }
                    let abandoned = self.in_flight.swap(0, Ordering::AcqRel);
                    let remaining =
                        abandoned + self.queue.drain(usize::MAX).len() as u64;
                    if remaining > 0 {
                        self.metrics.record_dropped_records(remaining);
                        warn!(
                            dropped = remaining,
                            "shutdown timeout reached, dropping queued records"
                        );
                    }
                }
            }
        } else if let Some(handle) = handle {
            handle.abort();
        }

        self.state.store(STATE_STOPPED, Ordering::Release);
        // Producers that passed the running check before the state flipped
        // may have pushed after the worker's final drain.
        let stragglers = self.queue.drain(usize::MAX).len() as u64;
        if stragglers > 0 {
            self.metrics.record_dropped_records(stragglers);
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        match self.state.load(Ordering::Acquire) {
            STATE_RUNNING => PipelineState::Running,
            STATE_SHUTTING_DOWN => PipelineState::ShuttingDown,
            _ => PipelineState::Stopped,
        }
    }

    /// Number of records currently buffered.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Counters for this pipeline instance.
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }
}

/// The single background flush worker. Exactly one per pipeline, so flushes
/// are single-flight by construction; the `Notify` permit coalesces size
/// triggers that fire while a flush is in progress.
struct Worker {
    queue: Arc<BatchQueue>,
    exporter: Arc<dyn RecordExporterBoxed>,
    retry: RetryPolicy,
    jitter: Box<dyn JitterSource>,
    metrics: Arc<PipelineMetrics>,
    flush_notify: Arc<Notify>,
    in_flight: Arc<AtomicU64>,
    schedule_delay: Duration,
    max_export_timeout: Duration,
    max_export_batch_size: usize,
}

impl Worker {
    async fn run(mut self, mut control_rx: mpsc::UnboundedReceiver<Control>) {
        // First tick after one full period, not immediately. Interval
        // periods must be nonzero.
        let period = self.schedule_delay.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let notify = Arc::clone(&self.flush_notify);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush_once().await;
                }
                _ = notify.notified() => {
                    self.flush_once().await;
                }
                msg = control_rx.recv() => match msg {
                    Some(Control::ForceFlush(ack)) => {
                        self.flush_all().await;
                        let _ = ack.send(());
                    }
                    Some(Control::Shutdown { deadline, ack }) => {
                        self.drain_until(deadline).await;
                        let _ = ack.send(());
                        break;
                    }
                    // Processor handle dropped without shutdown; stop quietly.
                    None => break,
                },
            }
        }
    }

    /// Drains up to one batch and exports it. Empty queue is a no-op.
    async fn flush_once(&mut self) {
        let records = self.queue.drain(self.max_export_batch_size);
        if records.is_empty() {
            return;
        }
        self.export_with_retry(Batch::with_records(records)).await;
    }

    /// Drains and exports until the queue is empty.
    async fn flush_all(&mut self) {
        loop {
            let records = self.queue.drain(self.max_export_batch_size);
            if records.is_empty() {
                return;
            }
            self.export_with_retry(Batch::with_records(records)).await;
        }
    }

    /// Exports one batch, retrying per the policy within the wall-clock
    /// budget. A batch that cannot be delivered is dropped and counted,
    /// never re-raised.
    async fn export_with_retry(&mut self, batch: Batch) {
        let started = Instant::now();
        let record_count = batch.len() as u64;
        let mut attempt: u32 = 0;
        self.in_flight.store(record_count, Ordering::Release);

        loop {
            match self.exporter.export_boxed(batch.clone()).await {
                Ok(()) => {
                    // Zero means shutdown already claimed these records.
                    if self.in_flight.swap(0, Ordering::AcqRel) != 0 {
                        self.metrics.record_export_success(record_count);
                        debug!(records = record_count, "batch exported");
                    }
                    return;
                }
                Err(err) => {
                    attempt += 1;
                    self.metrics.record_export_failure();
                    if !self.retry.should_retry(attempt) {
                        if self.in_flight.swap(0, Ordering::AcqRel) != 0 {
                            self.metrics.record_dropped_batch();
                            warn!(
                                error = %err,
                                attempts = attempt,
                                records = record_count,
                                "export retries exhausted, dropping batch"
                            );
                        }
                        return;
                    }
                    let delay = self
                        .retry
                        .delay_with_jitter(attempt - 1, self.jitter.as_mut());
                    if started.elapsed() + delay >= self.max_export_timeout {
                        if self.in_flight.swap(0, Ordering::AcqRel) != 0 {
                            self.metrics.record_dropped_batch();
                            warn!(
                                error = %err,
                                attempts = attempt,
                                records = record_count,
                                "export timeout budget exhausted, dropping batch"
                            );
                        }
                        return;
                    }
                    sleep(delay).await;
                }
            }
        }
    }

    /// Final shutdown drain: export batch after batch, no retries, until the
    /// queue is empty or the deadline passes. Whatever remains is dropped
    /// and counted.
    async fn drain_until(&mut self, deadline: Instant) {
        while Instant::now() < deadline {
            let records = self.queue.drain(self.max_export_batch_size);
            if records.is_empty() {
                return;
            }
            let count = records.len() as u64;
            self.in_flight.store(count, Ordering::Release);
            match self
                .exporter
                .export_boxed(Batch::with_records(records))
                .await
            {
                Ok(()) => {
                    if self.in_flight.swap(0, Ordering::AcqRel) != 0 {
                        self.metrics.record_export_success(count);
                    }
                }
                Err(err) => {
                    self.metrics.record_export_failure();
                    if self.in_flight.swap(0, Ordering::AcqRel) != 0 {
                        self.metrics.record_dropped_batch();
                        warn!(error = %err, "export failed during shutdown, dropping batch");
                    }
                }
            }
        }

        let remaining = self.queue.drain(usize::MAX).len() as u64;
        if remaining > 0 {
            self.metrics.record_dropped_records(remaining);
            warn!(
                dropped = remaining,
                "shutdown deadline reached, dropping queued records"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::InMemoryExporter;
    use crate::queue::OverflowPolicy;
    use crate::record::Record;
    use crate::retry::NoJitter;

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            max_queue_size: 64,
            max_export_batch_size: 16,
            schedule_delay: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_force_flush_exports_everything() {
        let exporter = Arc::new(InMemoryExporter::new());
        let processor = BatchProcessor::new(small_config(), exporter.clone());

        for i in 0..10 {
            processor
                .enqueue(Record::log_entry().with_attribute("seq", i as i64))
                .unwrap();
        }
        processor.force_flush().await.unwrap();

        assert_eq!(exporter.record_count(), 10);
        assert_eq!(processor.queue_len(), 0);
        assert_eq!(processor.metrics().records_exported(), 10);
    }

    #[tokio::test]
    async fn test_timer_flush() {
        let exporter = Arc::new(InMemoryExporter::new());
        let processor = BatchProcessor::new(small_config(), exporter.clone());

        processor.enqueue(Record::log_entry()).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(exporter.record_count(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_rejected() {
        let exporter = Arc::new(InMemoryExporter::new());
        let processor = BatchProcessor::new(small_config(), exporter.clone());

        processor.enqueue(Record::log_entry()).unwrap();
        processor.shutdown(Duration::from_secs(1)).await.unwrap();

        assert_eq!(processor.state(), PipelineState::Stopped);
        assert_eq!(processor.enqueue(Record::log_entry()), Err(PipelineClosed));
        assert_eq!(processor.enqueue(Record::log_entry()), Err(PipelineClosed));
        // Shutdown is not repeatable.
        assert_eq!(
            processor.shutdown(Duration::from_secs(1)).await,
            Err(PipelineClosed)
        );
        // The record enqueued before shutdown was flushed, not lost.
        assert_eq!(exporter.record_count(), 1);
    }

    #[tokio::test]
    async fn test_overflow_is_counted_not_raised() {
        let exporter = Arc::new(InMemoryExporter::new());
        let config = PipelineConfig {
            max_queue_size: 4,
            max_export_batch_size: 4,
            schedule_delay: Duration::from_secs(3600),
            overflow_policy: OverflowPolicy::DropIncoming,
            ..Default::default()
        };
        let processor = BatchProcessor::with_options(
            config,
            exporter,
            RetryPolicy::default(),
            Box::new(NoJitter),
            Arc::new(PipelineMetrics::default()),
        );

        // Fill the queue without yielding, so the worker cannot drain yet.
        for i in 0..6 {
            processor
                .enqueue(Record::log_entry().with_attribute("seq", i as i64))
                .unwrap();
        }
        assert_eq!(processor.metrics().records_dropped(), 2);
    }
}
