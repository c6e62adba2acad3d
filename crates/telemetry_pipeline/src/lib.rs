//! Batched Telemetry Export Pipeline
//!
//! Decouples telemetry production from export: producers hand [`Record`]s
//! (spans or log entries) to a [`BatchProcessor`], which buffers them in a
//! bounded FIFO and ships size- or time-triggered batches through a
//! pluggable async [`RecordExporter`] with bounded retry and a graceful
//! shutdown flush.
//!
//! Design goals:
//!
//! - `enqueue` is non-blocking and O(1); telemetry pressure never blocks or
//!   breaks the producing application.
//! - Exactly one background flush worker per pipeline; flushes are
//!   single-flight and triggers coalesce.
//! - Failures stay inside the pipeline: overflow, retry exhaustion, and
//!   shutdown drops are reported through per-pipeline counters and the
//!   `tracing` diagnostic channel, never to producers.
//! - Delivery is best-effort and purely in-memory; records not exported
//!   before a clean shutdown completes are lost.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use telemetry_pipeline::{BatchProcessor, PipelineConfig, Record, StdoutExporter};
//!
//! let processor = BatchProcessor::new(
//!     PipelineConfig::default(),
//!     Arc::new(StdoutExporter::new(false)),
//! );
//!
//! processor.enqueue(
//!     Record::span("trace-1", "span-1").with_attribute("http.method", "GET"),
//! )?;
//!
//! // On process exit: flush what is left, bounded by the timeout.
//! processor.shutdown(Duration::from_secs(5)).await?;
//! ```

pub mod config;
pub mod exporter;
pub mod metrics;
pub mod processor;
pub mod queue;
pub mod record;
pub mod retry;

// Re-export main types
pub use config::{
    PipelineConfig, DEFAULT_MAX_EXPORT_BATCH_SIZE, DEFAULT_MAX_EXPORT_TIMEOUT,
    DEFAULT_MAX_QUEUE_SIZE, DEFAULT_SCHEDULE_DELAY,
};
pub use exporter::{
    ExportError, InMemoryExporter, JsonFileExporter, NullExporter, RecordExporter,
    RecordExporterBoxed, StdoutExporter,
};
pub use metrics::PipelineMetrics;
pub use processor::{BatchProcessor, PipelineClosed, PipelineState};
pub use queue::{BatchQueue, OverflowPolicy};
pub use record::{AttributeValue, Batch, Record, RecordKind, RecordStatus, Resource};
pub use retry::{JitterSource, NoJitter, RandomJitter, RetryPolicy};
