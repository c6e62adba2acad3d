//! End-to-end pipeline demo.
//!
//! Runs several concurrent producer tasks generating span and log records
//! with realistic attributes, ships them through the batching pipeline into
//! a simulated flaky backend, and prints final pipeline statistics after a
//! graceful shutdown.
//!
//! ```bash
//! cargo run -p telemetry_pipeline --bin demo --release
//! RUST_LOG=debug cargo run -p telemetry_pipeline --bin demo
//! ```

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry_pipeline::{
    Batch, BatchProcessor, ExportError, PipelineConfig, Record, RecordExporter, RecordStatus,
    RetryPolicy,
};
use tracing_subscriber::EnvFilter;

/// Simulated backend that occasionally rejects a batch, to exercise the
/// retry path.
struct FlakyBackendExporter {
    failure_rate: f64,
    latency: Duration,
    export_attempts: AtomicU64,
}

impl FlakyBackendExporter {
    fn new(failure_rate: f64, latency: Duration) -> Self {
        Self {
            failure_rate,
            latency,
            export_attempts: AtomicU64::new(0),
        }
    }

    fn attempts(&self) -> u64 {
        self.export_attempts.load(Ordering::Relaxed)
    }
}

impl RecordExporter for FlakyBackendExporter {
    async fn export(&self, batch: Batch) -> Result<(), ExportError> {
        self.export_attempts.fetch_add(1, Ordering::Relaxed);
        let roll: f64 = rand::thread_rng().gen();

        tokio::time::sleep(self.latency).await;

        if roll < self.failure_rate {
            Err(ExportError::Transport(format!(
                "simulated backend failure (batch of {} records)",
                batch.len()
            )))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        "flaky-backend"
    }
}

async fn run_producer(producer_id: usize, count: usize, processor: Arc<BatchProcessor>) -> u64 {
    let operations = ["http.request", "db.query", "cache.get", "queue.publish"];
    let service_name = format!("service-{}", producer_id % 2);
    let mut rejected = 0u64;

    for i in 0..count {
        let trace_id = format!("{:016x}{:016x}", producer_id, i);
        let span_id = format!("{:016x}", (producer_id << 32) | i);
        let operation = operations[i % operations.len()];

        let mut record = Record::span(trace_id, span_id)
            .with_attribute("service.name", service_name.as_str())
            .with_attribute("operation", operation)
            .with_attribute("http.status_code", if i % 10 == 9 { 500i64 } else { 200 });

        if i % 10 == 9 {
            record = record.with_status(RecordStatus::Error("simulated error".into()));
        }

        if processor.enqueue(record).is_err() {
            rejected += 1;
        }

        // Interleave an occasional log entry with the spans.
        if i % 25 == 0 {
            let log = Record::log_entry()
                .with_attribute("service.name", service_name.as_str())
                .with_attribute("message", format!("processed {} operations", i));
            if processor.enqueue(log).is_err() {
                rejected += 1;
            }
        }

        if i % 50 == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    rejected
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let num_producers = 4;
    let records_per_producer = 2_000;

    let config = PipelineConfig {
        max_queue_size: 4_096,
        max_export_batch_size: 256,
        schedule_delay: Duration::from_millis(500),
        ..Default::default()
    };
    let retry = RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(200),
    };

    let backend = Arc::new(FlakyBackendExporter::new(0.10, Duration::from_millis(5)));
    let processor = Arc::new(BatchProcessor::with_retry(
        config,
        backend.clone(),
        retry,
    ));

    println!(
        "producing {} records across {} tasks into a flaky backend (10% failure rate)",
        num_producers * records_per_producer,
        num_producers
    );

    let started = Instant::now();
    let mut producers = Vec::new();
    for producer_id in 0..num_producers {
        let processor = Arc::clone(&processor);
        producers.push(tokio::spawn(run_producer(
            producer_id,
            records_per_producer,
            processor,
        )));
    }

    let mut rejected = 0u64;
    for producer in producers {
        rejected += producer.await?;
    }
    let generation_time = started.elapsed();

    processor.force_flush().await?;
    processor.shutdown(Duration::from_secs(5)).await?;

    let metrics = processor.metrics();
    println!("\nproducers finished in {:?}", generation_time);
    println!("records exported:   {}", metrics.records_exported());
    println!("batches exported:   {}", metrics.batches_exported());
    println!("records dropped:    {}", metrics.records_dropped());
    println!("batches dropped:    {}", metrics.batches_dropped());
    println!("export failures:    {}", metrics.export_failures());
    println!("backend attempts:   {}", backend.attempts());
    println!("rejected enqueues:  {}", rejected);

    Ok(())
}
