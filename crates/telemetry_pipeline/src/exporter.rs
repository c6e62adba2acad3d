//! Exporter trait and the provided exporter implementations.
//!
//! The pipeline is exporter-agnostic: anything that can ship a [`Batch`] to a
//! backend implements [`RecordExporter`]. A production OTLP exporter is out
//! of scope here; its contract is documented on the trait and any
//! implementation plugs in unchanged.

use crate::record::{Batch, Record, Resource};
use std::future::Future;
use thiserror::Error;

/// Error types for batch export operations.
#[derive(Debug, Error, Clone)]
pub enum ExportError {
    /// Transport-layer error (network, gRPC, HTTP).
    #[error("transport error: {0}")]
    Transport(String),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Export operation timed out.
    #[error("export operation timed out")]
    Timeout,
}

/// Ships one batch of records to a backend.
///
/// Uses native async fn in traits; for dynamic dispatch use
/// [`RecordExporterBoxed`].
///
/// # Contract
///
/// - `export` must not block indefinitely; implementations apply their own
///   I/O timeout and map any failure (non-2xx response, I/O error, timeout)
///   to an [`ExportError`].
/// - The batch must not be retained past `export`'s return without copying;
///   the pipeline hands each batch over exactly once per attempt.
/// - A network implementation POSTs the serialized batch to a collector
///   endpoint (separate traces and logs paths) and attaches its [`Resource`]
///   attributes once per batch.
pub trait RecordExporter: Send + Sync {
    /// Exports a batch of records.
    fn export(&self, batch: Batch) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Returns the exporter name for diagnostics.
    fn name(&self) -> &str;
}

/// Object-safe version of [`RecordExporter`] for dynamic dispatch.
pub trait RecordExporterBoxed: Send + Sync {
    /// Exports a batch of records (boxed future for object safety).
    fn export_boxed(
        &self,
        batch: Batch,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>>;

    /// Returns the exporter name for diagnostics.
    fn name(&self) -> &str;
}

/// Blanket implementation: any `RecordExporter` can be used boxed.
impl<T: RecordExporter> RecordExporterBoxed for T {
    fn export_boxed(
        &self,
        batch: Batch,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>> {
        Box::pin(self.export(batch))
    }

    fn name(&self) -> &str {
        RecordExporter::name(self)
    }
}

/// Keeps every exported batch in memory for later assertion.
///
/// Available outside test builds so downstream crates can verify their own
/// pipeline wiring.
#[derive(Debug, Default)]
pub struct InMemoryExporter {
    batches: std::sync::Mutex<Vec<Batch>>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All exported batches, in export order.
    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().unwrap().clone()
    }

    /// All exported records flattened, preserving batch and record order.
    pub fn records(&self) -> Vec<Record> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|b| b.records.iter().cloned())
            .collect()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn record_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Batch::len).sum()
    }

    /// Discards everything recorded so far.
    pub fn reset(&self) {
        self.batches.lock().unwrap().clear();
    }
}

impl RecordExporter for InMemoryExporter {
    async fn export(&self, batch: Batch) -> Result<(), ExportError> {
        self.batches.lock().unwrap().push(batch);
        Ok(())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

/// Prints batch summaries to stdout. Debugging aid.
pub struct StdoutExporter {
    verbose: bool,
}

impl StdoutExporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl RecordExporter for StdoutExporter {
    async fn export(&self, batch: Batch) -> Result<(), ExportError> {
        println!(
            "=== Exporting {} records (~{} bytes) ===",
            batch.len(),
            batch.estimated_bytes()
        );
        if self.verbose {
            for record in &batch {
                println!(
                    "Record: kind={:?} trace_id={:?} span_id={:?} status={:?} attrs={}",
                    record.kind,
                    record.trace_id,
                    record.span_id,
                    record.status,
                    record.attributes.len()
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

/// Writes each batch as a JSON document to a file, with the resource
/// attributes attached once per batch. Local development aid.
pub struct JsonFileExporter {
    file_path: String,
    resource: Resource,
}

impl JsonFileExporter {
    pub fn new(file_path: impl Into<String>, resource: Resource) -> Self {
        Self {
            file_path: file_path.into(),
            resource,
        }
    }
}

#[derive(serde::Serialize)]
struct BatchEnvelope<'a> {
    resource: &'a Resource,
    records: &'a [Record],
}

impl RecordExporter for JsonFileExporter {
    async fn export(&self, batch: Batch) -> Result<(), ExportError> {
        let envelope = BatchEnvelope {
            resource: &self.resource,
            records: &batch.records,
        };
        let json = serde_json::to_string_pretty(&envelope)
            .map_err(|e| ExportError::Serialization(e.to_string()))?;

        tokio::fs::write(&self.file_path, json)
            .await
            .map_err(|e| ExportError::Transport(e.to_string()))?;

        Ok(())
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

/// Discards all records. Benchmarks and smoke tests.
#[derive(Debug, Default)]
pub struct NullExporter;

impl NullExporter {
    pub fn new() -> Self {
        Self
    }
}

impl RecordExporter for NullExporter {
    async fn export(&self, _batch: Batch) -> Result<(), ExportError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn batch_of(n: usize) -> Batch {
        Batch::with_records(
            (0..n)
                .map(|i| Record::log_entry().with_attribute("seq", i as i64))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_in_memory_exporter_records_batches() {
        let exporter = InMemoryExporter::new();
        exporter.export(batch_of(3)).await.unwrap();
        exporter.export(batch_of(2)).await.unwrap();

        assert_eq!(exporter.batch_count(), 2);
        assert_eq!(exporter.record_count(), 5);
        assert_eq!(exporter.batches()[0].len(), 3);

        exporter.reset();
        assert_eq!(exporter.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_null_exporter_accepts_anything() {
        let exporter = NullExporter::new();
        exporter.export(batch_of(1_000)).await.unwrap();
    }

    #[tokio::test]
    async fn test_boxed_dispatch() {
        use std::sync::Arc;
        let exporter: Arc<dyn RecordExporterBoxed> = Arc::new(InMemoryExporter::new());
        exporter.export_boxed(batch_of(4)).await.unwrap();
        assert_eq!(exporter.name(), "in_memory");
    }

    #[tokio::test]
    async fn test_json_file_exporter_writes_envelope() {
        let path = std::env::temp_dir().join("telemetry_pipeline_export_test.json");
        let resource = Resource::new("test-service")
            .with_version("1.2.3")
            .with_project_id("proj-42");
        let exporter = JsonFileExporter::new(path.to_string_lossy(), resource);

        exporter.export(batch_of(2)).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["resource"]["service_name"], "test-service");
        assert_eq!(value["records"].as_array().unwrap().len(), 2);

        let _ = tokio::fs::remove_file(&path).await;
    }
}
