//! Telemetry data model: records, batches, and resource identity.
//!
//! A [`Record`] is one unit of telemetry (a span or a log entry). Records are
//! owned by the producer until they are handed to the pipeline; after enqueue
//! the pipeline owns them exclusively until they are exported or dropped.
//! Records are `Clone` because a batch may be re-presented to the exporter on
//! retry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Which kind of telemetry a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    /// A finished trace span.
    Span,
    /// A log entry.
    LogEntry,
}

/// Outcome status of the operation a record describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Completed normally.
    Ok,
    /// Completed with an error; carries the error message.
    Error(String),
}

/// Scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    fn estimated_size(&self) -> usize {
        match self {
            AttributeValue::Bool(_) => 1,
            AttributeValue::Int(_) | AttributeValue::Float(_) => 8,
            AttributeValue::String(s) => s.len(),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

/// One unit of telemetry: a span or a log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Span or log entry.
    pub kind: RecordKind,
    /// When the record was produced.
    pub timestamp: SystemTime,
    /// Scalar attributes, sorted by key.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Trace correlation id, if any.
    pub trace_id: Option<String>,
    /// Span id, if any.
    pub span_id: Option<String>,
    /// Outcome status.
    pub status: RecordStatus,
}

impl Record {
    /// Creates a span record correlated to the given trace and span ids.
    pub fn span(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::Span,
            timestamp: SystemTime::now(),
            attributes: BTreeMap::new(),
            trace_id: Some(trace_id.into()),
            span_id: Some(span_id.into()),
            status: RecordStatus::Ok,
        }
    }

    /// Creates a log entry record with no trace correlation.
    pub fn log_entry() -> Self {
        Self {
            kind: RecordKind::LogEntry,
            timestamp: SystemTime::now(),
            attributes: BTreeMap::new(),
            trace_id: None,
            span_id: None,
            status: RecordStatus::Ok,
        }
    }

    /// Adds an attribute, replacing any previous value for the key.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Sets the outcome status.
    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }

    /// Rough wire-size estimate in bytes, used to bound batch size estimates.
    pub fn estimated_size(&self) -> usize {
        let attrs: usize = self
            .attributes
            .iter()
            .map(|(k, v)| k.len() + v.estimated_size())
            .sum();
        let ids = self.trace_id.as_deref().map_or(0, str::len)
            + self.span_id.as_deref().map_or(0, str::len);
        let status = match &self.status {
            RecordStatus::Ok => 1,
            RecordStatus::Error(msg) => msg.len(),
        };
        // 16 covers kind + timestamp
        16 + attrs + ids + status
    }
}

/// An ordered group of records handed to an exporter in one call.
///
/// Insertion order is preserved. A batch is consumed exactly once by a
/// successful export; the pipeline clones it only to retry a failed attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// The records, in enqueue order.
    pub records: Vec<Record>,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a batch from an already-ordered sequence of records.
    pub fn with_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Appends a record, preserving order.
    pub fn add(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of the per-record size estimates.
    pub fn estimated_bytes(&self) -> usize {
        self.records.iter().map(Record::estimated_size).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }
}

impl IntoIterator for Batch {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Identity attached once per batch by real exporters (service name, version,
/// and an optional routing/project identifier).
///
/// The pipeline core never touches this; exporter implementations own it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub service_name: String,
    pub service_version: Option<String>,
    pub project_id: Option<String>,
}

impl Resource {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: None,
            project_id: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_record_builder() {
        let record = Record::span("trace-1", "span-1")
            .with_attribute("http.method", "GET")
            .with_attribute("http.status_code", 200i64)
            .with_status(RecordStatus::Ok);

        assert_eq!(record.kind, RecordKind::Span);
        assert_eq!(record.trace_id.as_deref(), Some("trace-1"));
        assert_eq!(record.span_id.as_deref(), Some("span-1"));
        assert_eq!(
            record.attributes.get("http.method"),
            Some(&AttributeValue::String("GET".to_string()))
        );
        assert_eq!(
            record.attributes.get("http.status_code"),
            Some(&AttributeValue::Int(200))
        );
    }

    #[test]
    fn test_log_record_has_no_correlation() {
        let record = Record::log_entry().with_attribute("level", "warn");
        assert_eq!(record.kind, RecordKind::LogEntry);
        assert!(record.trace_id.is_none());
        assert!(record.span_id.is_none());
    }

    #[test]
    fn test_batch_preserves_order() {
        let mut batch = Batch::new();
        for i in 0..5 {
            batch.add(Record::log_entry().with_attribute("seq", i as i64));
        }
        let seqs: Vec<_> = batch
            .iter()
            .map(|r| r.attributes.get("seq").cloned())
            .collect();
        assert_eq!(
            seqs,
            (0..5)
                .map(|i| Some(AttributeValue::Int(i)))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_size_estimate_grows_with_attributes() {
        let small = Record::log_entry();
        let large = Record::log_entry().with_attribute("message", "a long log line goes here");
        assert!(large.estimated_size() > small.estimated_size());

        let batch = Batch::with_records(vec![small, large]);
        assert!(batch.estimated_bytes() > 0);
    }

    #[test]
    fn test_record_serializes_to_json() {
        let record = Record::span("t", "s").with_attribute("ok", true);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("trace_id"));
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
