//! Bounded FIFO buffer between producers and the flush worker.
//!
//! `enqueue` never blocks: a full queue triggers the configured overflow
//! policy synchronously and the drop is counted. Concurrent producers may
//! enqueue; exactly one consumer (the flush worker) drains at a time. The
//! buffer is guarded by a mutex; the drop counter lives in the shared
//! [`PipelineMetrics`] and is readable without taking the lock.

use crate::metrics::PipelineMetrics;
use crate::record::Record;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Which record is discarded when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest queued record to make room for the incoming one.
    DropOldest,
    /// Discard the incoming record.
    DropIncoming,
}

/// Bounded concurrent FIFO of pending records.
pub struct BatchQueue {
    buffer: Mutex<VecDeque<Record>>,
    capacity: usize,
    policy: OverflowPolicy,
    metrics: Arc<PipelineMetrics>,
}

impl BatchQueue {
    /// Creates a queue with its own metrics instance.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self::with_metrics(capacity, policy, Arc::new(PipelineMetrics::default()))
    }

    /// Creates a queue that counts drops into a shared metrics instance.
    pub fn with_metrics(
        capacity: usize,
        policy: OverflowPolicy,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            metrics,
        }
    }

    /// Appends a record, applying the overflow policy when full.
    ///
    /// Returns `false` only when the incoming record itself was dropped
    /// (`DropIncoming`). Under `DropOldest` the incoming record is always
    /// accepted and the evicted record is counted instead.
    pub fn enqueue(&self, record: Record) -> bool {
        let mut buffer = self.buffer.lock().unwrap();
        if buffer.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::DropIncoming => {
                    drop(buffer);
                    self.metrics.record_dropped_records(1);
                    return false;
                }
                OverflowPolicy::DropOldest => {
                    buffer.pop_front();
                    buffer.push_back(record);
                    drop(buffer);
                    self.metrics.record_dropped_records(1);
                    return true;
                }
            }
        }
        buffer.push_back(record);
        true
    }

    /// Removes and returns up to `max_items` records in FIFO order.
    pub fn drain(&self, max_items: usize) -> Vec<Record> {
        let mut buffer = self.buffer.lock().unwrap();
        let n = max_items.min(buffer.len());
        buffer.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records dropped so far, by overflow or shutdown. Lock-free read.
    pub fn dropped_count(&self) -> u64 {
        self.metrics.records_dropped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AttributeValue, Record};

    fn record(seq: i64) -> Record {
        Record::log_entry().with_attribute("seq", seq)
    }

    fn seq_of(record: &Record) -> i64 {
        match record.attributes.get("seq") {
            Some(AttributeValue::Int(i)) => *i,
            other => panic!("missing seq attribute: {:?}", other),
        }
    }

    #[test]
    fn test_fifo_order_no_loss_no_duplication() {
        let queue = BatchQueue::new(64, OverflowPolicy::DropOldest);
        for i in 0..50 {
            assert!(queue.enqueue(record(i)));
        }
        assert_eq!(queue.len(), 50);

        let first = queue.drain(20);
        let rest = queue.drain(usize::MAX);
        let seqs: Vec<i64> = first.iter().chain(rest.iter()).map(seq_of).collect();
        assert_eq!(seqs, (0..50).collect::<Vec<_>>());
        assert!(queue.is_empty());
        assert_eq!(queue.dropped_count(), 0);
    }

    #[test]
    fn test_drop_oldest_evicts_head() {
        let queue = BatchQueue::new(3, OverflowPolicy::DropOldest);
        for i in 0..3 {
            queue.enqueue(record(i));
        }
        // Queue is full; the incoming record evicts seq 0.
        assert!(queue.enqueue(record(3)));
        assert_eq!(queue.dropped_count(), 1);

        let seqs: Vec<i64> = queue.drain(usize::MAX).iter().map(seq_of).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn test_drop_incoming_rejects_new_record() {
        let queue = BatchQueue::new(2, OverflowPolicy::DropIncoming);
        assert!(queue.enqueue(record(0)));
        assert!(queue.enqueue(record(1)));
        assert!(!queue.enqueue(record(2)));
        assert_eq!(queue.dropped_count(), 1);

        let seqs: Vec<i64> = queue.drain(usize::MAX).iter().map(seq_of).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn test_drain_is_bounded() {
        let queue = BatchQueue::new(16, OverflowPolicy::DropOldest);
        for i in 0..10 {
            queue.enqueue(record(i));
        }
        assert_eq!(queue.drain(4).len(), 4);
        assert_eq!(queue.len(), 6);
        assert_eq!(queue.drain(100).len(), 6);
        assert!(queue.drain(100).is_empty());
    }

    #[test]
    fn test_concurrent_producers_never_exceed_capacity() {
        use std::sync::Arc;
        use std::thread;

        let queue = Arc::new(BatchQueue::new(128, OverflowPolicy::DropOldest));
        let mut handles = Vec::new();
        for t in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    queue.enqueue(record(t * 100 + i));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.len(), 128);
        assert_eq!(queue.dropped_count(), 400 - 128);
    }
}
