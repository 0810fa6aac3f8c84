//! Per-destination batching queues.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::event::Record;

/// Bounded FIFO of records waiting to fill a batch for one destination.
///
/// Appending and draining happen under one lock, so concurrent callers never
/// split or interleave a batch. A batch is drained the moment the queue
/// reaches `batch_size`, so the queue never holds a full batch between calls
/// and stays within `capacity`.
#[derive(Debug)]
pub struct BatchingQueue {
    batch_size: usize,
    capacity: usize,
    records: Mutex<VecDeque<Record>>,
}

impl BatchingQueue {
    pub fn new(batch_size: usize, capacity: usize) -> Self {
        let capacity = capacity.max(batch_size);
        Self {
            batch_size,
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Appends records in order and returns every batch that filled up, each
    /// exactly `batch_size` records. A partial batch stays queued for a later
    /// call.
    pub fn offer_all(&self, records: Vec<Record>) -> Vec<Vec<Record>> {
        let mut batches = Vec::new();
        let mut queue = self.records.lock();
        for record in records {
            queue.push_back(record);
            if queue.len() >= self.batch_size {
                batches.push(queue.drain(..self.batch_size).collect());
            }
        }
        batches
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
