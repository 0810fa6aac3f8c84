//! Bounded, checkpointed receive buffer.
//!
//! Holds records peers forwarded to this node and records this node failed to
//! forward. Capacity counts both queued records and records handed out by
//! [`read`](PeerForwarderReceiveBuffer::read) that have not been checkpointed
//! yet, so a slow consumer pushes back on writers.

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::BufferError;
use crate::event::Record;

/// Identifies one read so its records can be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckpointToken {
    id: u64,
    record_count: usize,
}

impl CheckpointToken {
    const EMPTY: CheckpointToken = CheckpointToken { id: 0, record_count: 0 };

    pub fn record_count(&self) -> usize {
        self.record_count
    }
}

struct InFlightRead {
    records: Vec<Record>,
    deadline: Instant,
}

struct BufferState {
    queue: VecDeque<Record>,
    in_flight: HashMap<u64, InFlightRead>,
    in_flight_records: usize,
    next_token: u64,
}

impl BufferState {
    fn used(&self) -> usize {
        self.queue.len() + self.in_flight_records
    }

    /// Puts reads that were never checkpointed back at the head of the queue.
    fn redeliver_expired(&mut self, now: Instant) -> usize {
        let mut expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, read)| read.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        // Newest first, so the oldest read ends up in front.
        expired.sort_unstable_by(|a, b| b.cmp(a));

        let mut redelivered = 0;
        for id in expired {
            if let Some(read) = self.in_flight.remove(&id) {
                self.in_flight_records -= read.records.len();
                redelivered += read.records.len();
                for record in read.records.into_iter().rev() {
                    self.queue.push_front(record);
                }
            }
        }
        redelivered
    }
}

pub struct PeerForwarderReceiveBuffer {
    pipeline_name: String,
    plugin_id: String,
    capacity: usize,
    batch_size: usize,
    checkpoint_timeout: Duration,
    state: Mutex<BufferState>,
    space_available: Condvar,
    records_available: Condvar,
}

impl PeerForwarderReceiveBuffer {
    pub fn new(
        pipeline_name: impl Into<String>,
        plugin_id: impl Into<String>,
        capacity: usize,
        batch_size: usize,
        checkpoint_timeout: Duration,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            plugin_id: plugin_id.into(),
            capacity,
            batch_size,
            checkpoint_timeout,
            state: Mutex::new(BufferState {
                queue: VecDeque::with_capacity(capacity),
                in_flight: HashMap::new(),
                in_flight_records: 0,
                next_token: 1,
            }),
            space_available: Condvar::new(),
            records_available: Condvar::new(),
        }
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn write(&self, record: Record, timeout: Duration) -> Result<(), BufferError> {
        self.write_all(vec![record], timeout)
    }

    /// Writes all records or none, waiting up to `timeout` for space.
    pub fn write_all(&self, records: Vec<Record>, timeout: Duration) -> Result<(), BufferError> {
        let requested = records.len();
        if requested > self.capacity {
            return Err(BufferError::SizeOverflow {
                requested,
                capacity: self.capacity,
            });
        }
        if requested == 0 {
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.used() + requested > self.capacity {
            if self.space_available.wait_until(&mut state, deadline).timed_out()
                && state.used() + requested > self.capacity
            {
                return Err(BufferError::Timeout(timeout));
            }
        }

        state.queue.extend(records);
        drop(state);
        self.records_available.notify_all();
        Ok(())
    }

    /// Takes up to one batch of records, waiting up to `wait` while the buffer is empty.
    ///
    /// The records stay counted against capacity until the returned token is
    /// checkpointed. If that does not happen within the checkpoint timeout they
    /// are handed out again.
    pub fn read(&self, wait: Duration) -> (Vec<Record>, CheckpointToken) {
        let deadline = Instant::now() + wait;
        let mut state = self.state.lock();

        let redelivered = state.redeliver_expired(Instant::now());
        if redelivered > 0 {
            warn!(
                pipeline = %self.pipeline_name,
                plugin_id = %self.plugin_id,
                records = redelivered,
                "redelivering receive buffer reads that were never checkpointed"
            );
        }

        while state.queue.is_empty() {
            if self.records_available.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }

        let take = state.queue.len().min(self.batch_size);
        if take == 0 {
            return (Vec::new(), CheckpointToken::EMPTY);
        }

        let records: Vec<Record> = state.queue.drain(..take).collect();
        let id = state.next_token;
        state.next_token += 1;
        state.in_flight_records += take;
        state.in_flight.insert(
            id,
            InFlightRead {
                records: records.clone(),
                deadline: Instant::now() + self.checkpoint_timeout,
            },
        );

        (records, CheckpointToken { id, record_count: take })
    }

    /// Releases the capacity held by a read. Unknown or repeated tokens are ignored.
    pub fn checkpoint(&self, token: &CheckpointToken) {
        let released = {
            let mut state = self.state.lock();
            match state.in_flight.remove(&token.id) {
                Some(read) => {
                    state.in_flight_records -= read.records.len();
                    true
                }
                None => false,
            }
        };
        if released {
            self.space_available.notify_all();
        }
    }

    /// Queued plus in-flight records.
    pub fn len(&self) -> usize {
        self.state.lock().used()
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().in_flight_records
    }

    /// True once nothing is queued and every read has been checkpointed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PeerForwarderReceiveBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerForwarderReceiveBuffer")
            .field("pipeline_name", &self.pipeline_name)
            .field("plugin_id", &self.plugin_id)
            .field("capacity", &self.capacity)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record_with;
    use std::sync::Arc;
    use std::thread;

    fn buffer(capacity: usize, batch_size: usize) -> PeerForwarderReceiveBuffer {
        PeerForwarderReceiveBuffer::new("pipeline", "plugin", capacity, batch_size, Duration::from_secs(30))
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n).map(|i| record_with("id", &i.to_string())).collect()
    }

    #[test]
    fn read_returns_at_most_one_batch() {
        let buffer = buffer(10, 3);
        buffer.write_all(records(5), Duration::from_millis(10)).unwrap();

        // First read is capped at the batch size, oldest first
        let (first, token) = buffer.read(Duration::from_millis(10));
        assert_eq!(first.len(), 3);
        assert_eq!(token.record_count(), 3);
        assert_eq!(first[0].data.get_string("id"), Some("0".to_string()));

        // Second read picks up the remainder
        let (second, _) = buffer.read(Duration::from_millis(10));
        assert_eq!(second.len(), 2);
        assert_eq!(buffer.len(), 5, "unchecked reads still hold capacity");
    }

    #[test]
    fn empty_read_waits_then_returns_nothing() {
        let buffer = buffer(4, 2);
        let started = Instant::now();
        // Nothing written: the read waits out its delay
        let (records, token) = buffer.read(Duration::from_millis(30));
        assert!(records.is_empty());
        assert_eq!(token.record_count(), 0);
        assert!(started.elapsed() >= Duration::from_millis(30));
        buffer.checkpoint(&token);
        assert!(buffer.is_empty());
    }

    #[test]
    fn checkpoint_is_idempotent() {
        let buffer = buffer(4, 4);
        buffer.write_all(records(2), Duration::from_millis(10)).unwrap();
        buffer.write_all(records(1), Duration::from_millis(10)).unwrap();

        // Separate writes come back as one batch
        let (batch, token) = buffer.read(Duration::from_millis(10));
        assert_eq!(batch.len(), 3);

        buffer.checkpoint(&token);
        buffer.checkpoint(&token);
        assert!(buffer.is_empty());

        // Nothing comes back after a double checkpoint.
        let (again, _) = buffer.read(Duration::from_millis(5));
        assert!(again.is_empty());
    }

    #[test]
    fn oversized_write_is_rejected() {
        let buffer = buffer(2, 2);
        assert_eq!(
            buffer.write_all(records(3), Duration::from_millis(10)),
            Err(BufferError::SizeOverflow { requested: 3, capacity: 2 })
        );
    }

    #[test]
    fn write_times_out_when_full() {
        let buffer = buffer(2, 2);
        buffer.write_all(records(2), Duration::from_millis(10)).unwrap();
        assert_eq!(
            buffer.write(record_with("id", "x"), Duration::from_millis(20)),
            Err(BufferError::Timeout(Duration::from_millis(20)))
        );

        // Reading alone does not free space; checkpointing does.
        let (_, token) = buffer.read(Duration::from_millis(10));
        assert!(buffer.write(record_with("id", "x"), Duration::from_millis(5)).is_err());
        buffer.checkpoint(&token);
        assert!(buffer.write(record_with("id", "x"), Duration::from_millis(5)).is_ok());
    }

    #[test]
    fn blocked_writer_resumes_after_checkpoint() {
        let buffer = Arc::new(buffer(2, 2));
        buffer.write_all(records(2), Duration::from_millis(10)).unwrap();
        let (_, token) = buffer.read(Duration::from_millis(10));

        let writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.write_all(records(2), Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(50));
        buffer.checkpoint(&token);
        assert!(writer.join().unwrap().is_ok());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn blocked_reader_wakes_on_write() {
        let buffer = Arc::new(buffer(4, 4));
        let reader = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.read(Duration::from_secs(5)).0.len())
        };

        thread::sleep(Duration::from_millis(50));
        buffer.write(record_with("id", "late"), Duration::from_millis(10)).unwrap();
        assert_eq!(reader.join().unwrap(), 1);
    }

    #[test]
    fn expired_reads_are_redelivered_in_order() {
        let buffer = PeerForwarderReceiveBuffer::new("pipeline", "plugin", 10, 2, Duration::from_millis(10));
        buffer.write_all(records(3), Duration::from_millis(10)).unwrap();

        // Read without checkpointing, then let the read expire
        let (first, stale_token) = buffer.read(Duration::from_millis(5));
        assert_eq!(first.len(), 2);
        thread::sleep(Duration::from_millis(30));

        let (again, token) = buffer.read(Duration::from_millis(5));
        assert_eq!(again, first);

        // The stale token no longer releases anything.
        buffer.checkpoint(&stale_token);
        assert_eq!(buffer.in_flight_len(), 2);
        buffer.checkpoint(&token);
        assert_eq!(buffer.len(), 1);
    }
}
