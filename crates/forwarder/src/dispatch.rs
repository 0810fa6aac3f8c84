//! Bounded worker pool that sends forwarded batches.
//!
//! Pipeline threads submit jobs without blocking; a fixed set of worker
//! threads performs the network call and hands the outcome to the job's
//! completion callback. Completions run on worker threads in no particular
//! order.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::client::{ForwardRequest, ForwardResponse, PeerForwarderClient};
use crate::error::ClientError;
use crate::event::Record;

/// Receives the outcome of a dispatched batch together with its records.
pub trait DispatchCompletion: Send + Sync + 'static {
    fn complete(
        &self,
        request: &ForwardRequest,
        outcome: Result<ForwardResponse, ClientError>,
        elapsed: Duration,
        records: Vec<Record>,
    );
}

pub struct DispatchJob {
    pub request: ForwardRequest,
    pub records: Vec<Record>,
    pub completion: Arc<dyn DispatchCompletion>,
}

impl std::fmt::Debug for DispatchJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchJob")
            .field("destination", &self.request.destination)
            .field("records", &self.records.len())
            .finish()
    }
}

/// Why a job was not accepted. The job is handed back so its records can be
/// processed locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    QueueFull,
    ShutDown,
}

pub struct DispatchPool {
    sender: Mutex<Option<Sender<DispatchJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DispatchPool {
    pub fn new(
        thread_count: usize,
        queue_capacity: usize,
        client: Arc<dyn PeerForwarderClient>,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = channel::bounded::<DispatchJob>(queue_capacity);

        let mut workers = Vec::with_capacity(thread_count);
        for index in 0..thread_count {
            let receiver = receiver.clone();
            let client = Arc::clone(&client);
            let handle = thread::Builder::new()
                .name(format!("peer-forwarder-dispatch-{}", index))
                .spawn(move || run_worker(receiver, client))?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    /// Queues a job without blocking.
    pub fn submit(&self, job: DispatchJob) -> Result<(), (SubmitError, DispatchJob)> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err((SubmitError::ShutDown, job));
        };
        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => (SubmitError::QueueFull, job),
            TrySendError::Disconnected(job) => (SubmitError::ShutDown, job),
        })
    }

    /// Jobs waiting for a worker.
    pub fn pending(&self) -> usize {
        self.sender.lock().as_ref().map_or(0, Sender::len)
    }

    /// Stops accepting jobs, lets workers finish what is queued, and joins them.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                warn!("peer forwarder dispatch worker panicked");
            }
        }
    }
}

impl Drop for DispatchPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(receiver: Receiver<DispatchJob>, client: Arc<dyn PeerForwarderClient>) {
    for job in receiver.iter() {
        let DispatchJob {
            request,
            records,
            completion,
        } = job;

        debug!(destination = %request.destination, records = records.len(), "dispatching forwarded batch");
        let started = Instant::now();
        let outcome = client.forward(&request);
        completion.complete(&request, outcome, started.elapsed(), records);
    }
}
