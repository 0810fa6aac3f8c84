use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::PeerForwarder;
use crate::address::LocalAddressResolver;
use crate::batching::BatchingQueue;
use crate::buffer::PeerForwarderReceiveBuffer;
use crate::client::{ForwardRequest, ForwardResponse};
use crate::codec;
use crate::config::PeerForwarderConfig;
use crate::dispatch::{DispatchCompletion, DispatchJob, DispatchPool};
use crate::error::ClientError;
use crate::event::Record;
use crate::hash_ring::PeerHashRing;
use crate::metrics::ForwarderMetrics;

/// Forwarder that routes each record to the peer owning its identification
/// key values.
///
/// Records owned by this node are returned straight away. Records owned by a
/// peer are batched per destination and sent on the dispatch pool once a full
/// batch is available; a batch the peer does not accept is written into this
/// node's receive buffer instead, so it is still processed exactly here.
pub struct RemotePeerForwarder {
    pipeline_name: String,
    plugin_id: String,
    identification_keys: BTreeSet<String>,
    hash_ring: Arc<PeerHashRing>,
    address_resolver: Arc<dyn LocalAddressResolver>,
    dispatch: Arc<DispatchPool>,
    receive_buffer: Arc<PeerForwarderReceiveBuffer>,
    batching_queues: DashMap<String, Arc<BatchingQueue>>,
    batch_size: usize,
    batching_queue_capacity: usize,
    receive_poll_delay: Duration,
    fallback: Arc<LocalFallback>,
    metrics: ForwarderMetrics,
}

impl RemotePeerForwarder {
    pub fn new(
        config: &PeerForwarderConfig,
        identification_keys: BTreeSet<String>,
        receive_buffer: Arc<PeerForwarderReceiveBuffer>,
        hash_ring: Arc<PeerHashRing>,
        address_resolver: Arc<dyn LocalAddressResolver>,
        dispatch: Arc<DispatchPool>,
    ) -> Self {
        let pipeline_name = receive_buffer.pipeline_name().to_string();
        let plugin_id = receive_buffer.plugin_id().to_string();
        let metrics = ForwarderMetrics::new(&pipeline_name, &plugin_id);

        let fallback = Arc::new(LocalFallback {
            pipeline_name: pipeline_name.clone(),
            plugin_id: plugin_id.clone(),
            receive_buffer: Arc::clone(&receive_buffer),
            write_timeout: config.local_write_timeout(),
            metrics: metrics.clone(),
        });

        Self {
            pipeline_name,
            plugin_id,
            identification_keys,
            hash_ring,
            address_resolver,
            dispatch,
            receive_buffer,
            batching_queues: DashMap::new(),
            batch_size: config.batch_size(),
            batching_queue_capacity: config.batching_queue_capacity(),
            receive_poll_delay: config.receive_poll_delay(),
            fallback,
            metrics,
        }
    }

    pub fn identification_keys(&self) -> &BTreeSet<String> {
        &self.identification_keys
    }

    /// Records waiting in batching queues for a full batch.
    pub fn pending_batched_records(&self) -> usize {
        self.batching_queues.iter().map(|q| q.len()).sum()
    }

    fn composite_key(&self, record: &Record) -> Vec<Option<String>> {
        self.identification_keys
            .iter()
            .map(|key| record.data.get_string(key))
            .collect()
    }

    /// Groups records by owning peer. `None` collects records with no owner.
    fn group_by_destination(&self, records: Vec<Record>) -> HashMap<Option<String>, Vec<Record>> {
        let mut groups: HashMap<Option<String>, Vec<Record>> = HashMap::new();
        for record in records {
            let destination = self.hash_ring.get_server_ip(&self.composite_key(&record));
            groups.entry(destination).or_default().push(record);
        }
        groups
    }

    fn is_local_address(&self, destination: &str) -> bool {
        match self.address_resolver.is_local(destination) {
            Ok(local) => local,
            Err(e) => {
                warn!(
                    destination = %destination,
                    error = %e,
                    "could not resolve peer address, processing its records locally"
                );
                true
            }
        }
    }

    fn batching_queue(&self, destination: &str) -> Arc<BatchingQueue> {
        if let Some(queue) = self.batching_queues.get(destination) {
            return Arc::clone(queue.value());
        }
        let queue = self
            .batching_queues
            .entry(destination.to_string())
            .or_insert_with(|| Arc::new(BatchingQueue::new(self.batch_size, self.batching_queue_capacity)));
        Arc::clone(queue.value())
    }

    /// Queues records for `destination` and dispatches every full batch.
    /// Returns the records that have to be processed locally instead.
    fn forward_to_peer(&self, destination: String, records: Vec<Record>) -> Vec<Record> {
        let batches = self.batching_queue(&destination).offer_all(records);
        let mut local = Vec::new();

        for batch in batches {
            self.metrics.records_to_be_forwarded.increment(batch.len() as u64);
            if let Err(records) = self.dispatch_batch(&destination, batch) {
                self.metrics.records_failed_forwarding.increment(records.len() as u64);
                local.extend(records);
            }
        }
        local
    }

    fn dispatch_batch(&self, destination: &str, batch: Vec<Record>) -> Result<(), Vec<Record>> {
        let payload = match codec::encode(&batch, &self.pipeline_name, &self.plugin_id) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(destination = %destination, error = %e, "failed to encode batch, processing it locally");
                return Err(batch);
            }
        };

        let job = DispatchJob {
            request: ForwardRequest {
                destination: destination.to_string(),
                pipeline_name: self.pipeline_name.clone(),
                plugin_id: self.plugin_id.clone(),
                payload,
            },
            records: batch,
            completion: Arc::clone(&self.fallback) as Arc<dyn DispatchCompletion>,
        };

        self.dispatch.submit(job).map_err(|(reason, job)| {
            warn!(
                destination = %destination,
                reason = ?reason,
                records = job.records.len(),
                "dispatch pool did not accept batch, processing it locally"
            );
            job.records
        })
    }
}

impl PeerForwarder for RemotePeerForwarder {
    fn forward_records(&self, records: Vec<Record>) -> Vec<Record> {
        let mut local = Vec::new();

        for (destination, group) in self.group_by_destination(records) {
            let destination = match destination {
                Some(d) if !self.is_local_address(&d) => d,
                _ => {
                    self.metrics.records_to_be_processed_locally.increment(group.len() as u64);
                    local.extend(group);
                    continue;
                }
            };
            local.extend(self.forward_to_peer(destination, group));
        }
        local
    }

    fn receive_records(&self) -> Vec<Record> {
        let (records, token) = self.receive_buffer.read(self.receive_poll_delay);
        self.receive_buffer.checkpoint(&token);
        self.metrics.records_received_from_peers.increment(records.len() as u64);
        records
    }

    fn is_ready_for_shutdown(&self) -> bool {
        self.receive_buffer.is_empty()
    }
}

impl std::fmt::Debug for RemotePeerForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePeerForwarder")
            .field("pipeline_name", &self.pipeline_name)
            .field("plugin_id", &self.plugin_id)
            .field("identification_keys", &self.identification_keys)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

/// Completes dispatched batches; rejected ones go to the local receive buffer.
struct LocalFallback {
    pipeline_name: String,
    plugin_id: String,
    receive_buffer: Arc<PeerForwarderReceiveBuffer>,
    write_timeout: Duration,
    metrics: ForwarderMetrics,
}

impl DispatchCompletion for LocalFallback {
    fn complete(
        &self,
        request: &ForwardRequest,
        outcome: Result<ForwardResponse, ClientError>,
        elapsed: Duration,
        records: Vec<Record>,
    ) {
        self.metrics.request_latency.record(elapsed.as_secs_f64());
        let count = records.len() as u64;

        let failure = match outcome {
            Ok(response) if response.is_success() => {
                debug!(destination = %request.destination, records = count, "forwarded batch");
                self.metrics.requests_successful.increment(1);
                self.metrics.records_successfully_forwarded.increment(count);
                return;
            }
            Ok(response) => format!("peer answered with status {}", response.status.code()),
            Err(e) => e.to_string(),
        };

        self.metrics.requests_failed.increment(1);
        self.metrics.records_failed_forwarding.increment(count);
        warn!(
            destination = %request.destination,
            records = count,
            reason = %failure,
            "forwarding failed, writing batch to local receive buffer"
        );

        if let Err(e) = self.receive_buffer.write_all(records, self.write_timeout) {
            error!(
                pipeline = %self.pipeline_name,
                plugin_id = %self.plugin_id,
                destination = %request.destination,
                records = count,
                error = %e,
                "dropping batch that could neither be forwarded nor buffered locally"
            );
            self.metrics.records_dropped.increment(count);
        }
    }
}
