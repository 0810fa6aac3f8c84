//! Intake for batches other peers forward to this node.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::{ForwardResponse, ForwardStatus};
use crate::codec;
use crate::error::BufferError;
use crate::metrics::ServerMetrics;
use crate::provider::ReceiveBuffers;

/// Writes forwarded batches into the receive buffer of the registration they
/// name. A transport server calls [`handle`](Self::handle) with each request
/// body and answers with the returned status.
pub struct ForwardedRequestHandler {
    receive_buffers: Arc<ReceiveBuffers>,
    request_timeout: Duration,
    metrics: ServerMetrics,
}

impl ForwardedRequestHandler {
    pub(crate) fn new(receive_buffers: Arc<ReceiveBuffers>, request_timeout: Duration) -> Self {
        Self {
            receive_buffers,
            request_timeout,
            metrics: ServerMetrics::new(),
        }
    }

    pub fn handle(&self, payload: &[u8]) -> ForwardResponse {
        let wire = match codec::decode(payload) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(error = %e, "rejecting undecodable forwarded batch");
                return self.reject(ForwardStatus::BadRequest);
            }
        };

        let key = (wire.destination_pipeline_name.clone(), wire.destination_plugin_id.clone());
        let Some(buffer) = self.receive_buffers.get(&key).map(|b| Arc::clone(b.value())) else {
            warn!(
                pipeline = %key.0,
                plugin_id = %key.1,
                "rejecting forwarded batch for unknown registration"
            );
            return self.reject(ForwardStatus::NotFound);
        };

        let records = wire.into_records();
        let count = records.len() as u64;
        match buffer.write_all(records, self.request_timeout) {
            Ok(()) => {
                debug!(pipeline = %key.0, plugin_id = %key.1, records = count, "accepted forwarded batch");
                self.metrics.records_received.increment(count);
                ForwardResponse::ok()
            }
            Err(e) => {
                warn!(pipeline = %key.0, plugin_id = %key.1, error = %e, "rejecting forwarded batch");
                self.reject(match e {
                    BufferError::Timeout(_) => ForwardStatus::RequestTimeout,
                    BufferError::SizeOverflow { .. } => ForwardStatus::PayloadTooLarge,
                })
            }
        }
    }

    fn reject(&self, status: ForwardStatus) -> ForwardResponse {
        self.metrics.requests_rejected.increment(1);
        ForwardResponse::new(status)
    }
}
