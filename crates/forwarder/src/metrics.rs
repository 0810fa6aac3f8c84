//! Forwarding metrics.
//!
//! Handles are registered once per forwarder (or request handler) and cloned
//! into dispatch jobs, so the hot path only increments atomics.

use metrics::{counter, histogram, Counter, Histogram};

const RECORDS_TO_BE_PROCESSED_LOCALLY: &str = "peer_forwarder.records_to_be_processed_locally";
const RECORDS_TO_BE_FORWARDED: &str = "peer_forwarder.records_to_be_forwarded";
const RECORDS_SUCCESSFULLY_FORWARDED: &str = "peer_forwarder.records_successfully_forwarded";
const RECORDS_FAILED_FORWARDING: &str = "peer_forwarder.records_failed_forwarding";
const RECORDS_RECEIVED_FROM_PEERS: &str = "peer_forwarder.records_received_from_peers";
const RECORDS_DROPPED: &str = "peer_forwarder.records_dropped";
const REQUESTS_SUCCESSFUL: &str = "peer_forwarder.requests_successful";
const REQUESTS_FAILED: &str = "peer_forwarder.requests_failed";
const REQUEST_LATENCY_SECONDS: &str = "peer_forwarder.request_latency_seconds";

const SERVER_RECORDS_RECEIVED: &str = "peer_forwarder.server.records_received";
const SERVER_REQUESTS_REJECTED: &str = "peer_forwarder.server.requests_rejected";

#[derive(Clone)]
pub struct ForwarderMetrics {
    pub records_to_be_processed_locally: Counter,
    pub records_to_be_forwarded: Counter,
    pub records_successfully_forwarded: Counter,
    pub records_failed_forwarding: Counter,
    pub records_received_from_peers: Counter,
    pub records_dropped: Counter,
    pub requests_successful: Counter,
    pub requests_failed: Counter,
    pub request_latency: Histogram,
}

impl ForwarderMetrics {
    pub fn new(pipeline_name: &str, plugin_id: &str) -> Self {
        let labels = [
            ("pipeline", pipeline_name.to_string()),
            ("plugin_id", plugin_id.to_string()),
        ];
        Self {
            records_to_be_processed_locally: counter!(RECORDS_TO_BE_PROCESSED_LOCALLY, &labels),
            records_to_be_forwarded: counter!(RECORDS_TO_BE_FORWARDED, &labels),
            records_successfully_forwarded: counter!(RECORDS_SUCCESSFULLY_FORWARDED, &labels),
            records_failed_forwarding: counter!(RECORDS_FAILED_FORWARDING, &labels),
            records_received_from_peers: counter!(RECORDS_RECEIVED_FROM_PEERS, &labels),
            records_dropped: counter!(RECORDS_DROPPED, &labels),
            requests_successful: counter!(REQUESTS_SUCCESSFUL, &labels),
            requests_failed: counter!(REQUESTS_FAILED, &labels),
            request_latency: histogram!(REQUEST_LATENCY_SECONDS, &labels),
        }
    }
}

#[derive(Clone)]
pub struct ServerMetrics {
    pub records_received: Counter,
    pub requests_rejected: Counter,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            records_received: counter!(SERVER_RECORDS_RECEIVED),
            requests_rejected: counter!(SERVER_REQUESTS_REJECTED),
        }
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
