//! Error types for peer forwarding.
//!
//! Only configuration and registration problems surface as errors to callers.
//! Everything that goes wrong while records are in motion degrades to local
//! processing and is reported through logs and metrics instead.

use std::time::Duration;
use thiserror::Error;

use crate::config::{ConfigError, DiscoveryMode};

/// Result type alias for registration and construction.
pub type Result<T> = std::result::Result<T, PeerForwarderError>;

/// Fatal errors raised while building a pipeline.
#[derive(Debug, Error)]
pub enum PeerForwarderError {
    #[error("invalid peer forwarder configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("a peer forwarder is already registered for pipeline '{pipeline_name}' and plugin '{plugin_id}'")]
    DuplicateRegistration { pipeline_name: String, plugin_id: String },

    #[error("plugin '{plugin_id}' cannot have empty identification keys")]
    EmptyIdentificationKeys { plugin_id: String },

    #[error("all instances of plugin '{plugin_id}' in pipeline '{pipeline_name}' must have the same identification keys")]
    MismatchedIdentificationKeys { pipeline_name: String, plugin_id: String },

    #[error("discovery mode '{0}' needs an externally supplied peer list provider")]
    ExternalDiscoveryRequired(DiscoveryMode),

    #[error("peer forwarding is required but no transport client was configured")]
    MissingClient,

    #[error("invalid peer address: {0}")]
    InvalidPeer(#[from] corelib::Error),

    #[error("failed to start dispatch pool: {0}")]
    DispatchPool(#[source] std::io::Error),
}

/// Errors raised by the receive buffer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("batch of {requested} records exceeds buffer capacity of {capacity}")]
    SizeOverflow { requested: usize, capacity: usize },

    #[error("timed out after {0:?} waiting for buffer space")]
    Timeout(Duration),
}

/// Errors raised while encoding or decoding forwarded batches.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode forwarded records: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode forwarded records: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Errors raised by a transport client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("connection to peer {destination} failed: {reason}")]
    Connection { destination: String, reason: String },

    #[error("request to peer {0} timed out")]
    Timeout(String),

    #[error("no route to peer {0}")]
    UnknownPeer(String),
}
