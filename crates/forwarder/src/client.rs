//! Transport client contract.
//!
//! The forwarder hands each encoded batch to a [`PeerForwarderClient`]. The
//! production transport (HTTP with optional TLS) lives outside this crate;
//! [`InProcessClient`] delivers batches straight to handlers in the same
//! process.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

use crate::error::ClientError;
use crate::receiver::ForwardedRequestHandler;

/// Path peers serve forwarded batches on.
pub const DEFAULT_FORWARDING_URI: &str = "/event/forward";

/// One encoded batch on its way to a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardRequest {
    pub destination: String,
    pub pipeline_name: String,
    pub plugin_id: String,
    pub payload: Bytes,
}

/// Outcome reported by the receiving peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardStatus {
    Ok,
    BadRequest,
    NotFound,
    RequestTimeout,
    PayloadTooLarge,
    TooManyRequests,
    InternalError,
    ServiceUnavailable,
    Other(u16),
}

impl ForwardStatus {
    pub fn from_code(code: u16) -> Self {
        match code {
            200 => ForwardStatus::Ok,
            400 => ForwardStatus::BadRequest,
            404 => ForwardStatus::NotFound,
            408 => ForwardStatus::RequestTimeout,
            413 => ForwardStatus::PayloadTooLarge,
            429 => ForwardStatus::TooManyRequests,
            500 => ForwardStatus::InternalError,
            503 => ForwardStatus::ServiceUnavailable,
            other => ForwardStatus::Other(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            ForwardStatus::Ok => 200,
            ForwardStatus::BadRequest => 400,
            ForwardStatus::NotFound => 404,
            ForwardStatus::RequestTimeout => 408,
            ForwardStatus::PayloadTooLarge => 413,
            ForwardStatus::TooManyRequests => 429,
            ForwardStatus::InternalError => 500,
            ForwardStatus::ServiceUnavailable => 503,
            ForwardStatus::Other(code) => *code,
        }
    }

    /// Any 2xx code.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardResponse {
    pub status: ForwardStatus,
}

impl ForwardResponse {
    pub fn new(status: ForwardStatus) -> Self {
        Self { status }
    }

    pub fn ok() -> Self {
        Self::new(ForwardStatus::Ok)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Sends one batch to one peer and waits for its answer.
///
/// Called from dispatch pool threads, never from pipeline threads, so
/// implementations may block for the duration of the request.
pub trait PeerForwarderClient: Send + Sync + 'static {
    fn forward(&self, request: &ForwardRequest) -> Result<ForwardResponse, ClientError>;
}

/// Client that hands requests to the handler registered for the destination
/// address, as if each handler were a separate node.
#[derive(Default)]
pub struct InProcessClient {
    handlers: DashMap<String, Arc<ForwardedRequestHandler>>,
}

impl InProcessClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: impl Into<String>, handler: Arc<ForwardedRequestHandler>) {
        self.handlers.insert(address.into(), handler);
    }

    /// Makes a peer unreachable.
    pub fn deregister(&self, address: &str) {
        self.handlers.remove(address);
    }
}

impl PeerForwarderClient for InProcessClient {
    fn forward(&self, request: &ForwardRequest) -> Result<ForwardResponse, ClientError> {
        let handler = self
            .handlers
            .get(&request.destination)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| ClientError::UnknownPeer(request.destination.clone()))?;
        Ok(handler.handle(&request.payload))
    }
}
