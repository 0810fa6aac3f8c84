//! Peer forwarding for horizontally scaled pipelines.
//!
//! Stages that must see every record sharing a key on the same node register
//! with a [`PeerForwarderProvider`]. Records are partitioned over the peer
//! fleet with a consistent hash ring, batched per destination, dispatched on
//! a worker pool, and fall back to a local receive buffer when a peer cannot
//! take them.
//!
//! - [`hash_ring`]: composite key to peer address
//! - [`buffer`]: bounded, checkpointed receive buffer
//! - [`forwarder`]: the local and remote forwarding strategies
//! - [`provider`]: registrations and strategy selection
//! - [`decorator`]: wraps processing stages with forwarding
//! - [`receiver`]: intake for batches other peers send to this node

pub mod address;
pub mod batching;
pub mod buffer;
pub mod client;
pub mod codec;
pub mod config;
pub mod decorator;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod forwarder;
pub mod hash_ring;
pub mod metrics;
pub mod processor;
pub mod provider;
pub mod receiver;

#[cfg(test)]
pub(crate) mod test_support;

pub use buffer::{CheckpointToken, PeerForwarderReceiveBuffer};
pub use client::{ForwardRequest, ForwardResponse, ForwardStatus, PeerForwarderClient};
pub use config::{DiscoveryMode, PeerForwarderConfig};
pub use decorator::{decorate_processors, PeerForwardingProcessorDecorator};
pub use error::{PeerForwarderError, Result};
pub use event::{Event, Record};
pub use forwarder::{LocalPeerForwarder, PeerForwarder, RemotePeerForwarder};
pub use hash_ring::PeerHashRing;
pub use processor::{Processor, RequiresPeerForwarding};
pub use provider::PeerForwarderProvider;
pub use receiver::ForwardedRequestHandler;
