//! Node abstractions for the consistent hash ring.
//!
//! Nodes represent the peers participating in the ring. They are identified by a
//! compact `NodeId` that is cheap to compare and hash, derived from the peer's
//! address so every member of a fleet computes the same id for the same peer.

use crate::error::{Error, Result};
use std::fmt;
use xxhash_rust::xxh3::xxh3_128;

/// Compact identifier for a node in the cluster.
///
/// Newtype over `u128` so comparisons and hashing are very fast while giving
/// plenty of space for uniqueness.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(pub u128);

impl NodeId {
    /// Derives a stable id from a node name (XXH3-128).
    pub fn from_name(name: &str) -> Self {
        NodeId(xxh3_128(name.as_bytes()))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Logical node participating in the ring.
///
/// Keep this struct small and cheap to clone; heavy mutable state (connections,
/// metrics, etc.) should live elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    /// Peer address (IP or hostname) that forwarded records are sent to.
    pub name: String,
}

impl Node {
    /// Construct a new node with basic metadata.
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Construct a node whose id is derived from its address.
    pub fn from_address(address: &str) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::InvalidNode("peer address must not be empty".to_string()));
        }
        Ok(Self::new(NodeId::from_name(address), address))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
