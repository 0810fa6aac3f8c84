//! Maps identification-key values to the peer that owns them.

use corelib::{HashRing, Node, NodeId};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tracing::{info, warn};

use crate::discovery::PeerListProvider;

/// Virtual nodes per peer.
pub const VIRTUAL_NODES_PER_PEER: usize = 128;

/// Consistent hash ring over peer addresses.
///
/// The ring follows its peer list provider: on every change only the peers
/// that joined or left are added or removed, so keys owned by unaffected
/// peers keep their owner.
#[derive(Debug)]
pub struct PeerHashRing {
    ring: HashRing,
    virtual_nodes: usize,
}

impl PeerHashRing {
    /// Builds the ring from the provider's current peers and subscribes to changes.
    pub fn new(peer_list_provider: &dyn PeerListProvider) -> Arc<Self> {
        Self::with_virtual_nodes(peer_list_provider, VIRTUAL_NODES_PER_PEER)
    }

    pub fn with_virtual_nodes(peer_list_provider: &dyn PeerListProvider, virtual_nodes: usize) -> Arc<Self> {
        let ring = Arc::new(Self {
            ring: HashRing::new(),
            virtual_nodes,
        });
        ring.update_peers(&peer_list_provider.peer_list());

        let weak: Weak<Self> = Arc::downgrade(&ring);
        peer_list_provider.add_listener(Box::new(move |peers| match weak.upgrade() {
            Some(ring) => {
                ring.update_peers(peers);
                true
            }
            None => false,
        }));
        ring
    }

    /// Returns the address owning `composite_key`, or `None` when the ring has no peers.
    ///
    /// Keys whose values are all missing collapse to the empty key and so
    /// always land on the same peer.
    pub fn get_server_ip(&self, composite_key: &[Option<String>]) -> Option<String> {
        let node = self.ring.lookup_node(&encode_composite_key(composite_key))?;
        Some(node.name)
    }

    /// Applies a new peer list, touching only peers that changed.
    pub fn update_peers(&self, peers: &[String]) {
        let mut wanted: HashSet<NodeId> = HashSet::with_capacity(peers.len());
        for address in peers {
            let node = match Node::from_address(address) {
                Ok(node) => node,
                Err(e) => {
                    warn!(address = %address, error = %e, "ignoring invalid peer address");
                    continue;
                }
            };
            wanted.insert(node.id);
            if !self.ring.contains_node(&node.id) {
                info!(peer = %node.name, "adding peer to hash ring");
                self.ring.add_node(node, self.virtual_nodes);
            }
        }

        for node in self.ring.nodes() {
            if !wanted.contains(&node.id) {
                info!(peer = %node.name, "removing peer from hash ring");
                self.ring.remove_node(&node.id);
            }
        }
    }

    /// Current peer addresses, sorted.
    pub fn peers(&self) -> Vec<String> {
        self.ring.nodes().into_iter().map(|n| n.name).collect()
    }

    /// Share of the key space each peer owns.
    pub fn ownership(&self) -> Vec<(String, f64)> {
        self.ring
            .ownership()
            .into_iter()
            .filter_map(|(id, share)| self.ring.get_node(&id).map(|n| (n.name, share)))
            .collect()
    }

    pub fn virtual_nodes(&self) -> usize {
        self.virtual_nodes
    }
}

/// Unambiguous byte form of a composite key.
///
/// Each present value is a `1` marker, a little-endian `u32` length and the
/// bytes; each missing value is a `0` marker. A key with no present values
/// encodes to the empty string.
pub fn encode_composite_key(values: &[Option<String>]) -> Vec<u8> {
    if values.iter().all(Option::is_none) {
        return Vec::new();
    }

    let mut encoded = Vec::with_capacity(values.iter().map(|v| v.as_ref().map_or(1, |s| 5 + s.len())).sum());
    for value in values {
        match value {
            Some(s) => {
                encoded.push(1);
                encoded.extend_from_slice(&(s.len() as u32).to_le_bytes());
                encoded.extend_from_slice(s.as_bytes());
            }
            None => encoded.push(0),
        }
    }
    encoded
}
