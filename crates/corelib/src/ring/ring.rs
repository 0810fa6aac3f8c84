//! Hash ring data structure.
//!
//! Holds a `BTreeMap<Token, NodeId>` of every virtual node plus the node
//! metadata. Lookups hash the key with the ring's partitioner and walk
//! clockwise to the first token at or after that position, wrapping around
//! to the smallest token.

use crate::node::{Node, NodeId};
use crate::partitioner::{Partitioner, SipHashPartitioner};
use crate::token::Token;
use crate::vnode::VirtualNode;
use parking_lot::RwLock;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Virtual nodes per physical node when none is specified.
pub const DEFAULT_VNODES: usize = 256;

#[derive(Default)]
struct RingState {
    tokens: BTreeMap<Token, NodeId>,
    nodes: HashMap<NodeId, Node>,
    /// Every token each node claimed, including ones lost to a collision.
    vnodes: HashMap<NodeId, Vec<Token>>,
}

impl RingState {
    // Collisions resolve to the smaller node id, independent of insertion order.
    fn claim(&mut self, token: Token, node_id: NodeId) {
        match self.tokens.entry(token) {
            Entry::Vacant(entry) => {
                entry.insert(node_id);
            }
            Entry::Occupied(mut entry) => {
                if node_id < *entry.get() {
                    entry.insert(node_id);
                }
            }
        }
    }
}

/// Consistent hash ring.
///
/// All operations take `&self`; the state sits behind a read/write lock so a
/// ring can be shared between lookup threads and a membership updater.
pub struct HashRing {
    partitioner: Box<dyn Partitioner>,
    state: RwLock<RingState>,
}

impl HashRing {
    /// Creates an empty ring using the default partitioner.
    pub fn new() -> Self {
        Self::with_partitioner(SipHashPartitioner)
    }

    pub fn with_partitioner(partitioner: impl Partitioner) -> Self {
        Self {
            partitioner: Box::new(partitioner),
            state: RwLock::new(RingState::default()),
        }
    }

    /// Adds `vnodes` virtual nodes for `node`.
    ///
    /// Adding a node that is already present appends further vnodes rather
    /// than replacing the existing ones.
    pub fn add_node(&self, node: Node, vnodes: usize) {
        let mut state = self.state.write();
        let start = state.vnodes.get(&node.id).map_or(0, Vec::len);

        let mut claimed = Vec::with_capacity(vnodes);
        for index in start..start + vnodes {
            let vnode = VirtualNode::from_index(node.id, index, self.partitioner.as_ref());
            state.claim(vnode.token, vnode.node_id);
            claimed.push(vnode.token);
        }

        state.vnodes.entry(node.id).or_default().extend(claimed);
        state.nodes.insert(node.id, node);
    }

    /// Removes a node and all of its virtual nodes.
    ///
    /// Returns `false` if the node was not part of the ring.
    pub fn remove_node(&self, node_id: &NodeId) -> bool {
        let mut state = self.state.write();
        if state.nodes.remove(node_id).is_none() {
            return false;
        }

        let released: HashSet<Token> = state.vnodes.remove(node_id).unwrap_or_default().into_iter().collect();
        for token in &released {
            if state.tokens.get(token) == Some(node_id) {
                state.tokens.remove(token);
            }
        }

        // Hand collided tokens back to the remaining claimants.
        let mut reclaims: Vec<(Token, NodeId)> = Vec::new();
        for (id, tokens) in &state.vnodes {
            for token in tokens.iter().filter(|t| released.contains(*t)) {
                reclaims.push((*token, *id));
            }
        }
        for (token, id) in reclaims {
            state.claim(token, id);
        }

        true
    }

    pub fn contains_node(&self, node_id: &NodeId) -> bool {
        self.state.read().nodes.contains_key(node_id)
    }

    /// Finds the node owning `key`: the first token clockwise from the key's token.
    pub fn lookup(&self, key: &[u8]) -> Option<NodeId> {
        let token = self.partitioner.partition(key);
        let state = self.state.read();
        state
            .tokens
            .range(token..)
            .next()
            .or_else(|| state.tokens.iter().next())
            .map(|(_, node_id)| *node_id)
    }

    /// Like [`lookup`](Self::lookup) but returns the node metadata.
    pub fn lookup_node(&self, key: &[u8]) -> Option<Node> {
        let node_id = self.lookup(key)?;
        self.get_node(&node_id)
    }

    pub fn get_node(&self, node_id: &NodeId) -> Option<Node> {
        self.state.read().nodes.get(node_id).cloned()
    }

    /// All nodes, sorted by name.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.state.read().nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    /// All `(token, owner)` pairs in ring order.
    pub fn tokens(&self) -> Vec<(Token, NodeId)> {
        self.state.read().tokens.iter().map(|(t, n)| (*t, *n)).collect()
    }

    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    pub fn token_count(&self) -> usize {
        self.state.read().tokens.len()
    }

    /// Number of virtual nodes claimed by `node_id`.
    pub fn vnode_count(&self, node_id: &NodeId) -> usize {
        self.state.read().vnodes.get(node_id).map_or(0, Vec::len)
    }

    pub fn partitioner_name(&self) -> &'static str {
        self.partitioner.name()
    }

    /// Fraction of the token space owned by each node, in ring order of first appearance.
    ///
    /// A token owns the arc from the previous token (exclusive) up to itself.
    pub fn ownership(&self) -> Vec<(NodeId, f64)> {
        let state = self.state.read();
        let tokens: Vec<(Token, NodeId)> = state.tokens.iter().map(|(t, n)| (*t, *n)).collect();

        let mut shares: Vec<(NodeId, f64)> = Vec::new();
        if tokens.len() == 1 {
            shares.push((tokens[0].1, 1.0));
            return shares;
        }

        let ring_size = u64::MAX as f64 + 1.0;
        for (idx, (token, node_id)) in tokens.iter().enumerate() {
            let previous = if idx == 0 { tokens[tokens.len() - 1].0 } else { tokens[idx - 1].0 };
            let share = previous.distance_to(token).0 as f64 / ring_size;
            match shares.iter_mut().find(|(id, _)| id == node_id) {
                Some((_, total)) => *total += share,
                None => shares.push((*node_id, share)),
            }
        }
        shares
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HashRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("HashRing")
            .field("partitioner", &self.partitioner.name())
            .field("nodes", &state.nodes.len())
            .field("tokens", &state.tokens.len())
            .finish()
    }
}

/// Builder for a [`HashRing`] with a known initial membership.
pub struct RingBuilder {
    vnodes: usize,
    partitioner: Option<Box<dyn Partitioner>>,
    nodes: Vec<(Node, Option<usize>)>,
}

impl RingBuilder {
    pub fn new() -> Self {
        Self {
            vnodes: DEFAULT_VNODES,
            partitioner: None,
            nodes: Vec::new(),
        }
    }

    /// Default vnode count for nodes added without an explicit count.
    pub fn with_vnodes(mut self, vnodes: usize) -> Self {
        self.vnodes = vnodes;
        self
    }

    pub fn with_partitioner(mut self, partitioner: impl Partitioner) -> Self {
        self.partitioner = Some(Box::new(partitioner));
        self
    }

    pub fn add_node(mut self, node: Node) -> Self {
        self.nodes.push((node, None));
        self
    }

    pub fn add_node_with_vnodes(mut self, node: Node, vnodes: usize) -> Self {
        self.nodes.push((node, Some(vnodes)));
        self
    }

    pub fn build(self) -> HashRing {
        let ring = HashRing {
            partitioner: self.partitioner.unwrap_or_else(|| Box::new(SipHashPartitioner)),
            state: RwLock::new(RingState::default()),
        };
        for (node, vnodes) in self.nodes {
            ring.add_node(node, vnodes.unwrap_or(self.vnodes));
        }
        ring
    }
}

impl Default for RingBuilder {
    fn default() -> Self {
        Self::new()
    }
}
