//! Virtual node abstractions.
//!
//! # Virtual Nodes (VNodes) Concept
//!
//! Instead of each peer having a single token on the ring, each peer owns
//! many tokens (virtual nodes). This gives:
//!
//! 1. **Better Load Distribution**: more tokens smooth out the key space each peer owns
//! 2. **Bounded Churn**: when a peer joins or leaves only the arcs adjacent to its tokens move
//!
//! # Performance Characteristics
//!
//! - **Memory**: O(v) where v = number of vnodes per node
//! - **Lookup**: O(log n) where n = total vnodes
//! - **Rebalancing**: O(k/v) keys move when a node joins/leaves

use crate::node::NodeId;
use crate::partitioner::Partitioner;
use crate::token::Token;

/// A virtual node on the hash ring.
///
/// Represents a single token position owned by a physical node.
///
/// # Invariants
///
/// - Every `VirtualNode` belongs to exactly one physical node
/// - Ordering is by token first, so a sorted list of vnodes is a walk around the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualNode {
    /// Token position on the ring.
    pub token: Token,

    /// The physical node that owns this virtual node.
    pub node_id: NodeId,
}

impl VirtualNode {
    #[inline]
    pub fn new(token: Token, node_id: NodeId) -> Self {
        Self { token, node_id }
    }

    /// Create a virtual node from a node ID and vnode index.
    ///
    /// The token is the partitioner's hash of `"node_id:vnode_index"`, so every
    /// process that knows the same peer computes the same vnode positions.
    pub fn from_index(node_id: NodeId, vnode_index: usize, partitioner: &dyn Partitioner) -> Self {
        let vnode_key = format!("{}:{}", node_id, vnode_index);
        Self::new(partitioner.partition(vnode_key.as_bytes()), node_id)
    }

    #[inline]
    pub fn token(&self) -> Token {
        self.token
    }

    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Clockwise distance to another virtual node.
    #[inline]
    pub fn distance_to(&self, other: &Self) -> Token {
        self.token.distance_to(&other.token)
    }
}

impl std::fmt::Display for VirtualNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VNode(token={}, node={})", self.token, self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioner::SipHashPartitioner;

    #[test]
    fn test_vnode_creation() {
        let vnode = VirtualNode::new(Token(100), NodeId(1));
        assert_eq!(vnode.token(), Token(100));
        assert_eq!(vnode.node_id(), NodeId(1));
    }

    #[test]
    fn test_vnode_from_index() {
        let vnode0 = VirtualNode::from_index(NodeId(1), 0, &SipHashPartitioner);
        let vnode1 = VirtualNode::from_index(NodeId(1), 1, &SipHashPartitioner);

        assert_ne!(vnode0.token(), vnode1.token());
        assert_eq!(vnode0.node_id(), vnode1.node_id());

        // Same inputs always land on the same position.
        assert_eq!(vnode0, VirtualNode::from_index(NodeId(1), 0, &SipHashPartitioner));
    }

    #[test]
    fn test_vnode_distance() {
        let vnode1 = VirtualNode::new(Token(100), NodeId(1));
        let vnode2 = VirtualNode::new(Token(200), NodeId(2));

        assert_eq!(vnode1.distance_to(&vnode2), Token(100));
        assert_eq!(vnode2.distance_to(&vnode1), Token(u64::MAX - 99));
    }

    #[test]
    fn test_vnode_ordering() {
        let vnode1 = VirtualNode::new(Token(100), NodeId(2));
        let vnode2 = VirtualNode::new(Token(200), NodeId(1));

        assert!(vnode1 < vnode2);
    }
}
