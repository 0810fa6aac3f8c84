//! Tests for the hash ring implementation.
//!
//! # Test Strategy
//!
//! 1. **Basic functionality**: Empty ring, add/lookup, remove
//! 2. **Multiple nodes**: Distribution, consistency
//! 3. **Membership churn**: only keys owned by a changed node move
//! 4. **Properties**: determinism over arbitrary keys

use corelib::node::{Node, NodeId};
use corelib::ring::{HashRing, RingBuilder};
use proptest::prelude::*;

fn peer(address: &str) -> Node {
    Node::from_address(address).unwrap()
}

// ============================================================================
// Basic Functionality Tests
// ============================================================================

#[test]
fn test_empty_ring_lookup() {
    // An empty ring has no owner for any key
    let ring = HashRing::new();
    assert_eq!(ring.lookup(b"key1"), None);
    assert_eq!(ring.lookup_node(b"key1"), None);
    assert_eq!(ring.node_count(), 0);
    assert_eq!(ring.token_count(), 0);
}

#[test]
fn test_add_node_and_lookup() {
    let ring = HashRing::new();
    let node = Node::new(NodeId(1), "node1");

    // Add node with 4 vnodes (small number for testing)
    ring.add_node(node.clone(), 4);

    // Verify node was added
    assert_eq!(ring.node_count(), 1);
    assert_eq!(ring.token_count(), 4);
    assert_eq!(ring.vnode_count(&NodeId(1)), 4);

    // A single node owns every key
    assert_eq!(ring.lookup(b"test-key"), Some(NodeId(1)));
    assert_eq!(ring.lookup_node(b"test-key"), Some(node));
    assert!(ring.contains_node(&NodeId(1)));
}

#[test]
fn test_remove_node() {
    let ring = HashRing::new();

    ring.add_node(Node::new(NodeId(1), "node1"), 4);
    ring.add_node(Node::new(NodeId(2), "node2"), 4);

    // Verify both nodes exist
    assert_eq!(ring.token_count(), 8);

    // Remove node1
    assert!(ring.remove_node(&NodeId(1)), "Should successfully remove node");

    // Its vnodes are gone and node2 owns everything
    assert_eq!(ring.node_count(), 1);
    assert_eq!(ring.token_count(), 4);
    assert_eq!(ring.lookup(b"some-key"), Some(NodeId(2)));
    assert!(ring.get_node(&NodeId(1)).is_none());

    // Removing non-existent node should return false
    assert!(!ring.remove_node(&NodeId(999)), "Should return false for non-existent node");
}

#[test]
fn test_repeated_add_appends_vnodes() {
    let ring = HashRing::new();

    let node = Node::new(NodeId(1), "node1");
    ring.add_node(node.clone(), 4);
    ring.add_node(node, 4);

    // Second add appends, the node is still counted once
    assert_eq!(ring.token_count(), 8);
    assert_eq!(ring.node_count(), 1);
}

// ============================================================================
// Multiple Nodes Tests
// ============================================================================

#[test]
fn test_consistent_lookup() {
    let ring = RingBuilder::new()
        .with_vnodes(16)
        .add_node(peer("10.0.0.1"))
        .add_node(peer("10.0.0.2"))
        .build();

    // Lookup the same keys repeatedly, including the empty key
    for key in [&b"consistent-key"[..], &b""[..], &b"another"[..]] {
        assert_eq!(ring.lookup(key), ring.lookup(key), "Same key should map to same node");
    }
}

#[test]
fn test_rings_built_in_any_order_agree() {
    let forward = RingBuilder::new()
        .with_vnodes(32)
        .add_node(peer("10.0.0.1"))
        .add_node(peer("10.0.0.2"))
        .add_node(peer("10.0.0.3"))
        .build();
    let backward = RingBuilder::new()
        .with_vnodes(32)
        .add_node(peer("10.0.0.3"))
        .add_node(peer("10.0.0.2"))
        .add_node(peer("10.0.0.1"))
        .build();

    // Collisions resolve the same way regardless of insertion order
    assert_eq!(forward.tokens(), backward.tokens());
    for i in 0..200 {
        let key = format!("key-{}", i);
        assert_eq!(forward.lookup(key.as_bytes()), backward.lookup(key.as_bytes()));
    }
}

#[test]
fn test_distribution_reaches_every_node() {
    let ring = RingBuilder::new()
        .with_vnodes(128)
        .add_node(peer("10.0.0.1"))
        .add_node(peer("10.0.0.2"))
        .add_node(peer("10.0.0.3"))
        .build();

    // Count how many keys land on each node
    let mut counts = std::collections::HashMap::new();
    for i in 0..3000 {
        let key = format!("trace-{}", i);
        *counts.entry(ring.lookup(key.as_bytes()).unwrap()).or_insert(0usize) += 1;
    }

    // Every node gets a fair share (expected ~1000 each)
    assert_eq!(counts.len(), 3);
    for count in counts.values() {
        assert!(*count > 500, "uneven distribution: {:?}", counts);
    }
}

// ============================================================================
// Ring Builder Tests
// ============================================================================

#[test]
fn test_ring_builder_default() {
    let ring = RingBuilder::new()
        .add_node(Node::new(NodeId(1), "node1"))
        .add_node(Node::new(NodeId(2), "node2"))
        .build();

    assert!(ring.lookup(b"key").is_some());
    assert_eq!(ring.node_count(), 2);
    // Default is 256 vnodes per node
    assert_eq!(ring.token_count(), 512);
}

#[test]
fn test_ring_builder_mixed_vnodes() {
    let ring = RingBuilder::new()
        .with_vnodes(4)
        .add_node(Node::new(NodeId(1), "node1"))
        .add_node_with_vnodes(Node::new(NodeId(2), "node2"), 8)
        .build();

    assert_eq!(ring.node_count(), 2);
    assert_eq!(ring.token_count(), 12);
}

// ============================================================================
// Membership Churn
// ============================================================================

#[test]
fn test_adding_node_only_moves_keys_to_new_node() {
    let ring = RingBuilder::new()
        .with_vnodes(64)
        .add_node(peer("10.0.0.1"))
        .add_node(peer("10.0.0.2"))
        .build();

    // Record ownership before the membership change
    let keys: Vec<String> = (0..1000).map(|i| format!("key-{}", i)).collect();
    let before: Vec<NodeId> = keys.iter().map(|k| ring.lookup(k.as_bytes()).unwrap()).collect();

    let newcomer = peer("10.0.0.3");
    let newcomer_id = newcomer.id;
    ring.add_node(newcomer, 64);

    // Only keys taken over by the newcomer may change owner
    let mut moved = 0;
    for (key, old_owner) in keys.iter().zip(before) {
        let new_owner = ring.lookup(key.as_bytes()).unwrap();
        if new_owner != old_owner {
            assert_eq!(new_owner, newcomer_id, "keys may only move to the new node");
            moved += 1;
        }
    }
    assert!(moved > 0 && moved < keys.len());
}

#[test]
fn test_add_remove_add() {
    let ring = HashRing::new();

    ring.add_node(Node::new(NodeId(1), "node1"), 4);
    let tokens = ring.tokens();

    // Remove, then add the same node back
    assert!(ring.remove_node(&NodeId(1)));
    assert_eq!(ring.node_count(), 0);

    ring.add_node(Node::new(NodeId(1), "node1"), 4);
    assert_eq!(ring.tokens(), tokens, "re-added node lands on the same positions");
}

// ============================================================================
// Utility Tests
// ============================================================================

#[test]
fn test_get_all_nodes_sorted_by_name() {
    let ring = HashRing::new();

    ring.add_node(Node::new(NodeId(2), "node-b"), 4);
    ring.add_node(Node::new(NodeId(1), "node-a"), 4);

    // Sorted by name, not by insertion or id
    let names: Vec<String> = ring.nodes().into_iter().map(|n| n.name).collect();
    assert_eq!(names, vec!["node-a".to_string(), "node-b".to_string()]);
}

#[test]
fn test_partitioner_name() {
    let ring = HashRing::new();
    assert_eq!(ring.partitioner_name(), "SipHashPartitioner");
}

proptest! {
    #[test]
    fn property_lookup_is_deterministic(key in proptest::collection::vec(any::<u8>(), 0..64)) {
        let ring = RingBuilder::new()
            .with_vnodes(16)
            .add_node(peer("10.0.0.1"))
            .add_node(peer("10.0.0.2"))
            .add_node(peer("10.0.0.3"))
            .build();

        // Any key has an owner, and always the same one
        let first = ring.lookup(&key);
        prop_assert!(first.is_some());
        prop_assert_eq!(first, ring.lookup(&key));
    }
}
