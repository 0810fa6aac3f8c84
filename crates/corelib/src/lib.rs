//! Core library for consistent hashing implementation.
//!
//! This crate provides the fundamental abstractions for consistent hashing:
//! - Ring tokens and the partitioner that produces them
//! - Node and virtual node abstractions
//! - The hash ring itself, with clockwise lookup and ownership reporting

pub mod error;
pub mod node;
pub mod partitioner;
pub mod ring;
pub mod token;
pub mod vnode;

pub use error::{Error, Result};
pub use node::{Node, NodeId};
pub use partitioner::{Partitioner, SipHashPartitioner};
pub use ring::{HashRing, RingBuilder};
pub use token::Token;
pub use vnode::VirtualNode;
