//! Forwarding strategies.
//!
//! A registered stage gets one of two strategies:
//!
//! - **LocalPeerForwarder**: single-node deployments; every record stays here
//! - **RemotePeerForwarder**: records are routed to the peer owning their key

pub mod local;
pub mod remote;

pub use local::LocalPeerForwarder;
pub use remote::RemotePeerForwarder;

use crate::event::Record;

/// Moves records to the node responsible for them.
///
/// # Thread Safety
///
/// One forwarder is shared by every instance of a stage, so implementations
/// must tolerate concurrent calls from several pipeline threads.
pub trait PeerForwarder: Send + Sync + 'static {
    /// Routes `records` and returns the ones this node must process itself.
    ///
    /// Never fails: anything that cannot be forwarded is returned for local
    /// processing or, once dispatched, written to the receive buffer.
    fn forward_records(&self, records: Vec<Record>) -> Vec<Record>;

    /// Takes the next batch of records peers sent to this node.
    fn receive_records(&self) -> Vec<Record>;

    /// True once no received records are waiting to be processed.
    fn is_ready_for_shutdown(&self) -> bool;
}
