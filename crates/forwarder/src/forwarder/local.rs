use super::PeerForwarder;
use crate::event::Record;

/// Forwarder for nodes without peers.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPeerForwarder;

impl LocalPeerForwarder {
    pub fn new() -> Self {
        Self
    }
}

impl PeerForwarder for LocalPeerForwarder {
    fn forward_records(&self, records: Vec<Record>) -> Vec<Record> {
        records
    }

    fn receive_records(&self) -> Vec<Record> {
        Vec::new()
    }

    fn is_ready_for_shutdown(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record_with;

    #[test]
    fn keeps_everything_local() {
        let forwarder = LocalPeerForwarder::new();
        let records = vec![record_with("id", "a"), record_with("id", "b")];

        assert_eq!(forwarder.forward_records(records.clone()), records);
        assert!(forwarder.receive_records().is_empty());
        assert!(forwarder.is_ready_for_shutdown());
    }
}
