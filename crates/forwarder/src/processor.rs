//! Processing stage contracts.

use std::collections::BTreeSet;

use crate::event::Record;

/// A pipeline stage that transforms batches of records.
pub trait Processor: Send {
    fn execute(&mut self, records: Vec<Record>) -> Vec<Record>;

    fn prepare_for_shutdown(&mut self) {}

    fn is_ready_for_shutdown(&self) -> bool {
        true
    }

    fn shutdown(&mut self) {}
}

/// A stage that needs every record with the same identification key values
/// on the same node.
pub trait RequiresPeerForwarding {
    /// Field paths whose values route a record. Must be non-empty and the
    /// same for every instance of the stage.
    fn identification_keys(&self) -> BTreeSet<String>;
}
