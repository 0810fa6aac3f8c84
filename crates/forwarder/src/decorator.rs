//! Wraps processing stages with peer forwarding.

use std::sync::Arc;
use tracing::info;

use crate::error::{PeerForwarderError, Result};
use crate::event::Record;
use crate::forwarder::PeerForwarder;
use crate::processor::{Processor, RequiresPeerForwarding};
use crate::provider::PeerForwarderProvider;

/// Registers the stage once and wraps every instance with the shared forwarder.
///
/// All instances must report the same, non-empty identification keys.
pub fn decorate_processors<P>(
    processors: Vec<P>,
    provider: &PeerForwarderProvider,
    pipeline_name: &str,
    plugin_id: &str,
) -> Result<Vec<PeerForwardingProcessorDecorator<P>>>
where
    P: Processor + RequiresPeerForwarding,
{
    let Some(first) = processors.first() else {
        return Ok(Vec::new());
    };

    let identification_keys = first.identification_keys();
    if processors.iter().any(|p| p.identification_keys() != identification_keys) {
        return Err(PeerForwarderError::MismatchedIdentificationKeys {
            pipeline_name: pipeline_name.to_string(),
            plugin_id: plugin_id.to_string(),
        });
    }
    if identification_keys.is_empty() {
        return Err(PeerForwarderError::EmptyIdentificationKeys {
            plugin_id: plugin_id.to_string(),
        });
    }

    let forwarder = provider.register(pipeline_name, plugin_id, identification_keys)?;
    info!(
        pipeline = %pipeline_name,
        plugin_id = %plugin_id,
        instances = processors.len(),
        "decorated processors with peer forwarding"
    );

    Ok(processors
        .into_iter()
        .map(|inner| PeerForwardingProcessorDecorator::new(inner, Arc::clone(&forwarder)))
        .collect())
}

/// Processor that routes records through a [`PeerForwarder`] before the
/// wrapped stage sees them.
pub struct PeerForwardingProcessorDecorator<P> {
    inner: P,
    forwarder: Arc<dyn PeerForwarder>,
}

impl<P: Processor> PeerForwardingProcessorDecorator<P> {
    pub fn new(inner: P, forwarder: Arc<dyn PeerForwarder>) -> Self {
        Self { inner, forwarder }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn forwarder(&self) -> &Arc<dyn PeerForwarder> {
        &self.forwarder
    }
}

impl<P: Processor> Processor for PeerForwardingProcessorDecorator<P> {
    /// Runs the wrapped stage on the records this node owns: the local share
    /// of `records` followed by whatever peers forwarded here.
    fn execute(&mut self, records: Vec<Record>) -> Vec<Record> {
        let mut local = self.forwarder.forward_records(records);
        local.extend(self.forwarder.receive_records());
        self.inner.execute(local)
    }

    fn prepare_for_shutdown(&mut self) {
        self.inner.prepare_for_shutdown();
    }

    fn is_ready_for_shutdown(&self) -> bool {
        self.forwarder.is_ready_for_shutdown() && self.inner.is_ready_for_shutdown()
    }

    fn shutdown(&mut self) {
        self.inner.shutdown();
    }
}
