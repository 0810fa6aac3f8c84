//! Registrations and forwarder construction.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};
use tracing::info;

use crate::address::{LocalAddressResolver, SystemAddressResolver};
use crate::buffer::PeerForwarderReceiveBuffer;
use crate::client::PeerForwarderClient;
use crate::config::PeerForwarderConfig;
use crate::discovery::{peer_list_provider_from_config, PeerListProvider};
use crate::dispatch::DispatchPool;
use crate::error::{PeerForwarderError, Result};
use crate::forwarder::{LocalPeerForwarder, PeerForwarder, RemotePeerForwarder};
use crate::hash_ring::PeerHashRing;
use crate::receiver::ForwardedRequestHandler;

/// Receive buffers keyed by `(pipeline_name, plugin_id)`.
pub(crate) type ReceiveBuffers = DashMap<(String, String), Arc<PeerForwarderReceiveBuffer>>;

/// Hands out a forwarder per registered stage and owns what they share.
///
/// The hash ring and the dispatch pool are only built once a registration
/// actually needs to forward.
pub struct PeerForwarderProvider {
    config: PeerForwarderConfig,
    client: Option<Arc<dyn PeerForwarderClient>>,
    peer_list_provider: Arc<dyn PeerListProvider>,
    address_resolver: Arc<dyn LocalAddressResolver>,
    receive_buffers: Arc<ReceiveBuffers>,
    hash_ring: OnceLock<Arc<PeerHashRing>>,
    dispatch: Mutex<Option<Arc<DispatchPool>>>,
}

impl PeerForwarderProvider {
    pub fn builder(config: PeerForwarderConfig) -> PeerForwarderProviderBuilder {
        PeerForwarderProviderBuilder {
            config,
            client: None,
            peer_list_provider: None,
            address_resolver: None,
        }
    }

    pub fn config(&self) -> &PeerForwarderConfig {
        &self.config
    }

    pub fn address_resolver(&self) -> &Arc<dyn LocalAddressResolver> {
        &self.address_resolver
    }

    /// Registers a stage and returns the forwarder its instances share.
    ///
    /// Fails if the pair is already registered, or if forwarding is needed
    /// but no transport client was supplied.
    pub fn register(
        &self,
        pipeline_name: &str,
        plugin_id: &str,
        identification_keys: BTreeSet<String>,
    ) -> Result<Arc<dyn PeerForwarder>> {
        if self.config.are_peers_configured() && self.client.is_none() {
            return Err(PeerForwarderError::MissingClient);
        }

        let receive_buffer = match self
            .receive_buffers
            .entry((pipeline_name.to_string(), plugin_id.to_string()))
        {
            Entry::Occupied(_) => {
                return Err(PeerForwarderError::DuplicateRegistration {
                    pipeline_name: pipeline_name.to_string(),
                    plugin_id: plugin_id.to_string(),
                })
            }
            Entry::Vacant(vacant) => {
                let buffer = Arc::new(PeerForwarderReceiveBuffer::new(
                    pipeline_name,
                    plugin_id,
                    self.config.buffer_size,
                    self.config.batch_size(),
                    self.config.checkpoint_timeout(),
                ));
                Arc::clone(vacant.insert(buffer).value())
            }
        };

        if !self.is_peer_forwarding_required() {
            info!(pipeline = %pipeline_name, plugin_id = %plugin_id, "registered local peer forwarder");
            return Ok(Arc::new(LocalPeerForwarder::new()));
        }

        let dispatch = match self.dispatch_pool() {
            Ok(dispatch) => dispatch,
            Err(e) => {
                self.receive_buffers
                    .remove(&(pipeline_name.to_string(), plugin_id.to_string()));
                return Err(e);
            }
        };

        info!(
            pipeline = %pipeline_name,
            plugin_id = %plugin_id,
            identification_keys = ?identification_keys,
            "registered remote peer forwarder"
        );
        Ok(Arc::new(RemotePeerForwarder::new(
            &self.config,
            identification_keys,
            receive_buffer,
            self.hash_ring(),
            Arc::clone(&self.address_resolver),
            dispatch,
        )))
    }

    /// Forwarding happens only with peers to forward to and a stage that
    /// asked for it.
    pub fn is_peer_forwarding_required(&self) -> bool {
        self.config.are_peers_configured() && !self.receive_buffers.is_empty()
    }

    /// Every receive buffer, by pipeline then plugin.
    pub fn pipeline_receive_buffers(&self) -> HashMap<String, HashMap<String, Arc<PeerForwarderReceiveBuffer>>> {
        let mut buffers: HashMap<String, HashMap<String, Arc<PeerForwarderReceiveBuffer>>> = HashMap::new();
        for entry in self.receive_buffers.iter() {
            let (pipeline_name, plugin_id) = entry.key();
            buffers
                .entry(pipeline_name.clone())
                .or_default()
                .insert(plugin_id.clone(), Arc::clone(entry.value()));
        }
        buffers
    }

    pub fn receive_buffer(&self, pipeline_name: &str, plugin_id: &str) -> Option<Arc<PeerForwarderReceiveBuffer>> {
        self.receive_buffers
            .get(&(pipeline_name.to_string(), plugin_id.to_string()))
            .map(|b| Arc::clone(b.value()))
    }

    /// Handler for batches peers send to this node, bound to the registrations.
    pub fn request_handler(&self) -> Arc<ForwardedRequestHandler> {
        Arc::new(ForwardedRequestHandler::new(
            Arc::clone(&self.receive_buffers),
            self.config.request_timeout(),
        ))
    }

    /// The shared ring, built from the peer list provider on first use.
    pub fn hash_ring(&self) -> Arc<PeerHashRing> {
        Arc::clone(
            self.hash_ring
                .get_or_init(|| PeerHashRing::new(self.peer_list_provider.as_ref())),
        )
    }

    /// Stops the dispatch pool once queued batches have been sent.
    pub fn shutdown(&self) {
        if let Some(dispatch) = self.dispatch.lock().take() {
            dispatch.shutdown();
        }
    }

    fn dispatch_pool(&self) -> Result<Arc<DispatchPool>> {
        let client = self.client.as_ref().ok_or(PeerForwarderError::MissingClient)?;
        let mut dispatch = self.dispatch.lock();
        if let Some(pool) = dispatch.as_ref() {
            return Ok(Arc::clone(pool));
        }

        let pool = Arc::new(
            DispatchPool::new(
                self.config.client_thread_count,
                self.config.max_pending_requests,
                Arc::clone(client),
            )
            .map_err(PeerForwarderError::DispatchPool)?,
        );
        info!(
            threads = self.config.client_thread_count,
            max_pending_requests = self.config.max_pending_requests,
            "started peer forwarder dispatch pool"
        );
        *dispatch = Some(Arc::clone(&pool));
        Ok(pool)
    }
}

pub struct PeerForwarderProviderBuilder {
    config: PeerForwarderConfig,
    client: Option<Arc<dyn PeerForwarderClient>>,
    peer_list_provider: Option<Arc<dyn PeerListProvider>>,
    address_resolver: Option<Arc<dyn LocalAddressResolver>>,
}

impl PeerForwarderProviderBuilder {
    pub fn client(mut self, client: Arc<dyn PeerForwarderClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Required for `dns` and `aws_cloud_map` discovery.
    pub fn peer_list_provider(mut self, provider: Arc<dyn PeerListProvider>) -> Self {
        self.peer_list_provider = Some(provider);
        self
    }

    pub fn address_resolver(mut self, resolver: Arc<dyn LocalAddressResolver>) -> Self {
        self.address_resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Result<PeerForwarderProvider> {
        self.config.validate()?;

        let peer_list_provider = match self.peer_list_provider {
            Some(provider) => provider,
            None => peer_list_provider_from_config(&self.config)?,
        };
        let address_resolver = self
            .address_resolver
            .unwrap_or_else(|| Arc::new(SystemAddressResolver::new()));

        Ok(PeerForwarderProvider {
            config: self.config,
            client: self.client,
            peer_list_provider,
            address_resolver,
            receive_buffers: Arc::new(ReceiveBuffers::new()),
            hash_ring: OnceLock::new(),
            dispatch: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::FixedAddressResolver;
    use crate::config::{ConfigError, DiscoveryMode};
    use crate::discovery::DynamicPeerListProvider;
    use crate::test_support::RecordingClient;
    use std::thread;

    fn keys() -> BTreeSet<String> {
        BTreeSet::from(["traceId".to_string()])
    }

    fn static_config(endpoints: &[&str]) -> PeerForwarderConfig {
        PeerForwarderConfig {
            ssl: false,
            discovery_mode: DiscoveryMode::Static,
            static_endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            client_thread_count: 2,
            ..Default::default()
        }
    }

    fn provider(config: PeerForwarderConfig) -> PeerForwarderProvider {
        PeerForwarderProvider::builder(config)
            .client(Arc::new(RecordingClient::succeeding()))
            .address_resolver(Arc::new(FixedAddressResolver::new(["10.0.0.1"])))
            .build()
            .unwrap()
    }

    #[test]
    fn single_node_registrations_stay_local() {
        let provider = provider(PeerForwarderConfig {
            ssl: false,
            ..Default::default()
        });
        assert!(!provider.is_peer_forwarding_required());

        // Registration still creates a buffer, but no dispatch pool
        let forwarder = provider.register("traces", "service-map", keys()).unwrap();
        assert!(forwarder.is_ready_for_shutdown());
        assert!(!provider.is_peer_forwarding_required());
        assert!(provider.receive_buffer("traces", "service-map").is_some());
        assert!(provider.dispatch.lock().is_none());
    }

    #[test]
    fn forwarding_requires_peers_and_a_registration() {
        let provider = provider(static_config(&["10.0.0.1", "10.0.0.2"]));
        // Peers alone are not enough
        assert!(!provider.is_peer_forwarding_required());

        provider.register("traces", "service-map", keys()).unwrap();
        assert!(provider.is_peer_forwarding_required());
        assert_eq!(provider.hash_ring().peers(), vec!["10.0.0.1", "10.0.0.2"]);
        assert!(provider.dispatch.lock().is_some());
    }

    #[test]
    fn single_static_endpoint_is_not_a_fleet() {
        let provider = provider(static_config(&["10.0.0.1"]));
        provider.register("traces", "service-map", keys()).unwrap();
        assert!(!provider.is_peer_forwarding_required());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let provider = provider(static_config(&["10.0.0.1", "10.0.0.2"]));
        provider.register("traces", "service-map", keys()).unwrap();

        let err = provider.register("traces", "service-map", keys()).err().unwrap();
        assert!(matches!(err, PeerForwarderError::DuplicateRegistration { .. }));

        // Another plugin in the same pipeline is fine
        assert!(provider.register("traces", "aggregate", keys()).is_ok());
    }

    #[test]
    fn concurrent_registration_admits_exactly_one() {
        let provider = Arc::new(provider(static_config(&["10.0.0.1", "10.0.0.2"])));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                thread::spawn(move || provider.register("traces", "service-map", keys()).is_ok())
            })
            .collect();

        // Exactly one thread wins the race
        let admitted = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn buffers_are_grouped_by_pipeline() {
        let provider = provider(PeerForwarderConfig {
            ssl: false,
            buffer_size: 64,
            batch_size: 8,
            ..Default::default()
        });
        provider.register("traces", "service-map", keys()).unwrap();
        provider.register("traces", "aggregate", keys()).unwrap();
        provider.register("logs", "aggregate", keys()).unwrap();

        let buffers = provider.pipeline_receive_buffers();
        assert_eq!(buffers.len(), 2);
        assert_eq!(buffers["traces"].len(), 2);
        let buffer = &buffers["logs"]["aggregate"];
        assert_eq!(buffer.capacity(), 64);
        assert_eq!(buffer.batch_size(), 8);
    }

    #[test]
    fn remote_forwarding_needs_a_client() {
        let provider = PeerForwarderProvider::builder(static_config(&["10.0.0.1", "10.0.0.2"]))
            .build()
            .unwrap();
        let err = provider.register("traces", "service-map", keys()).err().unwrap();
        assert!(matches!(err, PeerForwarderError::MissingClient));
        assert!(provider.receive_buffer("traces", "service-map").is_none());
    }

    #[test]
    fn build_validates_configuration() {
        let err = PeerForwarderProvider::builder(PeerForwarderConfig::default())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PeerForwarderError::Config(ConfigError::MissingField { .. })));
    }

    #[test]
    fn external_discovery_needs_a_provider() {
        let config = PeerForwarderConfig {
            ssl: false,
            discovery_mode: DiscoveryMode::Dns,
            domain_name: Some("peers.local".to_string()),
            client_thread_count: 2,
            ..Default::default()
        };
        let err = PeerForwarderProvider::builder(config.clone()).build().err().unwrap();
        assert!(matches!(err, PeerForwarderError::ExternalDiscoveryRequired(DiscoveryMode::Dns)));

        let peers = Arc::new(DynamicPeerListProvider::new(vec!["10.0.0.1".to_string()]));
        let provider = PeerForwarderProvider::builder(config)
            .client(Arc::new(RecordingClient::succeeding()))
            .peer_list_provider(peers.clone())
            .build()
            .unwrap();
        provider.register("traces", "service-map", keys()).unwrap();
        assert!(provider.is_peer_forwarding_required());

        peers.update(vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
        assert_eq!(provider.hash_ring().peers().len(), 2);
    }
}
