//! Peer discovery.
//!
//! A [`PeerListProvider`] yields the current peer addresses and notifies
//! listeners when the set changes. DNS and cloud service discovery backends
//! live outside this crate; they feed a [`DynamicPeerListProvider`].

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{DiscoveryMode, PeerForwarderConfig};
use crate::error::{PeerForwarderError, Result};

/// Called with the full peer list. Returning `false` unsubscribes.
pub type PeerListListener = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

pub trait PeerListProvider: Send + Sync + 'static {
    fn peer_list(&self) -> Vec<String>;

    fn add_listener(&self, listener: PeerListListener);
}

/// Fixed peer list. Listeners are accepted but never called.
#[derive(Debug, Clone, Default)]
pub struct StaticPeerListProvider {
    endpoints: Vec<String>,
}

impl StaticPeerListProvider {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self { endpoints }
    }
}

impl PeerListProvider for StaticPeerListProvider {
    fn peer_list(&self) -> Vec<String> {
        self.endpoints.clone()
    }

    fn add_listener(&self, _listener: PeerListListener) {}
}

/// Peer list updated from outside, typically by a discovery backend's
/// refresh loop.
///
/// Updates and notifications are serialized under the listener lock, so every
/// listener sees changes in the order they were stored. Listeners must not
/// call back into `update` or `add_listener`.
#[derive(Default)]
pub struct DynamicPeerListProvider {
    peers: RwLock<BTreeSet<String>>,
    listeners: Mutex<Vec<PeerListListener>>,
}

impl DynamicPeerListProvider {
    pub fn new(initial: impl IntoIterator<Item = String>) -> Self {
        Self {
            peers: RwLock::new(initial.into_iter().collect()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the peer set. Listeners only hear about actual changes.
    pub fn update(&self, peers: impl IntoIterator<Item = String>) -> bool {
        let next: BTreeSet<String> = peers.into_iter().collect();
        let mut listeners = self.listeners.lock();
        let snapshot: Vec<String> = {
            let mut current = self.peers.write();
            if *current == next {
                return false;
            }
            *current = next;
            current.iter().cloned().collect()
        };

        info!(peers = ?snapshot, "peer list changed");
        let before = listeners.len();
        listeners.retain(|listener| listener(&snapshot));
        if listeners.len() < before {
            debug!(removed = before - listeners.len(), "dropped unsubscribed peer list listeners");
        }
        true
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl PeerListProvider for DynamicPeerListProvider {
    fn peer_list(&self) -> Vec<String> {
        self.peers.read().iter().cloned().collect()
    }

    /// The listener is called once with the current list straight away, so a
    /// change racing its registration is not missed.
    fn add_listener(&self, listener: PeerListListener) {
        let mut listeners = self.listeners.lock();
        if listener(&self.peer_list()) {
            listeners.push(listener);
        }
    }
}

/// Builds the provider for the built-in discovery modes.
pub fn peer_list_provider_from_config(config: &PeerForwarderConfig) -> Result<Arc<dyn PeerListProvider>> {
    match config.discovery_mode {
        DiscoveryMode::LocalNode => Ok(Arc::new(StaticPeerListProvider::default())),
        DiscoveryMode::Static => Ok(Arc::new(StaticPeerListProvider::new(config.static_endpoints.clone()))),
        mode @ (DiscoveryMode::Dns | DiscoveryMode::AwsCloudMap) => {
            Err(PeerForwarderError::ExternalDiscoveryRequired(mode))
        }
    }
}
