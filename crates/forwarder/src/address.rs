//! Deciding whether a peer address refers to this host.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long a classification, and the interface snapshot it was made
/// against, is trusted before it is looked up again.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Answers whether an address resolves to the current host.
pub trait LocalAddressResolver: Send + Sync + 'static {
    fn is_local(&self, address: &str) -> io::Result<bool>;
}

struct HostAddresses {
    addresses: HashSet<IpAddr>,
    refreshed_at: Instant,
}

/// Resolves addresses with the system resolver and compares them against
/// loopback, the wildcard address and the addresses of every local network
/// interface.
///
/// Classifications are cached per address string and expire after the cache
/// TTL, so a hostname whose address moves is reclassified.
pub struct SystemAddressResolver {
    configured: HashSet<IpAddr>,
    host: RwLock<HostAddresses>,
    cache: DashMap<String, (bool, Instant)>,
    ttl: Duration,
}

impl SystemAddressResolver {
    pub fn new() -> Self {
        Self::with_addresses(std::iter::empty())
    }

    /// Also treats `addresses` as belonging to this host.
    pub fn with_addresses(addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        let configured: HashSet<IpAddr> = addresses.into_iter().collect();
        let host = HostAddresses {
            addresses: interface_addresses(&configured),
            refreshed_at: Instant::now(),
        };
        debug!(addresses = ?host.addresses, "detected local interface addresses");
        Self {
            configured,
            host: RwLock::new(host),
            cache: DashMap::new(),
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn cached(&self, address: &str) -> Option<bool> {
        let entry = self.cache.get(address)?;
        let (local, at) = *entry.value();
        (at.elapsed() < self.ttl).then_some(local)
    }

    fn is_host_address(&self, ip: &IpAddr) -> bool {
        {
            let host = self.host.read();
            if host.refreshed_at.elapsed() < self.ttl {
                return host.addresses.contains(ip);
            }
        }
        let mut host = self.host.write();
        if host.refreshed_at.elapsed() >= self.ttl {
            host.addresses = interface_addresses(&self.configured);
            host.refreshed_at = Instant::now();
        }
        host.addresses.contains(ip)
    }

    fn resolve(&self, address: &str) -> io::Result<bool> {
        let ips: Vec<IpAddr> = match address.parse::<IpAddr>() {
            Ok(ip) => vec![ip],
            Err(_) => match address.parse::<SocketAddr>() {
                Ok(socket) => vec![socket.ip()],
                Err(_) => {
                    let host = strip_port(address);
                    (host, 0).to_socket_addrs()?.map(|s| s.ip()).collect()
                }
            },
        };

        if ips.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} did not resolve to any address", address),
            ));
        }

        Ok(ips
            .iter()
            .any(|ip| ip.is_loopback() || ip.is_unspecified() || self.is_host_address(ip)))
    }
}

impl Default for SystemAddressResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalAddressResolver for SystemAddressResolver {
    fn is_local(&self, address: &str) -> io::Result<bool> {
        if let Some(local) = self.cached(address) {
            return Ok(local);
        }
        let local = self.resolve(address)?;
        self.cache.insert(address.to_string(), (local, Instant::now()));
        Ok(local)
    }
}

/// Treats exactly the given address strings as local. Nothing is resolved.
#[derive(Debug, Clone, Default)]
pub struct FixedAddressResolver {
    local: HashSet<String>,
}

impl FixedAddressResolver {
    pub fn new<I, S>(local: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            local: local.into_iter().map(Into::into).collect(),
        }
    }
}

impl LocalAddressResolver for FixedAddressResolver {
    fn is_local(&self, address: &str) -> io::Result<bool> {
        Ok(self.local.contains(address))
    }
}

fn strip_port(address: &str) -> &str {
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => host,
        _ => address,
    }
}

/// Addresses bound to any local interface, plus the configured extras.
fn interface_addresses(configured: &HashSet<IpAddr>) -> HashSet<IpAddr> {
    let mut addresses = configured.clone();
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => addresses.extend(interfaces.iter().map(|i| i.ip())),
        Err(e) => warn!(error = %e, "could not list network interfaces"),
    }
    addresses
}
