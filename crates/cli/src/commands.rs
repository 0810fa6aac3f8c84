use anyhow::bail;
use clap::Subcommand;
use forwarder::PeerForwarderProvider;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List peers with their virtual nodes and share of the key space.
    Ring,

    /// Show which peer owns a record with the given key values.
    Route {
        /// `field=value`, or `field` alone for a missing value. Repeatable.
        #[arg(long = "key", required = true)]
        keys: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeerShare {
    pub address: String,
    pub virtual_nodes: usize,
    pub share: f64,
    pub local: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    Ring(Vec<PeerShare>),
    Route {
        peer: Option<String>,
        local: bool,
        uri: Option<String>,
    },
}

impl Command {
    pub fn execute(&self, provider: &PeerForwarderProvider) -> anyhow::Result<CommandResult> {
        let ring = provider.hash_ring();
        let is_local = |address: &str| provider.address_resolver().is_local(address).unwrap_or(true);

        match self {
            Command::Ring => {
                let virtual_nodes = ring.virtual_nodes();
                let peers = ring
                    .ownership()
                    .into_iter()
                    .map(|(address, share)| PeerShare {
                        local: is_local(&address),
                        address,
                        virtual_nodes,
                        share,
                    })
                    .collect();
                Ok(CommandResult::Ring(peers))
            }
            Command::Route { keys } => {
                let composite_key: Vec<Option<String>> = parse_keys(keys)?.into_values().collect();
                let peer = ring.get_server_ip(&composite_key);
                let local = peer.as_deref().map_or(true, is_local);
                let uri = peer.as_deref().map(|p| provider.config().peer_uri(p));
                Ok(CommandResult::Route { peer, local, uri })
            }
        }
    }
}

/// Parses `field=value` / `field` arguments. Fields come back sorted, which
/// is the order the forwarder builds composite keys in.
pub fn parse_keys(keys: &[String]) -> anyhow::Result<BTreeMap<String, Option<String>>> {
    let mut parsed = BTreeMap::new();
    for key in keys {
        let (field, value) = match key.split_once('=') {
            Some((field, value)) => (field.trim(), Some(value.to_string())),
            None => (key.trim(), None),
        };
        if field.is_empty() {
            bail!("key '{}' has no field name", key);
        }
        if parsed.insert(field.to_string(), value).is_some() {
            bail!("field '{}' given more than once", field);
        }
    }
    Ok(parsed)
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Ring(peers) if peers.is_empty() => write!(f, "no peers: every record is processed locally"),
            CommandResult::Ring(peers) => {
                writeln!(f, "{:<40} {:>6} {:>8}", "PEER", "VNODES", "SHARE")?;
                for peer in peers {
                    let marker = if peer.local { " (local)" } else { "" };
                    writeln!(
                        f,
                        "{:<40} {:>6} {:>7.2}%{}",
                        peer.address,
                        peer.virtual_nodes,
                        peer.share * 100.0,
                        marker
                    )?;
                }
                Ok(())
            }
            CommandResult::Route { peer: None, .. } => write!(f, "no peers: processed locally"),
            CommandResult::Route {
                peer: Some(peer),
                local: true,
                ..
            } => write!(f, "{} (local)", peer),
            CommandResult::Route { peer: Some(peer), uri, .. } => {
                write!(f, "{} -> {}", peer, uri.as_deref().unwrap_or("-"))
            }
        }
    }
}
