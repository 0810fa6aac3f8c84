use anyhow::Context;
use clap::Parser;
use forwarder::config::DiscoveryMode;
use forwarder::{PeerForwarderConfig, PeerForwarderProvider};
use std::path::PathBuf;
use tracing::debug;

use crate::commands::{Command, CommandResult};

/// Inspect how a peer forwarder configuration partitions keys.
#[derive(Parser, Debug)]
#[command(name = "peer-forwarder")]
pub struct CliConfig {
    /// Peer forwarder configuration file (YAML).
    #[arg(short, long)]
    pub config: PathBuf,

    /// Peer addresses, overriding the configured discovery.
    #[arg(long, value_delimiter = ',')]
    pub endpoints: Option<Vec<String>>,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    pub fn run(&self) -> anyhow::Result<CommandResult> {
        let config = self.load_config()?;
        let provider = PeerForwarderProvider::builder(config)
            .build()
            .context("failed to set up peer forwarder")?;
        self.command.execute(&provider)
    }

    fn load_config(&self) -> anyhow::Result<PeerForwarderConfig> {
        let mut config = PeerForwarderConfig::from_file(&self.config)
            .with_context(|| format!("failed to load {}", self.config.display()))?;
        if let Some(endpoints) = &self.endpoints {
            debug!(endpoints = ?endpoints, "overriding configured discovery");
            apply_endpoints(&mut config, endpoints);
        }
        Ok(config)
    }
}

fn apply_endpoints(config: &mut PeerForwarderConfig, endpoints: &[String]) {
    config.discovery_mode = DiscoveryMode::Static;
    config.static_endpoints = endpoints
        .iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();
}
