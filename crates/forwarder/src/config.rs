//! Peer forwarder configuration.
//!
//! Loaded from YAML with every option defaulted, then validated once at
//! startup. All timeouts are expressed in milliseconds.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::client::DEFAULT_FORWARDING_URI;

pub const DEFAULT_PORT: u16 = 4994;
pub const DEFAULT_BATCH_SIZE: usize = 48;
pub const DEFAULT_BUFFER_SIZE: usize = 512;
pub const DEFAULT_CLIENT_THREAD_COUNT: usize = 200;

/// Configuration errors. All of them are fatal at pipeline construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("'{0}' must be greater than zero")]
    NotPositive(&'static str),

    #[error("buffer_size ({buffer_size}) must be at least batch_size ({batch_size})")]
    BufferSmallerThanBatch { buffer_size: usize, batch_size: usize },

    #[error("'{field}' is required when {reason}")]
    MissingField { field: &'static str, reason: &'static str },

    #[error("mutual TLS authentication requires ssl to be enabled")]
    MutualTlsWithoutSsl,
}

/// How the peer list is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// Single node; forwarding is never required.
    #[default]
    LocalNode,
    /// Fixed list from `static_endpoints`.
    Static,
    Dns,
    AwsCloudMap,
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiscoveryMode::LocalNode => "local_node",
            DiscoveryMode::Static => "static",
            DiscoveryMode::Dns => "dns",
            DiscoveryMode::AwsCloudMap => "aws_cloud_map",
        };
        f.write_str(name)
    }
}

/// Authentication between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardingAuthentication {
    #[default]
    Unauthenticated,
    MutualTls,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PeerForwarderConfig {
    pub port: u16,
    pub request_timeout: u64,
    pub discovery_mode: DiscoveryMode,
    pub static_endpoints: Vec<String>,
    pub domain_name: Option<String>,
    pub aws_cloud_map_namespace_name: Option<String>,
    pub aws_cloud_map_service_name: Option<String>,
    pub aws_region: Option<String>,
    pub batch_size: usize,
    pub forwarding_batch_queue_depth: usize,
    pub buffer_size: usize,
    pub client_thread_count: usize,
    pub max_pending_requests: usize,
    pub receive_poll_delay: u64,
    pub failed_forwarding_requests_local_write_timeout: u64,
    pub checkpoint_timeout: u64,
    pub ssl: bool,
    pub ssl_certificate_file: Option<String>,
    pub ssl_key_file: Option<String>,
    pub use_acm_certificate_for_ssl: bool,
    pub acm_certificate_arn: Option<String>,
    pub acm_private_key_password: Option<String>,
    pub acm_certificate_timeout_millis: u64,
    pub authentication: ForwardingAuthentication,
}

impl Default for PeerForwarderConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            request_timeout: 10_000,
            discovery_mode: DiscoveryMode::LocalNode,
            static_endpoints: Vec::new(),
            domain_name: None,
            aws_cloud_map_namespace_name: None,
            aws_cloud_map_service_name: None,
            aws_region: None,
            batch_size: DEFAULT_BATCH_SIZE,
            forwarding_batch_queue_depth: 1,
            buffer_size: DEFAULT_BUFFER_SIZE,
            client_thread_count: DEFAULT_CLIENT_THREAD_COUNT,
            max_pending_requests: 1024,
            receive_poll_delay: 100,
            failed_forwarding_requests_local_write_timeout: 500,
            checkpoint_timeout: 30_000,
            ssl: true,
            ssl_certificate_file: None,
            ssl_key_file: None,
            use_acm_certificate_for_ssl: false,
            acm_certificate_arn: None,
            acm_private_key_password: None,
            acm_certificate_timeout_millis: 120_000,
            authentication: ForwardingAuthentication::Unauthenticated,
        }
    }
}

impl PeerForwarderConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("batch_size", self.batch_size),
            ("forwarding_batch_queue_depth", self.forwarding_batch_queue_depth),
            ("buffer_size", self.buffer_size),
            ("client_thread_count", self.client_thread_count),
            ("max_pending_requests", self.max_pending_requests),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive(name));
            }
        }

        if self.buffer_size < self.batch_size {
            return Err(ConfigError::BufferSmallerThanBatch {
                buffer_size: self.buffer_size,
                batch_size: self.batch_size,
            });
        }

        match self.discovery_mode {
            DiscoveryMode::Dns => require(&self.domain_name, "domain_name", "discovery_mode is dns")?,
            DiscoveryMode::AwsCloudMap => {
                let reason = "discovery_mode is aws_cloud_map";
                require(&self.aws_cloud_map_namespace_name, "aws_cloud_map_namespace_name", reason)?;
                require(&self.aws_cloud_map_service_name, "aws_cloud_map_service_name", reason)?;
                require(&self.aws_region, "aws_region", reason)?;
            }
            DiscoveryMode::LocalNode | DiscoveryMode::Static => {}
        }

        if self.ssl {
            if self.use_acm_certificate_for_ssl {
                let reason = "use_acm_certificate_for_ssl is enabled";
                require(&self.acm_certificate_arn, "acm_certificate_arn", reason)?;
                require(&self.aws_region, "aws_region", reason)?;
            } else {
                let reason = "ssl is enabled without ACM";
                require(&self.ssl_certificate_file, "ssl_certificate_file", reason)?;
                require(&self.ssl_key_file, "ssl_key_file", reason)?;
            }
        }

        if self.authentication == ForwardingAuthentication::MutualTls && !self.ssl {
            return Err(ConfigError::MutualTlsWithoutSsl);
        }

        Ok(())
    }

    /// Records per network dispatch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Capacity of each per-destination batching queue.
    pub fn batching_queue_capacity(&self) -> usize {
        self.batch_size * self.forwarding_batch_queue_depth
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    pub fn receive_poll_delay(&self) -> Duration {
        Duration::from_millis(self.receive_poll_delay)
    }

    pub fn local_write_timeout(&self) -> Duration {
        Duration::from_millis(self.failed_forwarding_requests_local_write_timeout)
    }

    pub fn checkpoint_timeout(&self) -> Duration {
        Duration::from_millis(self.checkpoint_timeout)
    }

    /// Peers are only configured when discovery can yield more than this node.
    pub fn are_peers_configured(&self) -> bool {
        match self.discovery_mode {
            DiscoveryMode::LocalNode => false,
            DiscoveryMode::Static => self.static_endpoints.len() > 1,
            DiscoveryMode::Dns | DiscoveryMode::AwsCloudMap => true,
        }
    }

    /// Forwarding endpoint of a peer.
    pub fn peer_uri(&self, address: &str) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}{}", scheme, address, self.port, DEFAULT_FORWARDING_URI)
    }
}

fn require(value: &Option<String>, field: &'static str, reason: &'static str) -> Result<(), ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::MissingField { field, reason }),
    }
}
