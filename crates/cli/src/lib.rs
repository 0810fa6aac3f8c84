//! Inspection tool for peer forwarder configurations.
//!
//! Provides commands for:
//! - Listing the peers on the hash ring and the share of keys each owns
//! - Finding the peer that owns a given set of identification key values

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
