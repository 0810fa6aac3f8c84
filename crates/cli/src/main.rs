//! CLI entry point for peer-forwarder.

use clap::Parser;
use cli::CliConfig;
use tracing_subscriber::prelude::*;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CliConfig::parse();
    let result = config.run()?;
    println!("{}", result);
    Ok(())
}
