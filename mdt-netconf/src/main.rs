//! MDT NETCONF console entry point

use anyhow::{Context, Result};
use std::io;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mdt_netconf::{Console, ConfigWriter, DeviceSession, Orchestrator, Settings};

fn main() -> Result<()> {
    // Logs go to stderr so they stay out of the menu
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mdt_netconf=warn")),
        )
        .with_writer(io::stderr)
        .init();

    let config_path = Settings::config_file_path();
    let settings = Settings::load(&config_path)
        .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;
    let writer = ConfigWriter::load(&settings.template).context("Failed to load subscription template")?;

    info!("📡 MDT NETCONF starting with {} device(s)", settings.devices.len());

    let console = Console::new(io::stdin().lock(), io::stdout().lock());
    let mut orchestrator = Orchestrator::start(&settings.devices, DeviceSession::connect, writer, console)?;
    orchestrator.run().context("Session loop failed")?;

    Ok(())
}
