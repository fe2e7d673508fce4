use anyhow::{Context, Result};
use tracing::info;

use crate::config::{Config, get_config_dir};
use crate::server;

/// Start the HTTP service with the on-disk configuration, applying any
/// host/port overrides from the command line.
#[inline]
pub async fn serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let config_dir = get_config_dir().context("Failed to locate config directory")?;
    let mut config = Config::load(&config_dir).context("Failed to load configuration")?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    info!(
        "Starting ragserve on {}:{} (provider: {})",
        config.server.host, config.server.port, config.provider.base_url
    );

    server::serve(config).await.context("Server failed")
}

/// Print the effective configuration as TOML.
#[inline]
pub fn show_config() -> Result<()> {
    let config_dir = get_config_dir().context("Failed to locate config directory")?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;

    let rendered =
        toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
    println!("Configuration directory: {}", config_dir.display());
    println!();
    println!("{rendered}");

    Ok(())
}
