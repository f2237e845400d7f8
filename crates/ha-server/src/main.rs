//! Automation host server
//!
//! Loads `configuration.yaml` from the config directory (`HA_CONFIG_DIR`,
//! default `./config`), sets up the switch platform and the garage_switch
//! integration, and runs until Ctrl-C. Entity states are kept in
//! `.storage/core.restore_state` across restarts.

use anyhow::{Context as _, Result};
use ha_components::garage_switch::GarageSwitchPlatform;
use ha_components::switch::SwitchPlatform;
use ha_components::HomeAssistant;
use ha_config::Configuration;
use ha_state_machine::RestoreStateStore;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_CONFIG_DIR: &str = "./config";

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_dir = std::env::var_os("HA_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR));

    info!(config_dir = ?config_dir, "Starting automation host");

    let config = Configuration::load(&config_dir)
        .with_context(|| format!("loading configuration from {}", config_dir.display()))?;

    let restore = match RestoreStateStore::load_from(&config_dir).await {
        Ok(restore) => restore,
        Err(err) => {
            warn!(%err, "Ignoring unreadable restore state");
            RestoreStateStore::new()
        }
    };

    let hass = HomeAssistant::with_restore(restore);
    let switches = SwitchPlatform::setup(&hass);
    let garage = GarageSwitchPlatform::async_setup(&hass, &switches, &config)
        .await
        .context("setting up garage_switch")?;

    info!(doors = garage.entities().len(), "Automation host is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    garage.async_unload().await;
    switches.remove_all().await;

    hass.restore
        .save_to(&config_dir)
        .await
        .context("saving restore state")?;

    info!("Stopped");
    Ok(())
}
