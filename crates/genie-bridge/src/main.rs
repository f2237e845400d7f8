use anyhow::{Context, Result};
use genie_bridge::{open_pin, run, BridgeConfig, Relay};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("GENIE_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let config = BridgeConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    info!(
        device = %config.device.id,
        pin = config.gpio.garage_door_pin,
        "Starting Genie garage bridge"
    );

    let relay = Arc::new(Relay::new(
        open_pin(config.gpio.garage_door_pin),
        config.pulse(),
    ));

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "Failed to listen for shutdown signal");
        }
    };

    run(&config, relay, shutdown)
        .await
        .context("Bridge stopped with an error")?;

    info!("Bridge stopped");
    Ok(())
}
