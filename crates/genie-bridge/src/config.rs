//! Bridge configuration (`config.yaml`)
//!
//! ```yaml
//! mqtt:
//!   broker: 192.168.1.10
//!   port: 1883
//!   username: garage
//!   password: changeme
//!   keepalive: 60
//! device:
//!   id: genie_garage_1
//!   version: "1.0"
//! gpio:
//!   garage_door_pin: 17
//!   pulse_ms: 2000
//! ```
//!
//! Broker settings can be overridden with `GENIE_MQTT_BROKER`,
//! `GENIE_MQTT_PORT`, `GENIE_MQTT_USERNAME` and `GENIE_MQTT_PASSWORD`.

use crate::error::BridgeConfigError;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_DEVICE_NAME: &str = "Genie Garage Opener";
pub const DEFAULT_MANUFACTURER: &str = "Jagel";

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub mqtt: MqttConfig,
    pub device: DeviceConfig,
    pub gpio: GpioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub broker: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive: u64,
    /// Defaults to the device id
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub version: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GpioConfig {
    /// BCM pin number wired to the console relay
    pub garage_door_pin: u8,
    /// How long the console button is held, in milliseconds
    #[serde(default = "default_pulse_ms")]
    pub pulse_ms: u64,
}

fn default_port() -> u16 {
    1883
}

fn default_keepalive() -> u64 {
    60
}

fn default_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}

fn default_manufacturer() -> String {
    DEFAULT_MANUFACTURER.to_string()
}

fn default_pulse_ms() -> u64 {
    2000
}

/// `version: 1.0` in YAML is a float; keep it as written
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other:?}"
        ))),
    }
}

impl BridgeConfig {
    /// Read, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BridgeConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| BridgeConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::parse(&content)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, BridgeConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Override broker settings from `GENIE_MQTT_*` variables
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), BridgeConfigError> {
        if let Some(broker) = lookup("GENIE_MQTT_BROKER") {
            self.mqtt.broker = broker;
        }
        if let Some(port) = lookup("GENIE_MQTT_PORT") {
            self.mqtt.port = port.parse().map_err(|_| BridgeConfigError::Invalid {
                field: "GENIE_MQTT_PORT",
                reason: format!("'{port}' is not a port number"),
            })?;
        }
        if let Some(username) = lookup("GENIE_MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup("GENIE_MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), BridgeConfigError> {
        if self.mqtt.broker.trim().is_empty() {
            return Err(BridgeConfigError::Invalid {
                field: "mqtt.broker",
                reason: "must not be empty".to_string(),
            });
        }
        if self.device.id.is_empty()
            || self
                .device
                .id
                .contains(|c: char| matches!(c, '/' | '+' | '#') || c.is_whitespace())
        {
            return Err(BridgeConfigError::Invalid {
                field: "device.id",
                reason: format!("'{}' can't be used in an MQTT topic", self.device.id),
            });
        }
        if !(1..=60_000).contains(&self.gpio.pulse_ms) {
            return Err(BridgeConfigError::Invalid {
                field: "gpio.pulse_ms",
                reason: format!("{} is outside 1..=60000", self.gpio.pulse_ms),
            });
        }
        Ok(())
    }

    pub fn client_id(&self) -> &str {
        self.mqtt.client_id.as_deref().unwrap_or(&self.device.id)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.mqtt.keepalive)
    }

    pub fn pulse(&self) -> Duration {
        Duration::from_millis(self.gpio.pulse_ms)
    }
}
