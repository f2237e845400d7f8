//! Home Assistant MQTT discovery

use crate::config::DeviceConfig;
use serde::Serialize;

pub const PAYLOAD_ON: &str = "ON";
pub const PAYLOAD_OFF: &str = "OFF";

const DISCOVERY_PREFIX: &str = "homeassistant";

/// Topics used by one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub discovery: String,
    pub state: String,
    pub command: String,
}

impl Topics {
    pub fn for_device(device_id: &str) -> Self {
        let base = format!("{DISCOVERY_PREFIX}/switch/{device_id}");
        Self {
            discovery: format!("{base}/config"),
            state: format!("{base}/state"),
            command: format!("{base}/set"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
}

/// Retained config message that makes the switch appear in Home Assistant
#[derive(Debug, Serialize)]
pub struct DiscoveryPayload {
    pub name: String,
    pub unique_id: String,
    pub command_topic: String,
    pub state_topic: String,
    pub payload_on: &'static str,
    pub payload_off: &'static str,
    pub state_on: &'static str,
    pub state_off: &'static str,
    pub device_class: &'static str,
    pub platform: &'static str,
    pub device: DeviceInfo,
}

impl DiscoveryPayload {
    pub fn new(device: &DeviceConfig, topics: &Topics) -> Self {
        let model = format!("ggo_v{}", device.version);
        Self {
            name: device.name.clone(),
            unique_id: device.id.clone(),
            command_topic: topics.command.clone(),
            state_topic: topics.state.clone(),
            payload_on: PAYLOAD_ON,
            payload_off: PAYLOAD_OFF,
            state_on: PAYLOAD_ON,
            state_off: PAYLOAD_OFF,
            device_class: "switch",
            platform: "button",
            device: DeviceInfo {
                identifiers: vec![model.clone()],
                name: device.name.clone(),
                model,
                manufacturer: device.manufacturer.clone(),
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
