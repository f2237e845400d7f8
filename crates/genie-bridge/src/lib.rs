//! Device-side MQTT bridge for a Genie garage door opener
//!
//! A relay on a Raspberry Pi GPIO pin is wired across the wall console's
//! push button. The bridge announces itself through Home Assistant MQTT
//! discovery as a switch and presses the button for every command it
//! receives.

pub mod bridge;
pub mod config;
pub mod discovery;
pub mod error;
pub mod relay;

pub use bridge::{run, Bridge, Publisher};
pub use config::{BridgeConfig, DeviceConfig, GpioConfig, MqttConfig};
pub use discovery::{DiscoveryPayload, Topics};
pub use error::{BridgeConfigError, BridgeError};
pub use relay::{open_pin, GpioPin, Pulser, Relay, RelayPin, SimulatedPin};
