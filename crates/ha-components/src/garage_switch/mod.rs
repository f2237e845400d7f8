//! Garage door opener integration
//!
//! Each configured door pairs a relay switch (`trigger_switch`) wired to the
//! opener's wall-console contacts with a door contact (`state_sensor`).
//! The door is exposed as `switch.<name>`: switching it either way pulses
//! the relay, and its on/off state is the door's open/closed state.

mod config;
mod driver;
mod entity;
mod observer;
mod platform;
mod pulse;

pub use config::{
    GarageSwitchConfig, GarageSwitchConfigError, DEFAULT_MOMENTARY_DURATION,
    MOMENTARY_DURATION_RANGE,
};
pub use driver::{ActuatorDriver, ServiceCallDriver, DEFAULT_CALL_TIMEOUT};
pub use entity::{DoorState, DoorSwitchEntity, DEVICE_CLASS, ICON_CLOSED, ICON_OPEN};
pub use observer::{display_text, ChangeCallback, SensorReading, StateObserver};
pub use platform::{GarageSwitchPlatform, SetupError, SERVICE_TRIGGER};
pub use pulse::{CancelPolicy, PulseActuator, PulseError, PulseHandle, PulseMode, PulseOutcome};

pub const DOMAIN: &str = "garage_switch";
