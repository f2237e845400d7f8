//! Built-in components
//!
//! - [`switch`]: the `switch` entity platform and its services
//! - [`garage_switch`]: a garage door opener built from a momentary relay
//!   switch and a door contact sensor

mod hass;

pub mod garage_switch;
pub mod switch;

pub use hass::HomeAssistant;
