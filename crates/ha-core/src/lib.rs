//! Core types for the automation host
//!
//! This crate provides the fundamental types shared by the host layer and
//! the components built on it: EntityId, State, Event, Context and
//! ServiceCall, plus the well-known state and service name constants.

mod context;
mod entity_id;
mod event;
mod service_call;
mod state;
mod util;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use service_call::ServiceCall;
pub use state::State;
pub use util::slugify;

/// State value of an entity that is on (or open, for binary sensors)
pub const STATE_ON: &str = "on";

/// State value of an entity that is off (or closed, for binary sensors)
pub const STATE_OFF: &str = "off";

/// State value reported when an entity cannot be reached
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// State value reported when an entity has no known value yet
pub const STATE_UNKNOWN: &str = "unknown";

/// Standard service names
pub mod services {
    pub const TURN_ON: &str = "turn_on";
    pub const TURN_OFF: &str = "turn_off";
    pub const TOGGLE: &str = "toggle";
}

/// Standard attribute keys
pub mod attributes {
    pub const ENTITY_ID: &str = "entity_id";
    pub const FRIENDLY_NAME: &str = "friendly_name";
    pub const ICON: &str = "icon";
    pub const DEVICE_CLASS: &str = "device_class";
}

/// Standard event types
pub mod events {
    use super::*;

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Data for STATE_CHANGED events
    ///
    /// `new_state` is `None` when the entity was removed.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }
}
