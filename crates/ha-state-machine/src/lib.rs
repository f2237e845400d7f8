//! Entity state machine
//!
//! The StateMachine holds the current state of every entity and fires
//! `state_changed` on the event bus whenever a state is written or removed.
//! The [`restore`] module keeps the last known states across restarts.

pub mod restore;

pub use restore::{RestoreError, RestoreStateStore};

use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::{Context, EntityId, State};
use ha_event_bus::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// The state machine tracks all entity states
pub struct StateMachine {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    event_bus: Arc<EventBus>,
}

impl StateMachine {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            event_bus,
        }
    }

    /// Set the state of an entity
    ///
    /// `last_changed` only moves when the value itself changes. A
    /// `state_changed` event carrying the old and new state is always fired.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context.clone()),
            None => State::new(entity_id.clone(), state, attributes, context.clone()),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map_or(true, |s| s.state != new_state.state),
            "Setting entity state"
        );

        self.states.insert(key, new_state.clone());

        self.event_bus.fire_typed(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );

        new_state
    }

    /// Get the current state of an entity
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get the state value, or None if the entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.states.contains_key(entity_id)
    }

    /// Get all states
    pub fn all(&self) -> Vec<State> {
        self.states.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove an entity's state, firing `state_changed` with no new state
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let old_state = self.states.remove(&entity_id.to_string()).map(|(_, s)| s);

        if let Some(state) = &old_state {
            trace!("Removing entity state");
            self.event_bus.fire_typed(
                StateChangedData {
                    entity_id: entity_id.clone(),
                    old_state: Some(state.clone()),
                    new_state: None,
                },
                context,
            );
        }

        old_state
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

/// Thread-safe wrapper for StateMachine
pub type SharedStateMachine = Arc<StateMachine>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_test_setup() -> (Arc<EventBus>, StateMachine) {
        let event_bus = Arc::new(EventBus::new());
        let state_machine = StateMachine::new(event_bus.clone());
        (event_bus, state_machine)
    }

    #[test]
    fn test_set_and_get_state() {
        let (_, sm) = make_test_setup();

        let entity_id: EntityId = "switch.relay1".parse().unwrap();
        let attrs = HashMap::from([("friendly_name".to_string(), json!("Relay 1"))]);

        let state = sm.set(entity_id, "off", attrs.clone(), Context::new());
        assert_eq!(state.state, "off");
        assert_eq!(state.attributes, attrs);

        assert!(sm.contains("switch.relay1"));
        assert!(sm.is_state("switch.relay1", "off"));
        assert!(!sm.is_state("switch.relay2", "off"));
        assert_eq!(sm.entity_count(), 1);
    }

    #[test]
    fn test_remove_state() {
        let (_, sm) = make_test_setup();

        let entity_id: EntityId = "binary_sensor.door1".parse().unwrap();
        sm.set(entity_id.clone(), "on", HashMap::new(), Context::new());

        let removed = sm.remove(&entity_id, Context::new()).unwrap();
        assert_eq!(removed.state, "on");
        assert!(sm.get("binary_sensor.door1").is_none());
        assert!(sm.remove(&entity_id, Context::new()).is_none());
    }

    #[tokio::test]
    async fn test_state_changed_event_fired() {
        let (bus, sm) = make_test_setup();
        let mut rx = bus.subscribe_typed::<StateChangedData>();

        let entity_id: EntityId = "binary_sensor.door1".parse().unwrap();
        sm.set(entity_id.clone(), "off", HashMap::new(), Context::new());
        sm.set(entity_id, "on", HashMap::new(), Context::new());

        let first = rx.recv().await.unwrap();
        assert!(first.data.old_state.is_none());
        assert_eq!(first.data.new_state.unwrap().state, "off");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.data.old_state.unwrap().state, "off");
        assert_eq!(second.data.new_state.unwrap().state, "on");
    }

    #[tokio::test]
    async fn test_remove_fires_event_without_new_state() {
        let (bus, sm) = make_test_setup();
        let entity_id: EntityId = "binary_sensor.door1".parse().unwrap();
        sm.set(entity_id.clone(), "on", HashMap::new(), Context::new());

        let mut rx = bus.subscribe_typed::<StateChangedData>();
        sm.remove(&entity_id, Context::new());

        let event = rx.recv().await.unwrap();
        assert!(event.data.new_state.is_none());
        assert_eq!(event.data.old_state.unwrap().state, "on");
    }
}
