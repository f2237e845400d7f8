//! Test host with a recording relay
//!
//! Provides an isolated host with the switch platform set up and helpers
//! to drive sensors and wait for asynchronous state updates.

use async_trait::async_trait;
use ha_components::switch::{SwitchEntity, SwitchError, SwitchPlatform};
use ha_components::HomeAssistant;
use ha_core::{Context, EntityId, State};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand {
    On,
    Off,
}

/// A relay switch entity that records every command it receives
pub struct RecordingRelay {
    entity_id: EntityId,
    hass: HomeAssistant,
    commands: Mutex<Vec<(RelayCommand, Instant)>>,
}

impl RecordingRelay {
    pub fn new(hass: &HomeAssistant, entity_id: &str) -> Arc<Self> {
        Arc::new(Self {
            entity_id: entity_id.parse().expect("Invalid entity_id"),
            hass: hass.clone(),
            commands: Mutex::new(Vec::new()),
        })
    }

    pub fn commands(&self) -> Vec<RelayCommand> {
        self.commands.lock().unwrap().iter().map(|(c, _)| *c).collect()
    }

    pub fn timed_commands(&self) -> Vec<(RelayCommand, Instant)> {
        self.commands.lock().unwrap().clone()
    }

    fn record(&self, command: RelayCommand) {
        self.commands.lock().unwrap().push((command, Instant::now()));
        let state = match command {
            RelayCommand::On => "on",
            RelayCommand::Off => "off",
        };
        self.hass
            .states
            .set(self.entity_id.clone(), state, HashMap::new(), Context::new());
    }
}

#[async_trait]
impl SwitchEntity for RecordingRelay {
    fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    fn name(&self) -> &str {
        "Relay"
    }

    fn is_on(&self) -> Option<bool> {
        self.commands
            .lock()
            .unwrap()
            .last()
            .map(|(c, _)| *c == RelayCommand::On)
    }

    async fn turn_on(&self) -> Result<(), SwitchError> {
        self.record(RelayCommand::On);
        Ok(())
    }

    async fn turn_off(&self) -> Result<(), SwitchError> {
        self.record(RelayCommand::Off);
        Ok(())
    }

    async fn added_to_hass(&self) -> Result<(), SwitchError> {
        self.hass
            .states
            .set(self.entity_id.clone(), "off", HashMap::new(), Context::new());
        Ok(())
    }
}

/// A host with the switch platform and one relay
pub struct TestHomeAssistant {
    pub hass: HomeAssistant,
    pub switches: Arc<SwitchPlatform>,
    pub relay: Arc<RecordingRelay>,
}

impl TestHomeAssistant {
    pub async fn new(relay_id: &str) -> Self {
        Self::with_hass(HomeAssistant::new(), relay_id).await
    }

    pub async fn with_hass(hass: HomeAssistant, relay_id: &str) -> Self {
        let switches = SwitchPlatform::setup(&hass);
        let relay = RecordingRelay::new(&hass, relay_id);
        switches
            .add_entities(vec![relay.clone() as Arc<dyn SwitchEntity>])
            .await
            .expect("Failed to add relay");
        Self {
            hass,
            switches,
            relay,
        }
    }

    pub fn set_state(&self, entity_id: &str, state: &str) -> State {
        let entity_id: EntityId = entity_id.parse().expect("Invalid entity_id");
        self.hass
            .states
            .set(entity_id, state, HashMap::new(), Context::new())
    }

    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.hass.states.get_state(entity_id)
    }

    /// Wait until `entity_id` reaches `expected`, panicking after a second
    pub async fn wait_for_state(&self, entity_id: &str, expected: &str) {
        let reached =
            wait_until(|| self.get_state(entity_id).as_deref() == Some(expected)).await;
        assert!(
            reached,
            "Expected entity {} to reach '{}', but was {:?}",
            entity_id,
            expected,
            self.get_state(entity_id)
        );
    }

    pub async fn call_switch(&self, service: &str, entity_id: &str) {
        self.hass
            .services
            .call(
                "switch",
                service,
                serde_json::json!({ "entity_id": entity_id }),
                Context::new(),
                false,
            )
            .await
            .expect("Service call failed");
    }
}

/// Poll `condition` every few milliseconds for up to a second
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
