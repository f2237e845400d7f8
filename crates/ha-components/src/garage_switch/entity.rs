//! The garage door switch entity

use super::config::GarageSwitchConfig;
use super::driver::ServiceCallDriver;
use super::observer::{display_text, StateObserver};
use super::pulse::{PulseActuator, PulseHandle};
use super::DOMAIN;
use crate::switch::{self, SwitchEntity, SwitchError};
use crate::HomeAssistant;
use async_trait::async_trait;
use ha_core::{attributes, Context, EntityId, STATE_OFF, STATE_ON, STATE_UNAVAILABLE};
use ha_state_machine::{RestoreStateStore, StateMachine};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

pub const ICON_OPEN: &str = "mdi:garage-open";
pub const ICON_CLOSED: &str = "mdi:garage";
pub const DEVICE_CLASS: &str = "garage";

/// Where the door is, as far as the sensor has told us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorState {
    Unavailable,
    Closed,
    Open,
}

impl From<Option<bool>> for DoorState {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => DoorState::Unavailable,
            Some(false) => DoorState::Closed,
            Some(true) => DoorState::Open,
        }
    }
}

/// Entity state shared with the observer callback
struct DoorSwitchState {
    entity_id: EntityId,
    config: GarageSwitchConfig,
    is_on: Mutex<Option<bool>>,
    states: Arc<StateMachine>,
    restore: Arc<RestoreStateStore>,
}

impl DoorSwitchState {
    fn is_on(&self) -> Option<bool> {
        *self.is_on.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a sensor value; returns whether the door state changed
    fn handle_state_update(&self, value: bool) -> bool {
        {
            let mut is_on = self.is_on.lock().unwrap_or_else(PoisonError::into_inner);
            if *is_on == Some(value) {
                return false;
            }
            *is_on = Some(value);
        }

        info!(
            entity_id = %self.entity_id,
            state = display_text(Some(value)),
            "Garage door state changed"
        );
        self.write_state();
        true
    }

    fn extra_state_attributes(&self) -> HashMap<String, Value> {
        HashMap::from([
            ("state_text".to_string(), json!(display_text(self.is_on()))),
            (
                "trigger_switch".to_string(),
                json!(self.config.trigger_switch.to_string()),
            ),
            (
                "state_sensor".to_string(),
                json!(self.config.state_sensor.to_string()),
            ),
            (
                "pulse_duration".to_string(),
                json!(self.config.momentary_duration()),
            ),
            ("integration".to_string(), json!(DOMAIN)),
        ])
    }

    fn write_state(&self) {
        let is_on = self.is_on();
        let state = match is_on {
            Some(true) => STATE_ON,
            Some(false) => STATE_OFF,
            None => STATE_UNAVAILABLE,
        };

        let mut attrs = self.extra_state_attributes();
        attrs.insert(attributes::FRIENDLY_NAME.to_string(), json!(self.config.name));
        attrs.insert(attributes::ICON.to_string(), json!(icon(is_on)));
        attrs.insert(attributes::DEVICE_CLASS.to_string(), json!(DEVICE_CLASS));

        let written = self
            .states
            .set(self.entity_id.clone(), state, attrs, Context::new());
        self.restore.record(&written);
    }
}

fn icon(is_on: Option<bool>) -> &'static str {
    if is_on == Some(true) {
        ICON_OPEN
    } else {
        ICON_CLOSED
    }
}

/// A garage door exposed as a switch
///
/// Turning the switch on or off pulses the trigger relay; the switch state
/// itself only follows the door sensor.
pub struct DoorSwitchEntity {
    state: Arc<DoorSwitchState>,
    unique_id: String,
    actuator: PulseActuator,
    observer: StateObserver,
}

impl DoorSwitchEntity {
    pub fn new(hass: &HomeAssistant, config: GarageSwitchConfig) -> Result<Self, SwitchError> {
        let driver = Arc::new(ServiceCallDriver::new(
            hass.states.clone(),
            hass.services.clone(),
        ));
        let actuator = PulseActuator::new(driver, config.mode);
        Self::with_actuator(hass, config, actuator)
    }

    /// Build the entity around an existing actuator
    pub fn with_actuator(
        hass: &HomeAssistant,
        config: GarageSwitchConfig,
        actuator: PulseActuator,
    ) -> Result<Self, SwitchError> {
        let slug = config.slug();
        let entity_id = EntityId::new(switch::DOMAIN, &slug)?;

        let state = Arc::new(DoorSwitchState {
            entity_id,
            is_on: Mutex::new(None),
            states: hass.states.clone(),
            restore: hass.restore.clone(),
            config,
        });

        let observer = StateObserver::new(
            hass.bus.clone(),
            hass.states.clone(),
            state.config.state_sensor.clone(),
            Arc::new({
                let state = state.clone();
                move |value| {
                    state.handle_state_update(value);
                }
            }),
        );

        Ok(Self {
            unique_id: format!("{DOMAIN}_{slug}"),
            state,
            actuator,
            observer,
        })
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn config(&self) -> &GarageSwitchConfig {
        &self.state.config
    }

    pub fn available(&self) -> bool {
        self.state.is_on().is_some()
    }

    pub fn door_state(&self) -> DoorState {
        self.state.is_on().into()
    }

    pub fn state_text(&self) -> &'static str {
        display_text(self.state.is_on())
    }

    pub fn icon(&self) -> &'static str {
        icon(self.state.is_on())
    }

    pub fn device_class(&self) -> &'static str {
        DEVICE_CLASS
    }

    pub fn extra_state_attributes(&self) -> HashMap<String, Value> {
        self.state.extra_state_attributes()
    }

    /// Apply a door sensor value, as the observer does
    pub fn handle_state_update(&self, value: bool) -> bool {
        self.state.handle_state_update(value)
    }

    pub fn active_pulses(&self) -> usize {
        self.actuator.active_count()
    }

    /// Pulse the trigger relay
    pub fn pulse(&self) -> PulseHandle {
        debug!(
            entity_id = %self.state.entity_id,
            target = %self.state.config.trigger_switch,
            "Triggering garage door"
        );
        self.actuator
            .trigger_nonblocking(self.state.config.trigger_switch.clone())
    }

    fn restore_last_state(&self) {
        let Some(last) = self
            .state
            .restore
            .last_state(&self.state.entity_id.to_string())
        else {
            return;
        };

        let restored = match last.state.as_str() {
            STATE_ON => Some(true),
            STATE_OFF => Some(false),
            _ => None,
        };
        if let Some(value) = restored {
            debug!(entity_id = %self.state.entity_id, state = %last.state, "Restored state");
            *self.state.is_on.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
        }
    }
}

#[async_trait]
impl SwitchEntity for DoorSwitchEntity {
    fn entity_id(&self) -> &EntityId {
        &self.state.entity_id
    }

    fn name(&self) -> &str {
        &self.state.config.name
    }

    fn is_on(&self) -> Option<bool> {
        self.state.is_on()
    }

    async fn turn_on(&self) -> Result<(), SwitchError> {
        self.pulse();
        Ok(())
    }

    async fn turn_off(&self) -> Result<(), SwitchError> {
        self.pulse();
        Ok(())
    }

    async fn toggle(&self) -> Result<(), SwitchError> {
        self.pulse();
        Ok(())
    }

    async fn added_to_hass(&self) -> Result<(), SwitchError> {
        self.restore_last_state();
        self.observer.start();
        self.state.write_state();

        info!(
            entity_id = %self.state.entity_id,
            trigger = %self.state.config.trigger_switch,
            sensor = %self.state.config.state_sensor,
            state = self.state_text(),
            "Garage switch added"
        );
        Ok(())
    }

    async fn will_remove_from_hass(&self) {
        self.observer.stop();
        self.actuator.shutdown().await;
        debug!(entity_id = %self.state.entity_id, "Garage switch removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::garage_switch::pulse::PulseMode;
    use std::time::Duration;

    fn config() -> GarageSwitchConfig {
        GarageSwitchConfig {
            name: "Main Door".to_string(),
            trigger_switch: "switch.relay1".parse().unwrap(),
            state_sensor: "binary_sensor.door1".parse().unwrap(),
            mode: PulseMode::Momentary {
                hold: Duration::from_secs(1),
            },
        }
    }

    #[tokio::test]
    async fn test_identity_and_initial_state() {
        let hass = HomeAssistant::new();
        let entity = DoorSwitchEntity::new(&hass, config()).unwrap();

        assert_eq!(entity.entity_id().to_string(), "switch.main_door");
        assert_eq!(entity.unique_id(), "garage_switch_main_door");
        assert_eq!(entity.name(), "Main Door");
        assert_eq!(entity.is_on(), None);
        assert!(!entity.available());
        assert_eq!(entity.door_state(), DoorState::Unavailable);
        assert_eq!(entity.state_text(), "unavailable");
        assert_eq!(entity.icon(), ICON_CLOSED);
        assert_eq!(entity.device_class(), "garage");
    }

    #[tokio::test]
    async fn test_state_updates_and_attributes() {
        let hass = HomeAssistant::new();
        let entity = DoorSwitchEntity::new(&hass, config()).unwrap();

        assert!(entity.handle_state_update(true));
        assert!(!entity.handle_state_update(true));
        assert_eq!(entity.door_state(), DoorState::Open);
        assert_eq!(entity.icon(), ICON_OPEN);

        let state = hass.states.get("switch.main_door").unwrap();
        assert_eq!(state.state, "on");
        assert_eq!(state.attribute::<String>("icon").unwrap(), ICON_OPEN);
        assert_eq!(state.attribute::<String>("state_text").unwrap(), "open");
        assert_eq!(state.attribute::<String>("friendly_name").unwrap(), "Main Door");
        assert_eq!(state.attribute::<f64>("pulse_duration").unwrap(), 1.0);
        assert_eq!(
            state.attribute::<String>("trigger_switch").unwrap(),
            "switch.relay1"
        );

        assert!(entity.handle_state_update(false));
        assert_eq!(entity.door_state(), DoorState::Closed);
        assert_eq!(hass.states.get_state("switch.main_door").unwrap(), "off");
        assert_eq!(
            hass.restore.last_state("switch.main_door").unwrap().state,
            "off"
        );
    }

    #[tokio::test]
    async fn test_fire_once_has_null_pulse_duration() {
        let hass = HomeAssistant::new();
        let entity = DoorSwitchEntity::new(
            &hass,
            GarageSwitchConfig {
                mode: PulseMode::FireOnce,
                ..config()
            },
        )
        .unwrap();

        let attrs = entity.extra_state_attributes();
        assert_eq!(attrs["pulse_duration"], Value::Null);
        assert_eq!(attrs["integration"], json!("garage_switch"));
    }

    #[tokio::test]
    async fn test_restores_last_state_when_sensor_unknown() {
        let restore = RestoreStateStore::new();
        restore.record(&ha_core::State::new(
            "switch.main_door".parse().unwrap(),
            "on",
            HashMap::new(),
            Context::new(),
        ));
        let hass = HomeAssistant::with_restore(restore);

        let entity = DoorSwitchEntity::new(&hass, config()).unwrap();
        entity.added_to_hass().await.unwrap();

        assert_eq!(entity.is_on(), Some(true));
        assert_eq!(hass.states.get_state("switch.main_door").unwrap(), "on");
        entity.will_remove_from_hass().await;
    }

    #[tokio::test]
    async fn test_restored_unavailable_stays_unavailable() {
        let restore = RestoreStateStore::new();
        restore.record(&ha_core::State::new(
            "switch.main_door".parse().unwrap(),
            "unavailable",
            HashMap::new(),
            Context::new(),
        ));
        let hass = HomeAssistant::with_restore(restore);

        let entity = DoorSwitchEntity::new(&hass, config()).unwrap();
        entity.added_to_hass().await.unwrap();

        assert_eq!(entity.is_on(), None);
        assert_eq!(
            hass.states.get_state("switch.main_door").unwrap(),
            "unavailable"
        );
        entity.will_remove_from_hass().await;
    }
}
