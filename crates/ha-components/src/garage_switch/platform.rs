//! Setup and teardown of the configured garage doors

use super::config::{GarageSwitchConfig, GarageSwitchConfigError};
use super::entity::DoorSwitchEntity;
use super::DOMAIN;
use crate::switch::{self, SwitchEntity, SwitchError, SwitchPlatform};
use crate::HomeAssistant;
use ha_config::Configuration;
use ha_core::{attributes, services, ServiceCall};
use ha_service_registry::ServiceError;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// `garage_switch.trigger`: pulse a garage switch by entity id
pub const SERVICE_TRIGGER: &str = "trigger";

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] GarageSwitchConfigError),

    #[error(transparent)]
    Switch(#[from] SwitchError),
}

/// The running integration: validated entries and the entities built from them
pub struct GarageSwitchPlatform {
    hass: HomeAssistant,
    switches: Arc<SwitchPlatform>,
    configs: Vec<GarageSwitchConfig>,
    entities: Vec<Arc<DoorSwitchEntity>>,
}

impl GarageSwitchPlatform {
    /// Set up every `garage_switch:` entry in `config`
    ///
    /// An invalid entry fails the whole setup before any entity is created.
    #[instrument(skip_all)]
    pub async fn async_setup(
        hass: &HomeAssistant,
        switches: &Arc<SwitchPlatform>,
        config: &Configuration,
    ) -> Result<Self, SetupError> {
        let configs = GarageSwitchConfig::from_list(&config.component_list(DOMAIN))?;
        Self::setup_entries(hass, switches, configs).await
    }

    pub async fn setup_entries(
        hass: &HomeAssistant,
        switches: &Arc<SwitchPlatform>,
        configs: Vec<GarageSwitchConfig>,
    ) -> Result<Self, SetupError> {
        let entities = configs
            .iter()
            .map(|c| DoorSwitchEntity::new(hass, c.clone()).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        switches
            .add_entities(
                entities
                    .iter()
                    .map(|e| e.clone() as Arc<dyn SwitchEntity>)
                    .collect(),
            )
            .await?;

        register_trigger_service(hass);

        info!(count = entities.len(), "Garage switches set up");

        Ok(Self {
            hass: hass.clone(),
            switches: switches.clone(),
            configs,
            entities,
        })
    }

    pub fn configs(&self) -> &[GarageSwitchConfig] {
        &self.configs
    }

    pub fn entities(&self) -> &[Arc<DoorSwitchEntity>] {
        &self.entities
    }

    pub fn entity(&self, entity_id: &str) -> Option<&Arc<DoorSwitchEntity>> {
        self.entities
            .iter()
            .find(|e| e.entity_id().to_string() == entity_id)
    }

    /// Remove every entity and the integration's service
    pub async fn async_unload(self) {
        for entity in &self.entities {
            self.switches.remove_entity(entity.entity_id()).await;
        }
        self.hass.services.unregister(DOMAIN, SERVICE_TRIGGER);
        info!(count = self.entities.len(), "Garage switches unloaded");
    }
}

fn register_trigger_service(hass: &HomeAssistant) {
    let states = hass.states.clone();
    let registry = hass.services.clone();

    hass.services
        .register(DOMAIN, SERVICE_TRIGGER, move |call: ServiceCall| {
            let states = states.clone();
            let registry = registry.clone();
            async move {
                let Some(entity_id) = call.get::<String>(attributes::ENTITY_ID) else {
                    return Err(ServiceError::InvalidData(
                        "entity_id is required".to_string(),
                    ));
                };

                if !states.contains(&entity_id) {
                    warn!(entity_id = %entity_id, "Trigger for unknown garage switch");
                    return Ok(None);
                }

                registry
                    .call(
                        switch::DOMAIN,
                        services::TURN_ON,
                        json!({ "entity_id": entity_id }),
                        call.context.child(),
                        false,
                    )
                    .await
            }
        });
}
