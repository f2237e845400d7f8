//! The `switch` entity platform
//!
//! Switch entities are registered with [`SwitchPlatform`], which owns the
//! `switch.turn_on`, `switch.turn_off` and `switch.toggle` services and
//! routes each call to the targeted entities.

use crate::HomeAssistant;
use async_trait::async_trait;
use dashmap::DashMap;
use ha_core::{services, Context, EntityId, EntityIdError, ServiceCall};
use ha_service_registry::ServiceError;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub const DOMAIN: &str = "switch";

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("entity {0} is already registered")]
    AlreadyRegistered(EntityId),

    #[error("invalid switch entity id: {0}")]
    InvalidEntityId(#[from] EntityIdError),

    #[error("{0} is not a switch entity")]
    WrongDomain(EntityId),

    #[error("switch {entity_id} failed: {message}")]
    Failed { entity_id: EntityId, message: String },
}

/// A switch entity
#[async_trait]
pub trait SwitchEntity: Send + Sync {
    fn entity_id(&self) -> &EntityId;

    fn name(&self) -> &str;

    /// `None` while the entity's real state is unknown
    fn is_on(&self) -> Option<bool>;

    async fn turn_on(&self) -> Result<(), SwitchError>;

    async fn turn_off(&self) -> Result<(), SwitchError>;

    async fn toggle(&self) -> Result<(), SwitchError> {
        if self.is_on() == Some(true) {
            self.turn_off().await
        } else {
            self.turn_on().await
        }
    }

    /// Called once the entity is registered
    async fn added_to_hass(&self) -> Result<(), SwitchError> {
        Ok(())
    }

    /// Called before the entity is removed
    async fn will_remove_from_hass(&self) {}
}

type EntityMap = Arc<DashMap<String, Arc<dyn SwitchEntity>>>;

pub struct SwitchPlatform {
    hass: HomeAssistant,
    entities: EntityMap,
}

impl SwitchPlatform {
    /// Create the platform and register the switch services
    pub fn setup(hass: &HomeAssistant) -> Arc<Self> {
        let entities: EntityMap = Arc::new(DashMap::new());

        for service in [services::TURN_ON, services::TURN_OFF, services::TOGGLE] {
            let entities = entities.clone();
            hass.services
                .register(DOMAIN, service, move |call: ServiceCall| {
                    let entities = entities.clone();
                    async move { dispatch(&entities, call).await }
                });
        }

        info!("Switch platform set up");

        Arc::new(Self {
            hass: hass.clone(),
            entities,
        })
    }

    /// Register entities and call their `added_to_hass`
    ///
    /// All or nothing: every entity id is checked before any entity is
    /// attached, and if one fails to attach the ones already added are
    /// removed again.
    #[instrument(skip_all, fields(count = entities.len()))]
    pub async fn add_entities(
        &self,
        entities: Vec<Arc<dyn SwitchEntity>>,
    ) -> Result<(), SwitchError> {
        let mut seen = HashSet::new();
        for entity in &entities {
            let entity_id = entity.entity_id();
            if !entity_id.in_domain(DOMAIN) {
                return Err(SwitchError::WrongDomain(entity_id.clone()));
            }
            if self.entities.contains_key(&entity_id.to_string()) || !seen.insert(entity_id) {
                return Err(SwitchError::AlreadyRegistered(entity_id.clone()));
            }
        }

        let mut attached: Vec<EntityId> = Vec::with_capacity(entities.len());
        for entity in &entities {
            let entity_id = entity.entity_id().clone();
            self.entities.insert(entity_id.to_string(), entity.clone());
            attached.push(entity_id.clone());

            if let Err(err) = entity.added_to_hass().await {
                warn!(entity_id = %entity_id, %err, "Failed to add switch entity, rolling back");
                for entity_id in attached.iter().rev() {
                    self.remove_entity(entity_id).await;
                }
                return Err(err);
            }
            debug!(entity_id = %entity_id, "Added switch entity");
        }
        Ok(())
    }

    /// Detach an entity and drop its state
    pub async fn remove_entity(&self, entity_id: &EntityId) -> bool {
        let Some((_, entity)) = self.entities.remove(&entity_id.to_string()) else {
            return false;
        };

        entity.will_remove_from_hass().await;
        self.hass.states.remove(entity_id, Context::new());
        debug!(entity_id = %entity_id, "Removed switch entity");
        true
    }

    pub async fn remove_all(&self) {
        let ids: Vec<EntityId> = self
            .entities
            .iter()
            .map(|e| e.value().entity_id().clone())
            .collect();
        for entity_id in ids {
            self.remove_entity(&entity_id).await;
        }
    }

    pub fn entity(&self, entity_id: &str) -> Option<Arc<dyn SwitchEntity>> {
        self.entities.get(entity_id).map(|e| e.value().clone())
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

async fn dispatch(
    entities: &DashMap<String, Arc<dyn SwitchEntity>>,
    call: ServiceCall,
) -> Result<Option<serde_json::Value>, ServiceError> {
    for entity_id in call.entity_ids() {
        // Clone out of the map so no shard lock is held across the await
        let entity = entities
            .get(&entity_id.to_string())
            .map(|e| e.value().clone());
        let Some(entity) = entity else {
            warn!(entity_id = %entity_id, service = %call.service, "No such switch entity");
            continue;
        };

        let result = match call.service.as_str() {
            services::TURN_ON => entity.turn_on().await,
            services::TURN_OFF => entity.turn_off().await,
            services::TOGGLE => entity.toggle().await,
            other => {
                return Err(ServiceError::InvalidData(format!(
                    "unsupported switch service {other}"
                )))
            }
        };

        result.map_err(|err| ServiceError::CallFailed(err.to_string()))?;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeSwitch {
        entity_id: EntityId,
        state: Mutex<Option<bool>>,
        calls: Mutex<Vec<&'static str>>,
        fail_add: bool,
    }

    impl FakeSwitch {
        fn new(entity_id: &str) -> Arc<Self> {
            Self::build(entity_id, false)
        }

        fn failing(entity_id: &str) -> Arc<Self> {
            Self::build(entity_id, true)
        }

        fn build(entity_id: &str, fail_add: bool) -> Arc<Self> {
            Arc::new(Self {
                entity_id: entity_id.parse().unwrap(),
                state: Mutex::new(Some(false)),
                calls: Mutex::new(Vec::new()),
                fail_add,
            })
        }
    }

    #[async_trait]
    impl SwitchEntity for FakeSwitch {
        fn entity_id(&self) -> &EntityId {
            &self.entity_id
        }

        fn name(&self) -> &str {
            "Fake"
        }

        fn is_on(&self) -> Option<bool> {
            *self.state.lock().unwrap()
        }

        async fn turn_on(&self) -> Result<(), SwitchError> {
            self.calls.lock().unwrap().push("on");
            *self.state.lock().unwrap() = Some(true);
            Ok(())
        }

        async fn turn_off(&self) -> Result<(), SwitchError> {
            self.calls.lock().unwrap().push("off");
            *self.state.lock().unwrap() = Some(false);
            Ok(())
        }

        async fn added_to_hass(&self) -> Result<(), SwitchError> {
            if self.fail_add {
                return Err(SwitchError::Failed {
                    entity_id: self.entity_id.clone(),
                    message: "not ready".to_string(),
                });
            }
            self.calls.lock().unwrap().push("added");
            Ok(())
        }

        async fn will_remove_from_hass(&self) {
            self.calls.lock().unwrap().push("removed");
        }
    }

    #[tokio::test]
    async fn test_services_dispatch_by_entity_id() {
        let hass = HomeAssistant::new();
        let platform = SwitchPlatform::setup(&hass);
        let one = FakeSwitch::new("switch.one");
        let two = FakeSwitch::new("switch.two");
        platform
            .add_entities(vec![one.clone() as Arc<dyn SwitchEntity>, two.clone()])
            .await
            .unwrap();

        let call = |service: &'static str, target: serde_json::Value| {
            let services = hass.services.clone();
            async move {
                services
                    .call(DOMAIN, service, json!({ "entity_id": target }), Context::new(), false)
                    .await
            }
        };

        call("turn_on", json!("switch.one")).await.unwrap();
        call("toggle", json!(["switch.one", "switch.two"])).await.unwrap();
        call("turn_off", json!("switch.missing")).await.unwrap();

        assert_eq!(*one.calls.lock().unwrap(), vec!["added", "on", "off"]);
        assert_eq!(*two.calls.lock().unwrap(), vec!["added", "on"]);
    }

    #[tokio::test]
    async fn test_add_rejects_duplicates_and_other_domains() {
        let hass = HomeAssistant::new();
        let platform = SwitchPlatform::setup(&hass);

        platform
            .add_entities(vec![FakeSwitch::new("switch.one") as Arc<dyn SwitchEntity>])
            .await
            .unwrap();

        let result = platform
            .add_entities(vec![FakeSwitch::new("switch.one") as Arc<dyn SwitchEntity>])
            .await;
        assert!(matches!(result, Err(SwitchError::AlreadyRegistered(_))));

        let result = platform
            .add_entities(vec![FakeSwitch::new("light.one") as Arc<dyn SwitchEntity>])
            .await;
        assert!(matches!(result, Err(SwitchError::WrongDomain(_))));
        assert_eq!(platform.entity_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_entity() {
        let hass = HomeAssistant::new();
        let platform = SwitchPlatform::setup(&hass);
        platform
            .add_entities(vec![
                FakeSwitch::new("switch.one") as Arc<dyn SwitchEntity>,
                FakeSwitch::new("switch.two"),
            ])
            .await
            .unwrap();

        let one: EntityId = "switch.one".parse().unwrap();
        assert!(platform.remove_entity(&one).await);
        assert!(!platform.remove_entity(&one).await);
        assert!(platform.entity("switch.one").is_none());

        platform.remove_all().await;
        assert_eq!(platform.entity_count(), 0);
    }

    #[tokio::test]
    async fn test_add_checks_every_id_before_attaching() {
        let hass = HomeAssistant::new();
        let platform = SwitchPlatform::setup(&hass);
        platform
            .add_entities(vec![FakeSwitch::new("switch.relay1") as Arc<dyn SwitchEntity>])
            .await
            .unwrap();

        let first = FakeSwitch::new("switch.main_door");
        let result = platform
            .add_entities(vec![
                first.clone() as Arc<dyn SwitchEntity>,
                FakeSwitch::new("switch.relay1"),
            ])
            .await;
        assert!(matches!(result, Err(SwitchError::AlreadyRegistered(_))));
        assert_eq!(platform.entity_count(), 1);
        assert!(first.calls.lock().unwrap().is_empty());

        let result = platform
            .add_entities(vec![
                FakeSwitch::new("switch.twin") as Arc<dyn SwitchEntity>,
                FakeSwitch::new("switch.twin"),
            ])
            .await;
        assert!(matches!(result, Err(SwitchError::AlreadyRegistered(_))));
        assert_eq!(platform.entity_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_attach_rolls_back_earlier_entities() {
        let hass = HomeAssistant::new();
        let platform = SwitchPlatform::setup(&hass);
        let first = FakeSwitch::new("switch.one");

        let result = platform
            .add_entities(vec![
                first.clone() as Arc<dyn SwitchEntity>,
                FakeSwitch::failing("switch.two"),
            ])
            .await;

        assert!(matches!(result, Err(SwitchError::Failed { .. })));
        assert_eq!(platform.entity_count(), 0);
        assert_eq!(*first.calls.lock().unwrap(), vec!["added", "removed"]);
    }
}
