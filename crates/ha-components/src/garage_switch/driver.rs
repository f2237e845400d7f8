//! Output drivers the pulse actuator switches on and off

use super::pulse::PulseError;
use crate::switch;
use async_trait::async_trait;
use ha_core::{services, Context, EntityId};
use ha_service_registry::ServiceRegistry;
use ha_state_machine::StateMachine;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default time a single relay service call may take
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can switch a named output on and off
#[async_trait]
pub trait ActuatorDriver: Send + Sync {
    async fn activate(&self, target: &EntityId) -> Result<(), PulseError>;

    async fn deactivate(&self, target: &EntityId) -> Result<(), PulseError>;
}

/// Drives a relay through the host's `switch.turn_on` / `switch.turn_off`
pub struct ServiceCallDriver {
    states: Arc<StateMachine>,
    services: Arc<ServiceRegistry>,
    timeout: Duration,
    context: Context,
}

impl ServiceCallDriver {
    pub fn new(states: Arc<StateMachine>, services: Arc<ServiceRegistry>) -> Self {
        Self {
            states,
            services,
            timeout: DEFAULT_CALL_TIMEOUT,
            context: Context::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn switch(&self, target: &EntityId, service: &str) -> Result<(), PulseError> {
        // The relay has to be known to the host before it can be driven
        if !self.states.contains(&target.to_string()) {
            return Err(PulseError::UnknownTarget(target.clone()));
        }

        debug!(target = %target, service, "Calling relay service");

        self.services
            .call_with_timeout(
                switch::DOMAIN,
                service,
                json!({ "entity_id": target.to_string() }),
                self.context.child(),
                self.timeout,
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ActuatorDriver for ServiceCallDriver {
    async fn activate(&self, target: &EntityId) -> Result<(), PulseError> {
        self.switch(target, services::TURN_ON).await
    }

    async fn deactivate(&self, target: &EntityId) -> Result<(), PulseError> {
        self.switch(target, services::TURN_OFF).await
    }
}
