use ha_event_bus::EventBus;
use ha_service_registry::ServiceRegistry;
use ha_state_machine::{RestoreStateStore, StateMachine};
use std::sync::Arc;

/// Handles to the running host, shared by every component
#[derive(Clone)]
pub struct HomeAssistant {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateMachine>,
    pub services: Arc<ServiceRegistry>,
    /// Last known entity states from the previous run
    pub restore: Arc<RestoreStateStore>,
}

impl HomeAssistant {
    pub fn new() -> Self {
        Self::with_restore(RestoreStateStore::new())
    }

    pub fn with_restore(restore: RestoreStateStore) -> Self {
        let bus = Arc::new(EventBus::new());
        Self {
            states: Arc::new(StateMachine::new(bus.clone())),
            services: Arc::new(ServiceRegistry::new()),
            restore: Arc::new(restore),
            bus,
        }
    }
}

impl Default for HomeAssistant {
    fn default() -> Self {
        Self::new()
    }
}
