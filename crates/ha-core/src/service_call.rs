//! Service call type for invoking host services

use crate::{attributes, Context, EntityId};
use serde::{Deserialize, Serialize};

/// A call to a service such as `switch.turn_on`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// The domain the service belongs to (e.g. `switch`, `garage_switch`)
    pub domain: String,

    /// The service name (e.g. `turn_on`, `trigger`)
    pub service: String,

    /// Data passed to the service, usually carrying an `entity_id`
    pub service_data: serde_json::Value,

    pub context: Context,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Full service identifier (`domain.service`)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Get a value from service_data
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Target entity IDs from `entity_id`, accepting a string or a list
    ///
    /// Entries that are not valid entity IDs are skipped.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        match self.service_data.get(attributes::ENTITY_ID) {
            Some(serde_json::Value::String(s)) => s.parse::<EntityId>().into_iter().collect(),
            Some(serde_json::Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| s.parse().ok())
                .collect(),
            _ => vec![],
        }
    }
}
