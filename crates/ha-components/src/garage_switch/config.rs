//! `garage_switch:` configuration entries
//!
//! ```yaml
//! garage_switch:
//!   - name: Main Door
//!     trigger_switch: switch.relay1
//!     state_sensor: binary_sensor.door1
//!     momentary_duration: 1.0   # seconds, 0.1 - 60
//!     mode: momentary           # or fire_once
//! ```

use super::pulse::PulseMode;
use ha_core::{slugify, EntityId, EntityIdError};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::time::Duration;
use thiserror::Error;

/// Hold time used when `momentary_duration` is not given
pub const DEFAULT_MOMENTARY_DURATION: f64 = 1.0;

/// Accepted `momentary_duration` values, in seconds
pub const MOMENTARY_DURATION_RANGE: RangeInclusive<f64> = 0.1..=60.0;

#[derive(Debug, Error)]
pub enum GarageSwitchConfigError {
    #[error("missing required option '{0}'")]
    MissingField(&'static str),

    #[error("name '{0}' has no usable characters for an entity id")]
    InvalidName(String),

    #[error("invalid entity id for '{field}': {source}")]
    InvalidEntityId {
        field: &'static str,
        #[source]
        source: EntityIdError,
    },

    #[error("'{field}' must be a {expected} entity, got {entity_id}")]
    WrongDomain {
        field: &'static str,
        expected: &'static str,
        entity_id: EntityId,
    },

    #[error("trigger_switch {0} is the garage switch's own entity")]
    TriggerIsSelf(EntityId),

    #[error("momentary_duration {0} is outside 0.1..=60 seconds")]
    DurationOutOfRange(f64),

    #[error("duplicate garage switch name '{0}'")]
    DuplicateName(String),

    #[error("invalid garage_switch entry: {0}")]
    Invalid(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeOption {
    #[default]
    Momentary,
    FireOnce,
}

/// Entry as written in YAML, before validation
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    name: Option<String>,
    trigger_switch: Option<String>,
    state_sensor: Option<String>,
    momentary_duration: Option<f64>,
    #[serde(default)]
    mode: ModeOption,
}

/// One validated garage door
#[derive(Debug, Clone, PartialEq)]
pub struct GarageSwitchConfig {
    pub name: String,
    pub trigger_switch: EntityId,
    pub state_sensor: EntityId,
    pub mode: PulseMode,
}

impl GarageSwitchConfig {
    pub fn from_value(value: &Value) -> Result<Self, GarageSwitchConfigError> {
        let raw: RawConfig = serde_yaml::from_value(value.clone())?;

        let name = raw
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or(GarageSwitchConfigError::MissingField("name"))?;
        if slugify(&name).is_empty() {
            return Err(GarageSwitchConfigError::InvalidName(name));
        }

        let trigger_switch = entity_id("trigger_switch", raw.trigger_switch)?;
        if !trigger_switch.in_domain("switch") {
            return Err(GarageSwitchConfigError::WrongDomain {
                field: "trigger_switch",
                expected: "switch",
                entity_id: trigger_switch,
            });
        }
        // The door registers itself as `switch.<slug(name)>`
        if trigger_switch.object_id() == slugify(&name) {
            return Err(GarageSwitchConfigError::TriggerIsSelf(trigger_switch));
        }
        let state_sensor = entity_id("state_sensor", raw.state_sensor)?;

        let seconds = raw.momentary_duration.unwrap_or(DEFAULT_MOMENTARY_DURATION);
        if !MOMENTARY_DURATION_RANGE.contains(&seconds) {
            return Err(GarageSwitchConfigError::DurationOutOfRange(seconds));
        }

        let mode = match raw.mode {
            ModeOption::Momentary => PulseMode::Momentary {
                hold: Duration::from_secs_f64(seconds),
            },
            ModeOption::FireOnce => PulseMode::FireOnce,
        };

        Ok(Self {
            name,
            trigger_switch,
            state_sensor,
            mode,
        })
    }

    /// Validate every entry; names must be unique once slugified
    pub fn from_list(values: &[Value]) -> Result<Vec<Self>, GarageSwitchConfigError> {
        let mut seen = HashSet::new();
        values
            .iter()
            .map(|value| {
                let config = Self::from_value(value)?;
                if !seen.insert(config.slug()) {
                    return Err(GarageSwitchConfigError::DuplicateName(config.name));
                }
                Ok(config)
            })
            .collect()
    }

    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Hold time in seconds, `None` for fire-once
    pub fn momentary_duration(&self) -> Option<f64> {
        self.mode.hold().map(|d| d.as_secs_f64())
    }
}

fn entity_id(
    field: &'static str,
    value: Option<String>,
) -> Result<EntityId, GarageSwitchConfigError> {
    value
        .ok_or(GarageSwitchConfigError::MissingField(field))?
        .trim()
        .parse()
        .map_err(|source| GarageSwitchConfigError::InvalidEntityId { field, source })
}
