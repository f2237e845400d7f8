//! Door sensor tracking
//!
//! [`StateObserver`] follows a binary sensor and reports only real changes:
//! readings of `unavailable`/`unknown` are dropped and a value equal to the
//! last forwarded one is not reported again.

use ha_core::{EntityId, State, STATE_ON, STATE_UNAVAILABLE, STATE_UNKNOWN};
use ha_event_bus::{track_state_change_with_resync, EventBus, StateChangeListener};
use ha_state_machine::StateMachine;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace, warn};

/// Called with the new door value (`true` = open) on every forwarded change
pub type ChangeCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// A raw binary sensor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorReading {
    On,
    Off,
    Unknown,
}

impl SensorReading {
    /// Only `on` is on; anything that isn't unavailable/unknown is off
    pub fn parse(raw: &str) -> Self {
        match raw {
            STATE_ON => SensorReading::On,
            STATE_UNAVAILABLE | STATE_UNKNOWN => SensorReading::Unknown,
            _ => SensorReading::Off,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SensorReading::On => Some(true),
            SensorReading::Off => Some(false),
            SensorReading::Unknown => None,
        }
    }
}

/// Text shown for a door value
pub fn display_text(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "open",
        Some(false) => "closed",
        None => "unavailable",
    }
}

pub struct StateObserver {
    bus: Arc<EventBus>,
    states: Arc<StateMachine>,
    sensor: EntityId,
    last_forwarded: Arc<Mutex<Option<bool>>>,
    callback: ChangeCallback,
    listener: Mutex<Option<StateChangeListener>>,
}

impl StateObserver {
    pub fn new(
        bus: Arc<EventBus>,
        states: Arc<StateMachine>,
        sensor: EntityId,
        callback: ChangeCallback,
    ) -> Self {
        Self {
            bus,
            states,
            sensor,
            last_forwarded: Arc::new(Mutex::new(None)),
            callback,
            listener: Mutex::new(None),
        }
    }

    pub fn sensor(&self) -> &EntityId {
        &self.sensor
    }

    /// Follow the sensor's changes, then seed from its current state
    ///
    /// The subscription is taken before the seed read, so a change landing
    /// in between is still delivered (and deduplicated if the seed already
    /// saw it). The seed reading goes through the same filter as later
    /// changes, so the callback only runs for a known value. Must be called
    /// from within a Tokio runtime.
    pub fn start(&self) {
        let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if listener.is_some() {
            debug!(sensor = %self.sensor, "Observer already started");
            return;
        }

        let on_change = {
            let sensor = self.sensor.clone();
            let last_forwarded = self.last_forwarded.clone();
            let callback = self.callback.clone();
            move |_old: Option<&State>, new: Option<&State>| {
                // Entity removed
                let Some(new) = new else { return };
                forward(&sensor, &last_forwarded, &callback, new);
            }
        };
        let on_lagged = {
            let sensor = self.sensor.clone();
            let states = self.states.clone();
            let last_forwarded = self.last_forwarded.clone();
            let callback = self.callback.clone();
            move |_skipped: u64| {
                debug!(sensor = %sensor, "Resyncing sensor after missed changes");
                resync(&sensor, &states, &last_forwarded, &callback);
            }
        };
        *listener = Some(track_state_change_with_resync(
            &self.bus,
            [self.sensor.clone()],
            on_change,
            on_lagged,
        ));

        if !resync(&self.sensor, &self.states, &self.last_forwarded, &self.callback) {
            debug!(sensor = %self.sensor, "Sensor has no state yet");
        }

        debug!(sensor = %self.sensor, "Observer started");
    }

    /// Stop following the sensor; safe to call more than once
    pub fn stop(&self) {
        if let Some(mut listener) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.unsubscribe();
            debug!(sensor = %self.sensor, "Observer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The last value passed to the callback
    pub fn current_value(&self) -> Option<bool> {
        *self
            .last_forwarded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn display_text(&self) -> &'static str {
        display_text(self.current_value())
    }
}

impl Drop for StateObserver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Forward the sensor's current state; false if it has none
fn resync(
    sensor: &EntityId,
    states: &StateMachine,
    last_forwarded: &Mutex<Option<bool>>,
    callback: &ChangeCallback,
) -> bool {
    // Read under the lock so a concurrent change can't be forwarded before
    // this older value
    let mut last = last_forwarded.lock().unwrap_or_else(PoisonError::into_inner);
    match states.get(&sensor.to_string()) {
        Some(state) => {
            forward_locked(sensor, &mut last, callback, &state);
            true
        }
        None => false,
    }
}

fn forward(
    sensor: &EntityId,
    last_forwarded: &Mutex<Option<bool>>,
    callback: &ChangeCallback,
    new_state: &State,
) {
    let mut last = last_forwarded.lock().unwrap_or_else(PoisonError::into_inner);
    forward_locked(sensor, &mut last, callback, new_state);
}

/// The lock stays held across the callback so values are reported in the
/// order they were recorded
fn forward_locked(
    sensor: &EntityId,
    last: &mut Option<bool>,
    callback: &ChangeCallback,
    new_state: &State,
) {
    let Some(value) = SensorReading::parse(&new_state.state).as_bool() else {
        warn!(sensor = %sensor, state = %new_state.state, "Ignoring unusable sensor state");
        return;
    };

    if *last == Some(value) {
        trace!(sensor = %sensor, value, "Sensor value unchanged");
        return;
    }
    *last = Some(value);

    debug!(sensor = %sensor, value, "Forwarding sensor change");
    callback(value);
}
