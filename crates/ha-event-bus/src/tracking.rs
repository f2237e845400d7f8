//! State-change tracking for a set of entities
//!
//! [`track_state_change`] is the subscription primitive components use to
//! follow other entities: it filters `state_changed` events down to the
//! requested entity IDs and hands `(old_state, new_state)` to a handler.

use crate::EventBus;
use ha_core::events::StateChangedData;
use ha_core::{EntityId, State};
use std::collections::HashSet;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle to an active state-change subscription
///
/// Dropping the handle unsubscribes as well.
#[derive(Debug)]
pub struct StateChangeListener {
    task: Option<JoinHandle<()>>,
}

impl StateChangeListener {
    /// Stop delivering events to the handler
    ///
    /// Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for StateChangeListener {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Call `handler` for every state change of one of `entity_ids`
///
/// The bus subscription is taken before this function returns, so no change
/// fired afterwards is missed. Events are delivered one at a time, in the
/// order the bus fired them. Must be called from within a Tokio runtime.
pub fn track_state_change<F>(
    bus: &EventBus,
    entity_ids: impl IntoIterator<Item = EntityId>,
    handler: F,
) -> StateChangeListener
where
    F: FnMut(Option<&State>, Option<&State>) + Send + 'static,
{
    track_state_change_with_resync(bus, entity_ids, handler, |skipped| {
        warn!(skipped, "State change listener lagged");
    })
}

/// Like [`track_state_change`], calling `on_lagged` when events were dropped
///
/// The bus channel is shared by every entity, so a burst of unrelated
/// changes can push tracked ones out. `on_lagged` runs on the listener task,
/// in order with `handler`, and should re-read the tracked entities' current
/// state.
pub fn track_state_change_with_resync<F, L>(
    bus: &EventBus,
    entity_ids: impl IntoIterator<Item = EntityId>,
    mut handler: F,
    mut on_lagged: L,
) -> StateChangeListener
where
    F: FnMut(Option<&State>, Option<&State>) + Send + 'static,
    L: FnMut(u64) + Send + 'static,
{
    let tracked: HashSet<EntityId> = entity_ids.into_iter().collect();
    let mut rx = bus.subscribe_typed::<StateChangedData>();

    debug!(entities = ?tracked, "Tracking state changes");

    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let data = event.data;
                    if tracked.contains(&data.entity_id) {
                        handler(data.old_state.as_ref(), data.new_state.as_ref());
                    }
                }
                Err(RecvError::Lagged(n)) => on_lagged(n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    StateChangeListener { task: Some(task) }
}
