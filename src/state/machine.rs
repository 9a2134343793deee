use super::entity::{Attributes, EntityState};
use crate::bus::EventBus;
use crate::event::{EventData, EventOrigin, EVENT_STATE_CHANGED};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// State storage contract: reads are local, writes may go elsewhere.
#[async_trait]
pub trait StateMachine: Send + Sync {
    /// Current state of one entity.
    fn get(&self, entity_id: &str) -> Option<EntityState>;

    /// Snapshot of every known state.
    fn all(&self) -> Vec<EntityState>;

    /// Ids of every known entity.
    fn entity_ids(&self) -> Vec<String>;

    fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get(entity_id).is_some_and(|current| current.state == state)
    }

    /// Write a new state. Returns whether the write was accepted.
    async fn set(&self, entity_id: &str, new_state: &str, attributes: Option<Attributes>) -> bool;
}

/// In-process state machine for a hub that owns its entities.
///
/// Every effective change fires `state_changed` with origin `local`, which
/// is what an event forwarder replicates to connected peers.
pub struct LocalStateMachine {
    /// Lock-free concurrent map for fast reads
    states: DashMap<String, EntityState>,

    bus: Arc<dyn EventBus>,
}

impl LocalStateMachine {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            bus,
        }
    }

    /// Apply a write and return the (old, new) pair if anything changed.
    fn apply(
        &self,
        entity_id: &str,
        new_state: &str,
        attributes: Attributes,
    ) -> Option<(Option<EntityState>, EntityState)> {
        match self.states.entry(entity_id.to_string()) {
            Entry::Vacant(vacant) => {
                let state = EntityState::new(entity_id, new_state, attributes);
                vacant.insert(state.clone());
                Some((None, state))
            }
            Entry::Occupied(mut occupied) => {
                let current = occupied.get_mut();
                if current.state == new_state && current.attributes == attributes {
                    return None;
                }

                let old = current.clone();
                let now = Utc::now();
                if current.state != new_state {
                    current.state = new_state.to_string();
                    current.last_changed = now;
                }
                current.attributes = attributes;
                current.last_updated = now;

                Some((Some(old), current.clone()))
            }
        }
    }
}

#[async_trait]
impl StateMachine for LocalStateMachine {
    fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    fn all(&self) -> Vec<EntityState> {
        self.states.iter().map(|s| s.value().clone()).collect()
    }

    fn entity_ids(&self) -> Vec<String> {
        self.states.iter().map(|s| s.key().clone()).collect()
    }

    async fn set(&self, entity_id: &str, new_state: &str, attributes: Option<Attributes>) -> bool {
        let Some((old_state, state)) =
            self.apply(entity_id, new_state, attributes.unwrap_or_default())
        else {
            debug!(entity_id = %entity_id, "State unchanged");
            return true;
        };

        let new_state = match serde_json::to_value(&state) {
            Ok(value) => value,
            Err(e) => {
                error!(entity_id = %entity_id, error = %e, "Failed to encode state");
                return false;
            }
        };
        let old_state = old_state
            .and_then(|old| serde_json::to_value(old).ok())
            .unwrap_or(Value::Null);

        let mut data = EventData::new();
        data.insert("entity_id".to_string(), json!(entity_id));
        data.insert("old_state".to_string(), old_state);
        data.insert("new_state".to_string(), new_state);

        self.bus.fire(EVENT_STATE_CHANGED, data, EventOrigin::Local);
        true
    }
}
