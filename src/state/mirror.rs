use super::entity::{Attributes, EntityState};
use super::machine::StateMachine;
use crate::bus::{listener, EventBus};
use crate::event::{Event, EVENT_STATE_CHANGED};
use crate::remote::{codec, RemoteApi};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

type Cache = Arc<RwLock<HashMap<String, EntityState>>>;

/// Read-only mirror of a remote hub's states.
///
/// Built from a full snapshot, then patched by every `state_changed` event
/// that reaches the local bus. Writes go to the remote hub and only show up
/// here once the remote's `state_changed` comes back.
pub struct StateMirror {
    api: RemoteApi,
    cache: Cache,
}

impl StateMirror {
    /// Take the initial snapshot, then start applying `state_changed` events.
    pub async fn new(bus: &dyn EventBus, api: RemoteApi) -> Self {
        let mirror = Self {
            api,
            cache: Arc::new(RwLock::new(HashMap::new())),
        };

        mirror.mirror().await;

        let cache = Arc::clone(&mirror.cache);
        bus.listen(
            EVENT_STATE_CHANGED,
            listener(move |event| {
                let cache = Arc::clone(&cache);
                async move { apply_state_changed(&cache, &event) }
            }),
        );

        mirror
    }

    /// Discard the cache and replace it with the remote's current states.
    ///
    /// The new map is built first and swapped in under one write lock, so
    /// readers see either the old or the new snapshot. Returns the number of
    /// mirrored entities.
    pub async fn mirror(&self) -> usize {
        let snapshot: HashMap<String, EntityState> = self
            .api
            .get_states()
            .await
            .into_iter()
            .map(|state| (state.entity_id.clone(), state))
            .collect();

        let count = snapshot.len();
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = snapshot;

        info!(entities = count, remote = %self.api.endpoint(), "Mirrored remote states");
        count
    }

    pub fn remote(&self) -> &RemoteApi {
        &self.api
    }
}

/// Overwrite the cached state named by a `state_changed` event.
///
/// Last write wins: no ordering or version check against the cache.
pub(crate) fn apply_state_changed(cache: &RwLock<HashMap<String, EntityState>>, event: &Event) {
    let Some(entity_id) = event.data().get("entity_id").and_then(Value::as_str) else {
        warn!(event = %event, "state_changed without entity_id, skipping");
        return;
    };

    let Some(new_state) = event.data().get("new_state") else {
        warn!(entity_id = %entity_id, "state_changed without new_state, skipping");
        return;
    };

    // Null new_state: the entity was removed upstream
    if new_state.is_null() {
        cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(entity_id);
        return;
    }

    match codec::decode_state(new_state) {
        Ok(state) => {
            cache
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(entity_id.to_string(), state);
        }
        Err(e) => {
            warn!(entity_id = %entity_id, error = %e, "Undecodable new_state, skipping");
        }
    }
}

#[async_trait]
impl StateMachine for StateMirror {
    fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(entity_id)
            .cloned()
    }

    fn all(&self) -> Vec<EntityState> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    fn entity_ids(&self) -> Vec<String> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Forward the write to the remote hub; the cache is left alone.
    async fn set(&self, entity_id: &str, new_state: &str, attributes: Option<Attributes>) -> bool {
        self.api
            .set_state(entity_id, new_state, attributes.as_ref())
            .await
    }
}
