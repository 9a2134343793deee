use super::{EventBus, Listener, ListenerId};
use crate::event::{Event, EventData, EventOrigin, MATCH_ALL};
use crate::pool::WorkerPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

/// In-process event bus. Listener callbacks run on the worker pool so
/// firing never waits for them.
pub struct LocalEventBus {
    /// Listeners per event type, in subscription order
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
    pool: WorkerPool,
}

impl LocalEventBus {
    pub fn new(pool: WorkerPool) -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            pool,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Dispatch an already-built event to its listeners.
    ///
    /// Wildcard listeners are scheduled before type-specific ones; within
    /// each group, in subscription order.
    pub fn dispatch(&self, event: Event) {
        let targets: Vec<Listener> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners
                .get(MATCH_ALL)
                .into_iter()
                .chain(listeners.get(event.event_type()))
                .flatten()
                .map(|(_, listener)| listener.clone())
                .collect()
        };

        if targets.is_empty() {
            return;
        }

        if !event.is_time_changed() {
            info!(event = %event, listeners = targets.len(), "Bus handling event");
        }

        for listener in targets {
            self.pool.submit(listener(event.clone()));
        }
    }
}

impl EventBus for LocalEventBus {
    fn fire(&self, event_type: &str, data: EventData, origin: EventOrigin) {
        self.dispatch(Event::new(event_type, data, origin));
    }

    fn listen(&self, event_type: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners
            .entry(event_type.to_string())
            .or_default()
            .push((id, listener));

        debug!(event_type = %event_type, listener = id.0, "Listener attached");
        id
    }

    fn remove_listener(&self, event_type: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());

        let Some(registered) = listeners.get_mut(event_type) else {
            return false;
        };

        let before = registered.len();
        registered.retain(|(existing, _)| *existing != id);
        let removed = registered.len() != before;

        if registered.is_empty() {
            listeners.remove(event_type);
        }

        if removed {
            debug!(event_type = %event_type, listener = id.0, "Listener detached");
        }
        removed
    }

    fn listeners(&self) -> HashMap<String, usize> {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners
            .iter()
            .map(|(event_type, registered)| (event_type.clone(), registered.len()))
            .collect()
    }
}
