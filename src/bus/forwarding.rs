use super::{EventBus, Listener, ListenerId, LocalEventBus};
use crate::event::{Event, EventData, EventOrigin};
use crate::pool::WorkerPool;
use crate::remote::RemoteApi;
use std::collections::HashMap;
use tracing::debug;

/// Event bus for an instance that mirrors an upstream hub.
///
/// Locally created events (other than `time_changed`) are sent to the
/// upstream hub instead of being dispatched here; they come back through
/// the upstream's event forwarding with origin `remote`. Everything else
/// is dispatched locally.
pub struct ForwardingEventBus {
    local: LocalEventBus,
    api: RemoteApi,
}

impl ForwardingEventBus {
    pub fn new(api: RemoteApi, pool: WorkerPool) -> Self {
        Self {
            local: LocalEventBus::new(pool),
            api,
        }
    }

    pub fn remote(&self) -> &RemoteApi {
        &self.api
    }

    pub fn pool(&self) -> &WorkerPool {
        self.local.pool()
    }
}

impl EventBus for ForwardingEventBus {
    fn fire(&self, event_type: &str, data: EventData, origin: EventOrigin) {
        let event = Event::new(event_type, data, origin);

        if !event.should_forward() {
            self.local.dispatch(event);
            return;
        }

        debug!(event = %event, remote = %self.api.endpoint(), "Forwarding event upstream");
        let api = self.api.clone();
        self.local.pool().submit(async move {
            api.fire_event(event.event_type(), event.data()).await;
        });
    }

    fn listen(&self, event_type: &str, listener: Listener) -> ListenerId {
        self.local.listen(event_type, listener)
    }

    fn remove_listener(&self, event_type: &str, id: ListenerId) -> bool {
        self.local.remove_listener(event_type, id)
    }

    fn listeners(&self) -> HashMap<String, usize> {
        self.local.listeners()
    }
}
