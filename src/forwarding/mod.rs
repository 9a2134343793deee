//! Fan-out of local events to every registered remote hub.

use crate::bus::{listener, EventBus, ListenerId};
use crate::error::BridgeResult;
use crate::event::{Event, EventOrigin, MATCH_ALL};
use crate::remote::{http_client, ApiStatus, Endpoint, EndpointKey, RemoteApi};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};


/// Forwarding targets plus the bus subscription that feeds them.
#[derive(Default)]
struct Targets {
    apis: HashMap<EndpointKey, RemoteApi>,
    /// Present exactly while `apis` is non-empty
    subscription: Option<ListenerId>,
}

/// Listens on the local bus and replays every qualifying event to all
/// connected hubs.
///
/// The wildcard listener is attached when the first target connects and
/// detached when the last one disconnects. Target changes and the
/// listener's read of the target set share one lock.
pub struct EventForwarder {
    bus: Arc<dyn EventBus>,
    restrict_origin: Option<EventOrigin>,
    http_client: reqwest::Client,
    targets: Arc<Mutex<Targets>>,
}

impl EventForwarder {
    /// With `restrict_origin`, only events of that origin are forwarded.
    pub fn new(bus: Arc<dyn EventBus>, restrict_origin: Option<EventOrigin>) -> BridgeResult<Self> {
        Ok(Self {
            bus,
            restrict_origin,
            http_client: http_client()?,
            targets: Arc::new(Mutex::new(Targets::default())),
        })
    }

    /// Start forwarding to `endpoint`, replacing any target with the same
    /// host and port.
    pub fn connect(&self, endpoint: Endpoint) {
        let mut targets = self.targets.lock().unwrap_or_else(|e| e.into_inner());

        if targets.subscription.is_none() {
            targets.subscription = Some(self.bus.listen(MATCH_ALL, self.listener()));
            debug!("Event forwarding listener attached");
        }

        info!(peer = %endpoint, "Forwarding events");
        let api = RemoteApi::with_client(endpoint, self.http_client.clone());
        targets.apis.insert(api.endpoint().key(), api);
    }

    /// Stop forwarding to the target with `endpoint`'s host and port.
    /// Returns whether such a target was registered.
    pub fn disconnect(&self, endpoint: &Endpoint) -> bool {
        let mut targets = self.targets.lock().unwrap_or_else(|e| e.into_inner());

        let removed = targets.apis.remove(&endpoint.key()).is_some();
        if removed {
            info!(peer = %endpoint, "Stopped forwarding events");
        }

        if targets.apis.is_empty() {
            if let Some(id) = targets.subscription.take() {
                self.bus.remove_listener(MATCH_ALL, id);
                debug!("Event forwarding listener detached");
            }
        }

        removed
    }

    /// Check a prospective target's API before connecting it.
    pub async fn validate_target(&self, endpoint: &Endpoint) -> ApiStatus {
        RemoteApi::with_client(endpoint.clone(), self.http_client.clone())
            .validate_api()
            .await
    }

    /// Endpoints currently receiving events.
    pub fn targets(&self) -> Vec<Endpoint> {
        let targets = self.targets.lock().unwrap_or_else(|e| e.into_inner());
        targets.apis.values().map(|api| api.endpoint().clone()).collect()
    }

    pub fn is_listening(&self) -> bool {
        let targets = self.targets.lock().unwrap_or_else(|e| e.into_inner());
        targets.subscription.is_some()
    }

    fn listener(&self) -> crate::bus::Listener {
        let targets = Arc::clone(&self.targets);
        let restrict_origin = self.restrict_origin;

        listener(move |event: Event| {
            // Snapshot under the lock; the calls themselves run unlocked
            let apis: Vec<RemoteApi> = {
                let targets = targets.lock().unwrap_or_else(|e| e.into_inner());
                if skip_event(&event, restrict_origin) {
                    Vec::new()
                } else {
                    targets.apis.values().cloned().collect()
                }
            };

            async move {
                // One call per target; a failed target does not stop the rest
                join_all(
                    apis.iter()
                        .map(|api| api.fire_event(event.event_type(), event.data())),
                )
                .await;
            }
        })
    }
}

/// Timer ticks are never forwarded, nor events of a restricted-out origin.
fn skip_event(event: &Event, restrict_origin: Option<EventOrigin>) -> bool {
    event.is_time_changed() || restrict_origin.is_some_and(|origin| origin != event.origin())
}
