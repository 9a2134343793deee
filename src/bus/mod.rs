// Event buses: local dispatch and upstream forwarding

mod forwarding;
mod local;

pub use forwarding::ForwardingEventBus;
pub use local::LocalEventBus;

use crate::event::{Event, EventData, EventOrigin};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;


/// Callback invoked on a pool worker for every matching event.
pub type Listener = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle returned by [`EventBus::listen`], used to detach the listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Wrap an async closure as a [`Listener`].
pub fn listener<F, Fut>(f: F) -> Listener
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Publish/subscribe contract shared by the local bus and the forwarding
/// adapter, so either can be handed to components that only need a bus.
pub trait EventBus: Send + Sync {
    /// Fire an event. Never blocks on listeners.
    fn fire(&self, event_type: &str, data: EventData, origin: EventOrigin);

    /// Subscribe to one event type, or to every type via `MATCH_ALL`.
    fn listen(&self, event_type: &str, listener: Listener) -> ListenerId;

    /// Detach a listener. Returns whether it was registered.
    fn remove_listener(&self, event_type: &str, id: ListenerId) -> bool;

    /// Number of listeners per event type.
    fn listeners(&self) -> HashMap<String, usize>;
}
