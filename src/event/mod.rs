use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;


/// Topic that matches every event type.
pub const MATCH_ALL: &str = "*";

/// Fired by the timer; never forwarded to another hub.
pub const EVENT_TIME_CHANGED: &str = "time_changed";

/// Fired whenever an entity's state changes.
pub const EVENT_STATE_CHANGED: &str = "state_changed";

/// Fired when an instance starts.
pub const EVENT_HUB_START: &str = "homeassistant_start";

/// Fired when an instance stops.
pub const EVENT_HUB_STOP: &str = "homeassistant_stop";

/// Event payload: a JSON object of arbitrary structured values.
pub type EventData = Map<String, Value>;

/// Where an event was created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOrigin {
    /// Created on this hub.
    Local,
    /// Received from a peer.
    Remote,
}

impl fmt::Display for EventOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventOrigin::Local => write!(f, "LOCAL"),
            EventOrigin::Remote => write!(f, "REMOTE"),
        }
    }
}

/// Event represents a typed occurrence dispatched on an event bus.
///
/// Fields are read-only after construction; in particular the origin is
/// fixed when the event is created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    event_type: String,

    #[serde(default)]
    data: EventData,

    origin: EventOrigin,

    /// Time the event was created on this hub
    #[serde(default = "Utc::now")]
    time_fired: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, data: EventData, origin: EventOrigin) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            origin,
            time_fired: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn data(&self) -> &EventData {
        &self.data
    }

    pub fn origin(&self) -> EventOrigin {
        self.origin
    }

    pub fn time_fired(&self) -> DateTime<Utc> {
        self.time_fired
    }

    /// True for the timer tick, which never crosses the network.
    pub fn is_time_changed(&self) -> bool {
        self.event_type == EVENT_TIME_CHANGED
    }

    /// Whether a forwarding bus should send this event upstream instead of
    /// dispatching it locally.
    pub fn should_forward(&self) -> bool {
        self.origin == EventOrigin::Local && !self.is_time_changed()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Event {}[{}]>", self.event_type, self.origin)
    }
}
