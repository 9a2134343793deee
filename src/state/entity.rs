use crate::remote::codec::wire_time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form entity attributes.
pub type Attributes = Map<String, Value>;

/// One observed state of an entity (e.g. "light.kitchen" is "on")
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Unique entity identifier within one hub
    pub entity_id: String,

    /// Current state value
    pub state: String,

    #[serde(default)]
    pub attributes: Attributes,

    /// When the state value last changed
    #[serde(with = "wire_time", default = "Utc::now")]
    pub last_changed: DateTime<Utc>,

    /// When the state or its attributes were last written
    #[serde(with = "wire_time", default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>, attributes: Attributes) -> Self {
        let now = Utc::now();
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
        }
    }

    /// Domain part of the entity id ("light" for "light.kitchen").
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or(self.entity_id.as_str(), |(domain, _)| domain)
    }
}
