//! JSON wire format spoken between hubs.
//!
//! Domain types carry their own `serde` derives; this module holds the
//! request/response shapes that only exist on the wire, plus the helpers
//! that turn (de)serialization failures into [`BridgeError`]s.

use crate::error::{BridgeError, BridgeResult};
use crate::state::{Attributes, EntityState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/states/{entity_id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StateWrite {
    pub state: String,
    #[serde(default)]
    pub attributes: Attributes,
}

/// Body of `POST /api/event_forwarding`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ForwardRegistration {
    pub host: String,
    pub api_password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Body of `DELETE /api/event_forwarding`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ForwardCancellation {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// One entry of `GET /api/services`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescription {
    pub domain: String,
    pub services: Vec<String>,
}

/// One entry of `GET /api/events`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventListenerCount {
    pub event: String,
    pub listener_count: usize,
}

/// Short `{"message": ...}` body used by the inbound API.
#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

/// Serialize any payload to its JSON text.
pub fn encode<T: Serialize + ?Sized>(payload: &T) -> BridgeResult<String> {
    serde_json::to_string(payload).map_err(|e| BridgeError::Encode(e.to_string()))
}

/// Parse a response body into `T`.
pub fn decode<T: DeserializeOwned>(body: &str) -> BridgeResult<T> {
    serde_json::from_str(body).map_err(|e| BridgeError::Decode(e.to_string()))
}

/// Decode one state object, e.g. the `new_state` of a `state_changed` event.
pub fn decode_state(value: &Value) -> BridgeResult<EntityState> {
    EntityState::deserialize(value).map_err(|e| BridgeError::Decode(e.to_string()))
}

/// Decode the array returned by `GET /api/states`.
pub fn decode_states(body: &str) -> BridgeResult<Vec<EntityState>> {
    decode(body)
}

/// Timestamp format on the wire: `%H:%M:%S %d-%m-%Y`, UTC.
///
/// Decoding also accepts RFC 3339.
pub mod wire_time {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M:%S %d-%m-%Y";

    pub fn to_string(time: &DateTime<Utc>) -> String {
        time.format(FORMAT).to_string()
    }

    pub fn parse(text: &str) -> Option<DateTime<Utc>> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, FORMAT) {
            return Some(Utc.from_utc_datetime(&naive));
        }
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|time| time.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_string(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{}'", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_state_write_shape() {
        let mut attributes = Attributes::new();
        attributes.insert("brightness".to_string(), json!(120));

        let body = encode(&StateWrite {
            state: "on".to_string(),
            attributes,
        })
        .unwrap();

        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value, json!({"state": "on", "attributes": {"brightness": 120}}));
    }

    #[test]
    fn test_decode_state_reads_wire_fields() {
        let state = decode_state(&json!({
            "entity_id": "light.kitchen",
            "state": "on",
            "attributes": {"friendly_name": "Kitchen"},
            "last_changed": "10:30:00 01-02-2015",
            "last_updated": "2015-02-01T10:31:00Z"
        }))
        .unwrap();

        assert_eq!(state.entity_id, "light.kitchen");
        assert_eq!(state.state, "on");
        assert_eq!(state.attributes["friendly_name"], json!("Kitchen"));
        assert_eq!(state.last_changed, Utc.with_ymd_and_hms(2015, 2, 1, 10, 30, 0).unwrap());
        assert_eq!(state.last_updated, Utc.with_ymd_and_hms(2015, 2, 1, 10, 31, 0).unwrap());
    }

    #[test]
    fn test_decode_state_missing_state_fails() {
        let err = decode_state(&json!({"entity_id": "light.kitchen"})).unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));
    }

    #[test]
    fn test_decode_state_rejects_non_object() {
        assert!(matches!(decode_state(&json!("on")), Err(BridgeError::Decode(_))));
        assert!(matches!(decode_state(&Value::Null), Err(BridgeError::Decode(_))));
    }

    #[test]
    fn test_decode_states_malformed_body() {
        assert!(matches!(decode_states("<html>"), Err(BridgeError::Decode(_))));
        assert!(matches!(decode_states(r#"{"state": "on"}"#), Err(BridgeError::Decode(_))));
        assert!(decode_states("[]").unwrap().is_empty());
    }

    #[test]
    fn test_wire_time_round_trip_drops_subseconds() {
        let time = Utc.with_ymd_and_hms(2015, 3, 14, 9, 26, 53).unwrap();
        let text = wire_time::to_string(&time);
        assert_eq!(text, "09:26:53 14-03-2015");
        assert_eq!(wire_time::parse(&text), Some(time));
        assert_eq!(wire_time::parse("yesterday"), None);
    }

    #[test]
    fn test_forward_registration_omits_missing_port() {
        let body = encode(&ForwardRegistration {
            host: "10.0.0.3".to_string(),
            api_password: "pw".to_string(),
            port: None,
        })
        .unwrap();
        assert_eq!(body, r#"{"host":"10.0.0.3","api_password":"pw"}"#);
    }
}
