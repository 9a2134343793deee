// Remote API operations. Read helpers degrade to empty results, write
// helpers report success as a bool; failures are logged, never raised.

use super::client::{ApiStatus, RemoteApi};
use super::codec::{
    self, EventListenerCount, ForwardCancellation, ForwardRegistration, ServiceDescription,
    StateWrite,
};
use super::endpoint::Endpoint;
use crate::event::EventData;
use crate::state::{Attributes, EntityState};
use reqwest::{Method, StatusCode};
use tracing::error;
use urlencoding::encode;

pub const URL_API: &str = "/api";
pub const URL_API_STATES: &str = "/api/states";
pub const URL_API_EVENTS: &str = "/api/events";
pub const URL_API_SERVICES: &str = "/api/services";
pub const URL_API_EVENT_FORWARD: &str = "/api/event_forwarding";

pub fn url_state(entity_id: &str) -> String {
    format!("{}/{}", URL_API_STATES, encode(entity_id))
}

pub fn url_event(event_type: &str) -> String {
    format!("{}/{}", URL_API_EVENTS, encode(event_type))
}

pub fn url_service(domain: &str, service: &str) -> String {
    format!("{}/{}/{}", URL_API_SERVICES, encode(domain), encode(service))
}

impl RemoteApi {
    /// Check `GET /api`.
    pub async fn validate_api(&self) -> ApiStatus {
        match self.get(URL_API).await {
            Ok(response) if response.status == StatusCode::OK => ApiStatus::Ok,
            Ok(response) if response.status == StatusCode::UNAUTHORIZED => {
                ApiStatus::InvalidPassword
            }
            Ok(_) => ApiStatus::Unknown,
            Err(_) => ApiStatus::CannotConnect,
        }
    }

    /// Ask this remote to forward all its events to `to`.
    pub async fn connect_remote_events(&self, to: &Endpoint) -> bool {
        let registration = ForwardRegistration {
            host: to.host.clone(),
            api_password: to.api_password.clone(),
            port: Some(to.port),
        };

        match self
            .call(Method::POST, URL_API_EVENT_FORWARD, Some(&registration))
            .await
        {
            Ok(response) if response.status == StatusCode::OK => true,
            Ok(response) => {
                error!(
                    status = %response.status,
                    body = %response.body,
                    "Error setting up event forwarding"
                );
                false
            }
            Err(e) => {
                error!(error = %e, "Error setting up event forwarding");
                false
            }
        }
    }

    /// Stop this remote from forwarding events to `to`.
    pub async fn disconnect_remote_events(&self, to: &Endpoint) -> bool {
        let cancellation = ForwardCancellation {
            host: to.host.clone(),
            port: Some(to.port),
        };

        match self
            .call(Method::DELETE, URL_API_EVENT_FORWARD, Some(&cancellation))
            .await
        {
            Ok(response) if response.status == StatusCode::OK => true,
            Ok(response) => {
                error!(
                    status = %response.status,
                    body = %response.body,
                    "Error removing event forwarding"
                );
                false
            }
            Err(e) => {
                error!(error = %e, "Error removing an event forwarder");
                false
            }
        }
    }

    /// Event types the remote is listening for.
    pub async fn get_event_listeners(&self) -> Vec<EventListenerCount> {
        match self.get(URL_API_EVENTS).await {
            Ok(response) if response.status == StatusCode::OK => {
                response.json().unwrap_or_else(|e| {
                    error!(error = %e, "Unexpected result retrieving event listeners");
                    Vec::new()
                })
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                error!(error = %e, "Unexpected result retrieving event listeners");
                Vec::new()
            }
        }
    }

    /// Fire an event on the remote hub.
    pub async fn fire_event(&self, event_type: &str, data: &EventData) -> bool {
        match self.call(Method::POST, &url_event(event_type), Some(data)).await {
            Ok(response) if response.status == StatusCode::OK => true,
            Ok(response) => {
                error!(
                    event_type = %event_type,
                    status = %response.status,
                    body = %response.body,
                    "Error firing event"
                );
                false
            }
            Err(e) => {
                error!(event_type = %event_type, host = %self.endpoint(), error = %e, "Error firing event");
                false
            }
        }
    }

    /// State of one entity; `None` when unknown or unreachable.
    pub async fn get_state(&self, entity_id: &str) -> Option<EntityState> {
        match self.get(&url_state(entity_id)).await {
            // 404/422 when the entity does not exist
            Ok(response) if response.status != StatusCode::OK => None,
            Ok(response) => match response.json::<serde_json::Value>() {
                Ok(value) => codec::decode_state(&value)
                    .map_err(|e| error!(entity_id = %entity_id, error = %e, "Error fetching state"))
                    .ok(),
                Err(e) => {
                    error!(entity_id = %entity_id, error = %e, "Error fetching state");
                    None
                }
            },
            Err(e) => {
                error!(entity_id = %entity_id, error = %e, "Error fetching state");
                None
            }
        }
    }

    /// Every state on the remote hub; empty on any failure.
    pub async fn get_states(&self) -> Vec<EntityState> {
        let response = match self.get(URL_API_STATES).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Error fetching states");
                return Vec::new();
            }
        };

        if response.status != StatusCode::OK {
            error!(status = %response.status, body = %response.body, "Error fetching states");
            return Vec::new();
        }

        codec::decode_states(&response.body).unwrap_or_else(|e| {
            error!(error = %e, "Error fetching states");
            Vec::new()
        })
    }

    /// Write a new state on the remote hub. Success is 200 or 201.
    pub async fn set_state(
        &self,
        entity_id: &str,
        new_state: &str,
        attributes: Option<&Attributes>,
    ) -> bool {
        let write = StateWrite {
            state: new_state.to_string(),
            attributes: attributes.cloned().unwrap_or_default(),
        };

        match self.call(Method::POST, &url_state(entity_id), Some(&write)).await {
            Ok(response)
                if response.status == StatusCode::OK || response.status == StatusCode::CREATED =>
            {
                true
            }
            Ok(response) => {
                error!(
                    entity_id = %entity_id,
                    status = %response.status,
                    body = %response.body,
                    "Error changing state"
                );
                false
            }
            Err(e) => {
                error!(entity_id = %entity_id, error = %e, "Error setting state");
                false
            }
        }
    }

    /// Whether the remote reports `entity_id` in `state`.
    pub async fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id)
            .await
            .is_some_and(|current| current.state == state)
    }

    /// Services registered on the remote hub, per domain.
    pub async fn get_services(&self) -> Vec<ServiceDescription> {
        match self.get(URL_API_SERVICES).await {
            Ok(response) if response.status == StatusCode::OK => {
                response.json().unwrap_or_else(|e| {
                    error!(error = %e, "Got unexpected services result");
                    Vec::new()
                })
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                error!(error = %e, "Got unexpected services result");
                Vec::new()
            }
        }
    }

    /// Call a service on the remote hub.
    pub async fn call_service(&self, domain: &str, service: &str, service_data: &EventData) -> bool {
        match self
            .call(Method::POST, &url_service(domain, service), Some(service_data))
            .await
        {
            Ok(response) if response.status == StatusCode::OK => true,
            Ok(response) => {
                error!(
                    domain = %domain,
                    service = %service,
                    status = %response.status,
                    body = %response.body,
                    "Error calling service"
                );
                false
            }
            Err(e) => {
                error!(domain = %domain, service = %service, error = %e, "Error calling service");
                false
            }
        }
    }
}
