use super::auth::{authorize, AuthError};
use crate::bus::EventBus;
use crate::event::{EventData, EventOrigin};
use crate::forwarding::EventForwarder;
use crate::remote::codec::{
    EventListenerCount, ForwardCancellation, ForwardRegistration, Message, StateWrite,
};
use crate::remote::{ApiStatus, Endpoint};
use crate::state::{EntityState, StateMachine};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct InboundState {
    pub bus: Arc<dyn EventBus>,
    pub states: Arc<dyn StateMachine>,
    pub forwarder: Arc<EventForwarder>,
    /// Secret every request must carry in `HA-access`
    pub api_password: String,
}

/// Create the inbound API router
pub fn create_router(state: InboundState) -> Router {
    Router::new()
        .route("/api", get(api_status))
        .route("/api/states", get(list_states))
        .route("/api/states/:entity_id", get(get_state).post(post_state))
        .route("/api/events", get(list_events))
        .route("/api/events/:event_type", post(fire_event))
        .route(
            "/api/event_forwarding",
            post(add_forwarding).delete(remove_forwarding),
        )
        .with_state(Arc::new(state))
}

fn message(text: impl Into<String>) -> Json<Message> {
    Json(Message {
        message: text.into(),
    })
}

/// GET /api - Liveness and credential check
async fn api_status(
    State(state): State<Arc<InboundState>>,
    headers: HeaderMap,
) -> Result<Json<Message>, AppError> {
    authorize(&headers, &state.api_password)?;
    Ok(message("API running."))
}

/// GET /api/states
async fn list_states(
    State(state): State<Arc<InboundState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<EntityState>>, AppError> {
    authorize(&headers, &state.api_password)?;
    Ok(Json(state.states.all()))
}

/// GET /api/states/:entity_id
async fn get_state(
    State(state): State<Arc<InboundState>>,
    headers: HeaderMap,
    Path(entity_id): Path<String>,
) -> Result<Json<EntityState>, AppError> {
    authorize(&headers, &state.api_password)?;
    state
        .states
        .get(&entity_id)
        .map(Json)
        .ok_or_else(|| AppError::Unprocessable(format!("Entity {} not found", entity_id)))
}

/// POST /api/states/:entity_id - 201 for a new entity, 200 for an update
async fn post_state(
    State(state): State<Arc<InboundState>>,
    headers: HeaderMap,
    Path(entity_id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    authorize(&headers, &state.api_password)?;

    let write: StateWrite = parse_body(&body)
        .map_err(|_| AppError::Unprocessable("No state specified".to_string()))?;

    let is_new = state.states.get(&entity_id).is_none();
    if !state
        .states
        .set(&entity_id, &write.state, Some(write.attributes))
        .await
    {
        return Err(AppError::Internal(format!("Could not set state of {}", entity_id)));
    }

    let status = if is_new {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let body = state
        .states
        .get(&entity_id)
        .map(|s| Json(s).into_response())
        .unwrap_or_else(|| message(format!("State of {} set", entity_id)).into_response());

    Ok((status, body).into_response())
}

/// GET /api/events - Listener count per event type
async fn list_events(
    State(state): State<Arc<InboundState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<EventListenerCount>>, AppError> {
    authorize(&headers, &state.api_password)?;

    let mut counts: Vec<EventListenerCount> = state
        .bus
        .listeners()
        .into_iter()
        .map(|(event, listener_count)| EventListenerCount {
            event,
            listener_count,
        })
        .collect();
    counts.sort_by(|a, b| a.event.cmp(&b.event));

    Ok(Json(counts))
}

/// POST /api/events/:event_type - Fire an event forwarded by a peer
async fn fire_event(
    State(state): State<Arc<InboundState>>,
    headers: HeaderMap,
    Path(event_type): Path<String>,
    body: Bytes,
) -> Result<Json<Message>, AppError> {
    authorize(&headers, &state.api_password)?;

    let data = if body.iter().all(u8::is_ascii_whitespace) {
        EventData::new()
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(data)) => data,
            Ok(_) => {
                return Err(AppError::BadRequest(
                    "Event data should be a JSON object".to_string(),
                ))
            }
            Err(e) => return Err(AppError::BadRequest(format!("Invalid JSON: {}", e))),
        }
    };

    state.bus.fire(&event_type, data, EventOrigin::Remote);
    Ok(message(format!("Event {} fired.", event_type)))
}

/// POST /api/event_forwarding - Start forwarding local events to a peer
async fn add_forwarding(
    State(state): State<Arc<InboundState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Message>, AppError> {
    authorize(&headers, &state.api_password)?;

    let registration: ForwardRegistration =
        parse_body(&body).map_err(AppError::Unprocessable)?;
    let endpoint = Endpoint::new(
        registration.host,
        registration.api_password,
        registration.port,
    );

    let status = state.forwarder.validate_target(&endpoint).await;
    if status != ApiStatus::Ok {
        warn!(peer = %endpoint, status = %status, "Rejected event forwarding target");
        return Err(AppError::Unprocessable(format!(
            "Unable to validate API: {}",
            status
        )));
    }

    info!(peer = %endpoint, "Event forwarding requested");
    state.forwarder.connect(endpoint);
    Ok(message("Event forwarding setup."))
}

/// DELETE /api/event_forwarding - Stop forwarding to a peer
async fn remove_forwarding(
    State(state): State<Arc<InboundState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Message>, AppError> {
    authorize(&headers, &state.api_password)?;

    let cancellation: ForwardCancellation =
        parse_body(&body).map_err(AppError::Unprocessable)?;
    let endpoint = Endpoint::new(cancellation.host, String::new(), cancellation.port);

    if state.forwarder.disconnect(&endpoint) {
        Ok(message("Event forwarding cancelled."))
    } else {
        Err(AppError::NotFound(format!(
            "No event forwarding to {}",
            endpoint
        )))
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, String> {
    serde_json::from_slice(body).map_err(|e| e.to_string())
}

/// Application error types
#[derive(Debug)]
pub(crate) enum AppError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    Unprocessable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, text) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, message(text)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        AppError::Unauthorized(e.to_string())
    }
}
