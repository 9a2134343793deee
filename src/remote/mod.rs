// Remote hub API: endpoint, transport client, wire codec and operations

mod client;
pub mod codec;
mod endpoint;
mod ops;

pub use client::{http_client, ApiResponse, ApiStatus, RemoteApi, AUTH_HEADER, REQUEST_TIMEOUT};
pub use endpoint::{Endpoint, EndpointKey, SERVER_PORT};
pub use ops::{
    url_event, url_service, url_state, URL_API, URL_API_EVENTS, URL_API_EVENT_FORWARD,
    URL_API_SERVICES, URL_API_STATES,
};
