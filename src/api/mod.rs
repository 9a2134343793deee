// Inbound HTTP API: the receiving half of the hub-to-hub protocol

mod auth;
mod local;
mod routes;

pub use auth::{authorize, AuthError};
pub use local::{serve, HttpLocalApi, ServerHandle};
pub use routes::{create_router, InboundState};
