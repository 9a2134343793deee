// Inbound HTTP API and local-API provisioning
pub mod api;

// Bridge orchestrator and timer
pub mod bridge;

// Event buses
pub mod bus;

pub mod config;
pub mod error;

// Event model
pub mod event;

// Fan-out of local events to remote hubs
pub mod forwarding;

pub mod pool;

// Remote hub client and wire codec
pub mod remote;

// Entity states, local state machine and remote mirror
pub mod state;

pub use bridge::{Bridge, BridgeSettings, BridgeState, LocalApiProvider};
pub use error::{BridgeError, BridgeResult};
