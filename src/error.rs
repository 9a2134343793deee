use crate::bridge::BridgeState;
use crate::remote::ApiStatus;
use thiserror::Error;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced by the remote bridge.
///
/// Only construction (`InvalidRemote`) and the start-up handshake
/// (`BridgeSetup`) escape to the orchestrator's caller. Everything else is
/// logged and degraded by the helper that observed it.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Connection refused or timed out while talking to a remote hub.
    #[error("Remote hub unavailable: {0}")]
    BridgeUnavailable(#[source] reqwest::Error),

    /// Any other HTTP client failure, propagated unchanged.
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The liveness/credential check did not come back OK.
    #[error("Remote API at {endpoint} not valid: {status}")]
    InvalidRemote { endpoint: String, status: ApiStatus },

    /// Registering for event forwarding on the remote hub failed.
    #[error("Bridge setup failed: {0}")]
    BridgeSetup(String),

    /// Response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Request payload could not be encoded.
    #[error("Failed to encode payload: {0}")]
    Encode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Lifecycle operation requested from a state that does not allow it.
    #[error("Cannot {action} bridge while {state:?}")]
    Lifecycle {
        action: &'static str,
        state: BridgeState,
    },
}

impl BridgeError {
    /// Classify a client error: connect failures and timeouts mean the remote
    /// is unavailable, everything else passes through as a transport error.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            BridgeError::BridgeUnavailable(err)
        } else {
            BridgeError::Transport(err)
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, BridgeError::BridgeUnavailable(_))
    }
}
