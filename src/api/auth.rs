use crate::remote::AUTH_HEADER;
use axum::http::HeaderMap;

/// Authorization errors
#[derive(Debug, PartialEq)]
pub enum AuthError {
    /// No `HA-access` header on the request
    MissingSecret,
    /// Header present but not equal to the local secret
    InvalidSecret,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingSecret => write!(f, "Missing {} header", AUTH_HEADER),
            AuthError::InvalidSecret => write!(f, "Invalid API password"),
        }
    }
}

/// Check the shared-secret header against the local API password.
pub fn authorize(headers: &HeaderMap, api_password: &str) -> Result<(), AuthError> {
    let provided = headers
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingSecret)?;

    if provided == api_password {
        Ok(())
    } else {
        Err(AuthError::InvalidSecret)
    }
}
