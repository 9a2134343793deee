use super::codec;
use super::endpoint::Endpoint;
use crate::error::{BridgeError, BridgeResult};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error};

/// Header carrying the shared secret on every request.
pub const AUTH_HEADER: &str = "HA-access";

/// Fixed per-call timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of probing `GET /api`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStatus {
    Ok,
    InvalidPassword,
    CannotConnect,
    Unknown,
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ApiStatus::Ok => "ok",
            ApiStatus::InvalidPassword => "invalid_password",
            ApiStatus::CannotConnect => "cannot_connect",
            ApiStatus::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

/// Raw response handed back to callers; status codes are theirs to judge.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> BridgeResult<T> {
        codec::decode(&self.body)
    }
}

/// Authenticated HTTP client for one remote hub.
///
/// Cheap to clone: clones share the connection pool and the cached
/// validation status.
#[derive(Clone)]
pub struct RemoteApi {
    endpoint: Endpoint,
    http_client: Client,
    base_url: String,
    status: Arc<Mutex<Option<ApiStatus>>>,
}

/// Build the shared HTTP client with the fixed per-call timeout.
pub fn http_client() -> BridgeResult<Client> {
    Client::builder()
        .user_agent(concat!("hubbridge/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(BridgeError::Transport)
}

impl RemoteApi {
    pub fn new(endpoint: Endpoint) -> BridgeResult<Self> {
        Ok(Self::with_client(endpoint, http_client()?))
    }

    /// Create a client reusing an existing connection pool.
    pub fn with_client(endpoint: Endpoint, http_client: Client) -> Self {
        let base_url = endpoint.base_url();
        Self {
            endpoint,
            http_client,
            base_url,
            status: Arc::new(Mutex::new(None)),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one request against the remote API.
    ///
    /// A payload is sent as query parameters on GET and as a JSON body
    /// otherwise. Connection failures and timeouts become
    /// `BridgeUnavailable`; other client errors come back as `Transport`.
    /// No retries.
    pub async fn call<P>(&self, method: Method, path: &str, payload: Option<&P>) -> BridgeResult<ApiResponse>
    where
        P: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http_client
            .request(method.clone(), &url)
            .header(AUTH_HEADER, &self.endpoint.api_password);

        // GET data travels as query parameters, everything else as a JSON body
        request = match payload {
            Some(payload) if method == Method::GET => request.query(payload),
            Some(payload) => request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(codec::encode(payload)?),
            None => request,
        };

        debug!(method = %method, url = %url, "Calling remote API");

        let response = request.send().await.map_err(|e| {
            let err = BridgeError::from_transport(e);
            if err.is_unavailable() {
                error!(host = %self.endpoint, error = %err, "Error connecting to server");
            }
            err
        })?;

        let status = response.status();
        let body = response.text().await.map_err(BridgeError::from_transport)?;

        Ok(ApiResponse { status, body })
    }

    pub async fn get(&self, path: &str) -> BridgeResult<ApiResponse> {
        self.call::<()>(Method::GET, path, None).await
    }

    /// Check the API, reusing the cached status unless forced.
    pub async fn validate(&self, force: bool) -> bool {
        let cached = *self.status.lock().unwrap_or_else(|e| e.into_inner());

        let status = match cached {
            Some(status) if !force => status,
            _ => {
                let status = self.validate_api().await;
                *self.status.lock().unwrap_or_else(|e| e.into_inner()) = Some(status);
                status
            }
        };

        status == ApiStatus::Ok
    }

    /// Last check result, if any.
    pub fn status(&self) -> Option<ApiStatus> {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for RemoteApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteApi")
            .field("endpoint", &self.endpoint)
            .field("status", &self.status())
            .finish()
    }
}
