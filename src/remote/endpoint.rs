use serde::{Deserialize, Serialize};
use std::fmt;

/// Port a hub's API listens on unless configured otherwise.
pub const SERVER_PORT: u16 = 8123;

/// Network address and credential of one hub's API.
///
/// Identity is (host, port); the password is only checked by the remote
/// side at call time.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub api_password: String,
}

/// Identity key of an [`Endpoint`].
pub type EndpointKey = (String, u16);

fn default_port() -> u16 {
    SERVER_PORT
}

impl Endpoint {
    pub fn new(host: impl Into<String>, api_password: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port: port.unwrap_or(SERVER_PORT),
            api_password: api_password.into(),
        }
    }

    pub fn key(&self) -> EndpointKey {
        (self.host.clone(), self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// Keep the secret out of logs
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_port() {
        let endpoint = Endpoint::new("10.0.0.2", "secret", None);
        assert_eq!(endpoint.port, SERVER_PORT);
        assert_eq!(endpoint.base_url(), "http://10.0.0.2:8123");
    }

    #[test]
    fn test_key_ignores_password() {
        let a = Endpoint::new("hub", "one", Some(9000));
        let b = Endpoint::new("hub", "two", Some(9000));
        assert_eq!(a.key(), b.key());
        assert_ne!(a, b);
    }

    #[test]
    fn test_deserialize_without_port() {
        let endpoint: Endpoint =
            serde_json::from_value(json!({"host": "hub", "api_password": "pw"})).unwrap();
        assert_eq!(endpoint.port, SERVER_PORT);
    }

    #[test]
    fn test_debug_hides_password() {
        let endpoint = Endpoint::new("hub", "hunter2", None);
        assert!(!format!("{:?}", endpoint).contains("hunter2"));
    }
}
