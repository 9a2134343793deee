use crate::error::{BridgeError, BridgeResult};
use crate::event::EventOrigin;
use crate::pool::DEFAULT_WORKERS;
use crate::remote::{Endpoint, SERVER_PORT};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    /// Upstream hub to mirror; absent runs a standalone hub
    #[serde(default)]
    pub remote: Option<Endpoint>,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
}

/// This instance's inbound API
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    /// Address advertised to the remote hub during the handshake
    #[serde(default = "default_local_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub api_password: String,
    /// Socket the inbound API binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
}

fn default_local_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    SERVER_PORT
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], SERVER_PORT))
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            host: default_local_host(),
            port: default_port(),
            api_password: String::new(),
            bind_address: default_bind_address(),
        }
    }
}

impl LocalConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.api_password.clone(), Some(self.port))
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Listener callbacks allowed to run at once
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// Timer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TimerConfig {
    /// Seconds between local time_changed events
    #[serde(default = "default_timer_interval")]
    pub interval_seconds: u64,
}

fn default_timer_interval() -> u64 {
    10
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_timer_interval(),
        }
    }
}

impl TimerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

/// Event forwarding configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardingConfig {
    /// Forward only events of this origin
    #[serde(default)]
    pub restrict_origin: Option<EventOrigin>,
}

impl BridgeConfig {
    /// Apply environment overrides; unparsable values are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("HUBBRIDGE_REMOTE_HOST") {
            match self.remote.as_mut() {
                Some(remote) => remote.host = host,
                None => self.remote = Some(Endpoint::new(host, String::new(), None)),
            }
        }
        if let Some(remote) = self.remote.as_mut() {
            if let Ok(v) = std::env::var("HUBBRIDGE_REMOTE_PORT") {
                if let Ok(port) = v.parse::<u16>() {
                    remote.port = port;
                }
            }
            if let Ok(password) = std::env::var("HUBBRIDGE_REMOTE_PASSWORD") {
                remote.api_password = password;
            }
        }
        if let Ok(password) = std::env::var("HUBBRIDGE_LOCAL_PASSWORD") {
            self.local.api_password = password;
        }
        if let Ok(v) = std::env::var("HUBBRIDGE_BIND_ADDRESS") {
            if let Ok(addr) = v.parse::<SocketAddr>() {
                self.local.bind_address = addr;
            }
        }
    }
}

/// Parse configuration from TOML text
pub fn parse_config(contents: &str) -> BridgeResult<BridgeConfig> {
    toml::from_str(contents).map_err(|e| BridgeError::Config(e.to_string()))
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> BridgeResult<BridgeConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("failed to read {}: {}", path, e)))?;
    parse_config(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert!(config.remote.is_none());
        assert_eq!(config.local.port, 8123);
        assert_eq!(config.local.bind_address.port(), 8123);
        assert_eq!(config.pool.workers, 4);
        assert_eq!(config.timer.interval_seconds, 10);
        assert_eq!(config.forwarding.restrict_origin, None);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [remote]
            host = "10.0.0.2"
            port = 9000
            api_password = "upstream"

            [local]
            host = "10.0.0.3"
            api_password = "downstream"
            bind_address = "0.0.0.0:8124"

            [pool]
            workers = 8

            [timer]
            interval_seconds = 1

            [forwarding]
            restrict_origin = "local"
        "#;

        let config = parse_config(toml).unwrap();
        let remote = config.remote.unwrap();
        assert_eq!(remote.host, "10.0.0.2");
        assert_eq!(remote.port, 9000);
        assert_eq!(remote.api_password, "upstream");
        assert_eq!(config.local.endpoint().to_string(), "10.0.0.3:8123");
        assert_eq!(config.local.bind_address.port(), 8124);
        assert_eq!(config.pool.workers, 8);
        assert_eq!(config.timer.interval(), Duration::from_secs(1));
        assert_eq!(config.forwarding.restrict_origin, Some(EventOrigin::Local));
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [remote]
            host = "hub.lan"
            api_password = "pw"
        "#;

        let config = parse_config(toml).unwrap();
        assert_eq!(config.remote.unwrap().port, 8123); // Default
        assert_eq!(config.pool.workers, 4); // Default
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let err = parse_config("[pool]\nworkers = \"many\"").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timer]\ninterval_seconds = 30").unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.timer.interval_seconds, 30);

        assert!(matches!(load_config("/nonexistent/hubbridge.toml"), Err(BridgeError::Config(_))));
    }
}
