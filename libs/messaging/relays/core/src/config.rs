//! # Relay Configuration Management
//!
//! ## Purpose
//! Settings for the chat relay and its clients: where to listen, how large a
//! line may be, how much a slow peer may buffer before it is evicted, and
//! which integrity policy applies to the parity layer.
//!
//! ## Configuration Structure
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 12345
//!
//! [limits]
//! max_line_length = 1024          # bytes per frame line
//! outbound_queue_capacity = 256   # frames buffered per peer before eviction
//! send_timeout_ms = 5000          # per-write bound before eviction
//! handshake_timeout_ms = 30000    # time allowed to send the name line
//!
//! [validation]
//! enforce_parity = true           # reject empty messages at the parity layer
//! audit = false                   # log every verdict to the "audit" target
//! ```
//!
//! Every section and field is optional; missing values take the defaults
//! above. `RelayConfig::load` layers an optional file and environment
//! variables of the form `CHAT_RELAY__LIMITS__SEND_TIMEOUT_MS=1000`.

use crate::common::error::RelayEngineError;
use codec::DEFAULT_MAX_LINE_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "CHAT_RELAY";

/// Fixed port the protocol was designed around
pub const DEFAULT_PORT: u16 = 12345;

/// Main relay configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerSettings,
    pub limits: ConnectionLimits,
    pub validation: ValidationPolicy,
}

/// Listening address
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Per-connection resource bounds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionLimits {
    /// Maximum frame line length in bytes
    pub max_line_length: usize,
    /// Frames queued per peer before it is evicted as a slow consumer
    pub outbound_queue_capacity: usize,
    /// Upper bound for a single socket write
    pub send_timeout_ms: u64,
    /// Time allowed between accept and the name line
    pub handshake_timeout_ms: u64,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            outbound_queue_capacity: 256,
            send_timeout_ms: 5_000,
            handshake_timeout_ms: 30_000,
        }
    }
}

/// Integrity policy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Reject messages the parity layer refuses
    ///
    /// The relay recomputes parity from the received text, which always
    /// agrees with itself, so only empty messages are affected.
    pub enforce_parity: bool,
    /// Log every validation verdict to the `audit` target
    pub audit: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            enforce_parity: true,
            audit: false,
        }
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RelayEngineError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RelayEngineError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| RelayEngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load defaults, then an optional file, then `CHAT_RELAY__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self, RelayEngineError> {
        Self::load_with_env(path, None)
    }

    /// Like [`RelayConfig::load`] with an explicit environment map
    ///
    /// `None` reads the process environment.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, RelayEngineError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| RelayEngineError::Config(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the relay unusable
    pub fn validate(&self) -> Result<(), RelayEngineError> {
        if self.server.host.trim().is_empty() {
            return Err(RelayEngineError::Config("server.host must not be empty".to_string()));
        }

        // Room for a 32-bit checksum line at minimum
        if self.limits.max_line_length < 64 {
            return Err(RelayEngineError::Config(
                "limits.max_line_length must be >= 64".to_string(),
            ));
        }

        if self.limits.outbound_queue_capacity == 0 {
            return Err(RelayEngineError::Config(
                "limits.outbound_queue_capacity must be > 0".to_string(),
            ));
        }

        if self.limits.send_timeout_ms == 0 {
            return Err(RelayEngineError::Config(
                "limits.send_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.limits.handshake_timeout_ms == 0 {
            return Err(RelayEngineError::Config(
                "limits.handshake_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// `host:port` string for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ConnectionLimits {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Client-side settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay address to connect to
    pub server_address: String,
    /// Maximum frame line length in bytes
    pub max_line_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: format!("127.0.0.1:{}", DEFAULT_PORT),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:12345");
        assert_eq!(config.limits.max_line_length, 1024);
        assert!(config.validation.enforce_parity);
        assert!(!config.validation.audit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 4000\n\n[validation]\nenforce_parity = false").unwrap();

        let config = RelayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.validation.enforce_parity);
        assert_eq!(config.limits, ConnectionLimits::default());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../../../config/chat_relay.toml");
        let config = RelayConfig::load(Some(Path::new(path))).unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let mut config = RelayConfig::default();
        config.limits.outbound_queue_capacity = 0;
        assert!(matches!(config.validate(), Err(RelayEngineError::Config(_))));

        let mut config = RelayConfig::default();
        config.limits.max_line_length = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = RelayConfig::from_file("/nonexistent/chat_relay.toml");
        assert!(matches!(result, Err(RelayEngineError::Config(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let mut env = config::Map::new();
        env.insert("CHAT_RELAY__SERVER__PORT".to_string(), "23456".to_string());
        env.insert(
            "CHAT_RELAY__LIMITS__SEND_TIMEOUT_MS".to_string(),
            "250".to_string(),
        );

        let config = RelayConfig::load_with_env(None, Some(env)).unwrap();
        assert_eq!(config.server.port, 23456);
        assert_eq!(config.limits.send_timeout(), Duration::from_millis(250));
        assert_eq!(config.limits.outbound_queue_capacity, 256);
    }

    #[test]
    fn test_client_defaults() {
        let client = ClientConfig::default();
        assert_eq!(client.server_address, "127.0.0.1:12345");
    }
}
