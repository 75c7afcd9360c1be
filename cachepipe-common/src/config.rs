//! # Connection Configuration
//!
//! Named store connections, deserialized from JSON with serde.
//!
//! ```text
//! {
//!   "default_connection": "cache",
//!   "connections": {
//!     "cache": { "addr": "127.0.0.1:6379", "db": 2, "read_timeout_ms": 500 }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Connection name used when a caller does not pick one.
pub const DEFAULT_CONNECTION: &str = "default";

/// Settings for one named store connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Optional password sent with AUTH after connecting.
    pub password: Option<String>,
    /// Logical database selected after connecting.
    pub db: u32,
    /// Optional TCP read timeout in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Optional TCP write timeout in milliseconds.
    pub write_timeout_ms: Option<u64>,
    /// Optional TCP connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            addr: "127.0.0.1:6379".to_string(),
            password: None,
            db: 0,
            read_timeout_ms: None,
            write_timeout_ms: None,
            connect_timeout_ms: None,
        }
    }
}

impl ConnectionConfig {
    /// Creates a config for `addr` with every other setting defaulted.
    pub fn new(addr: impl Into<String>) -> Self {
        ConnectionConfig {
            addr: addr.into(),
            ..ConnectionConfig::default()
        }
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

/// All named connections plus the default name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_connection_name")]
    pub default_connection: String,
    #[serde(default)]
    pub connections: HashMap<String, ConnectionConfig>,
}

fn default_connection_name() -> String {
    DEFAULT_CONNECTION.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            default_connection: default_connection_name(),
            connections: HashMap::new(),
        }
    }
}

impl StoreConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: StoreConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Adds or replaces a named connection.
    pub fn with_connection(mut self, name: impl Into<String>, config: ConnectionConfig) -> Self {
        self.connections.insert(name.into(), config);
        self
    }

    pub fn connection(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections.get(name)
    }

    // An empty connection table is allowed; lookups fail later per name.
    fn validate(&self) -> ConfigResult<()> {
        if !self.connections.is_empty() && !self.connections.contains_key(&self.default_connection) {
            return Err(ConfigError::UnknownDefault {
                name: self.default_connection.clone(),
            });
        }
        Ok(())
    }
}
