use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::config::load_config;

/// Server configuration loaded from TOML. Every field has a default, so an
/// empty file (or no file) is a valid configuration.
///
/// # Example TOML
///
/// ```toml
/// [server]
/// address = "0.0.0.0:5000"
/// handshake_timeout_ms = 5000
/// write_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerInfo {
    /// Address the listener binds to (e.g., "127.0.0.1:5000")
    pub address: String,
    /// How long a new connection gets to send its identity frame
    pub handshake_timeout_ms: u64,
    /// How long a single write to one client may take before it is dropped
    pub write_timeout_ms: u64,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5000".to_string(),
            handshake_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl ServerInfo {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl ServerConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        load_config(path)
    }

    /// Default configuration listening on `address`.
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            server: ServerInfo {
                address: address.into(),
                ..ServerInfo::default()
            },
        }
    }
}
