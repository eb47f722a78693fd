use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::common::config::load_config;

/// Client configuration loaded from TOML file.
///
/// # Example TOML
///
/// ```toml
/// [client]
/// name = "alice"
/// server_address = "127.0.0.1:5000"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub client: ClientInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    /// Display name announced at handshake; a random number when unset
    pub name: Option<String>,
    /// Address of the relay server
    pub server_address: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: None,
            server_address: "127.0.0.1:5000".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        load_config(path)
    }
}
