//! # Configuration Utilities
//!
//! Shared TOML loading used by both the server and the client binaries.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Arguments
/// - `path`: Path to the TOML configuration file
///
/// # Returns
/// - `Ok(T)`: Successfully loaded and parsed configuration
/// - `Err`: File I/O or parsing error
///
/// # Example
/// ```ignore
/// let config: ServerConfig = load_config("config/server.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read config {}", path))?;
    let config: T =
        toml::from_str(&content).with_context(|| format!("failed to parse config {}", path))?;
    Ok(config)
}
