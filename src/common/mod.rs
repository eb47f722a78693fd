//! # Common Components
//!
//! Shared pieces used by both client and server.
//!
//! ## Modules
//!
//! - [`frame`]: the length-prefixed wire format
//! - [`connection`]: readiness-driven frame reader over a TCP read half
//! - [`events`]: what the core reports to the presentation layer
//! - [`error`]: framing and connection errors
//! - [`config`]: TOML configuration loading

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod frame;
