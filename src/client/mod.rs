//! # Client Components
//!
//! ## Peer Session ([`session`])
//! Connects to the relay, announces an identity, sends chat lines and runs the
//! background receive loop.
//!
//! ## Configuration ([`config`])
//! Display name and server address, loaded from TOML.

pub mod config;
pub mod session;

pub use config::ClientConfig;
pub use session::PeerSession;
