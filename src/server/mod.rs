//! # Server Components
//!
//! - [`dispatcher`]: the event loop that accepts, handshakes, relays and tears down
//! - [`registry`]: live connections and the identity each announced
//! - [`roster`]: ordered identities for display, derived from join/leave events
//! - [`config`]: server settings loaded from TOML

pub mod config;
pub mod dispatcher;
pub mod registry;
pub mod roster;

pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use registry::{ConnectionId, Registry};
pub use roster::Roster;
