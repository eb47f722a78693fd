//! # LAN Chat
//!
//! A text chat relay for a local network. Clients connect to one server,
//! announce a display name, and every line a client sends is relayed to every
//! other connected client.
//!
//! - [`common`]: the wire format, frame reader, events and errors shared by both sides
//! - [`server`]: the relay's event loop and connection bookkeeping
//! - [`client`]: the peer session used by chat front-ends

pub mod client;
pub mod common;
pub mod server;

pub use client::PeerSession;
pub use common::error::{ChatError, FramingError};
pub use common::events::ChatEvent;
pub use server::Dispatcher;
