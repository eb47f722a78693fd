//! # Chat Events
//!
//! What the core tells the presentation layer. The server and the client both
//! push [`ChatEvent`]s into an unbounded channel so that neither the event loop
//! nor the receive task ever waits on whoever is displaying them.

use std::fmt;

use tokio::sync::mpsc;

use super::frame::SERVER_IDENTITY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A chat line from `identity`.
    Message { identity: String, text: String },

    /// A client completed its handshake (server side only).
    Joined { identity: String },

    /// A registered client went away (server side only).
    Left { identity: String },

    /// The session's connection ended without being asked to (client side only).
    ConnectionLost { reason: String },
}

pub type EventSender = mpsc::UnboundedSender<ChatEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ChatEvent>;

/// Create the channel a server or session reports into.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

impl fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatEvent::Message { identity, text } => write!(f, "<{}>: {}", identity, text),
            ChatEvent::Joined { identity } => {
                write!(f, "<{}> {} has entered the room!", SERVER_IDENTITY, identity)
            }
            ChatEvent::Left { identity } => {
                write!(f, "<{}> {} has disconnected!", SERVER_IDENTITY, identity)
            }
            ChatEvent::ConnectionLost { reason } => write!(f, "Connection lost: {}", reason),
        }
    }
}
