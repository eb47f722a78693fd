//! # Connection Registry
//!
//! Which connections have completed their handshake, and who they said they
//! were. Owned by the [`Dispatcher`](super::dispatcher::Dispatcher) and only
//! ever touched from its task, so there is no locking.

use std::collections::BTreeMap;
use std::fmt;

use crate::common::frame::RawFrame;

/// Identifies one accepted connection. Ids are handed out in increasing order,
/// so ordering by id is ordering by accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct Entry<C> {
    /// The identity frame's payload, decoded for display.
    pub identity: String,
    /// The identity frame exactly as announced at handshake.
    pub identity_frame: RawFrame,
    /// Whatever the owner needs to talk to this connection.
    pub connection: C,
}

/// Registered connections in insertion order.
///
/// Generic over the connection handle: the dispatcher stores the write half
/// of the socket, tests can store anything.
#[derive(Debug)]
pub struct Registry<C> {
    entries: BTreeMap<ConnectionId, Entry<C>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection that finished its handshake.
    ///
    /// Returns `false` and leaves the existing entry alone if `id` is already
    /// registered.
    pub fn register(&mut self, id: ConnectionId, identity_frame: RawFrame, connection: C) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }

        self.entries.insert(
            id,
            Entry {
                identity: identity_frame.text(),
                identity_frame,
                connection,
            },
        );
        true
    }

    /// Remove a connection. Unknown ids are a no-op, so a connection reported
    /// dead twice is only torn down once.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Entry<C>> {
        self.entries.remove(&id)
    }

    pub fn identity_of(&self, id: ConnectionId) -> Option<&str> {
        self.entries.get(&id).map(|entry| entry.identity.as_str())
    }

    pub fn identity_frame_of(&self, id: ConnectionId) -> Option<&RawFrame> {
        self.entries.get(&id).map(|entry| &entry.identity_frame)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut C> {
        self.entries.get_mut(&id).map(|entry| &mut entry.connection)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn all_connections(&self) -> Vec<ConnectionId> {
        self.entries.keys().copied().collect()
    }

    /// Every registered connection except `excluded`, for broadcasts that
    /// skip the sender.
    pub fn connections_except(&self, excluded: ConnectionId) -> Vec<ConnectionId> {
        self.entries
            .keys()
            .copied()
            .filter(|id| *id != excluded)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
