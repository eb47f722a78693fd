use crate::common::events::ChatEvent;

/// Ordered list of connected identities, for display.
///
/// Derived from join/leave events rather than read from the registry, so a
/// presentation layer can keep its own copy in step by feeding it the same
/// event stream through [`Roster::apply`].
#[derive(Debug, Clone, Default)]
pub struct Roster {
    identities: Vec<String>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, identity: impl Into<String>) {
        self.identities.push(identity.into());
    }

    /// Remove the first occurrence of `identity`. Duplicate names are allowed,
    /// so this removes one and leaves the rest.
    pub fn remove(&mut self, identity: &str) -> bool {
        match self.identities.iter().position(|known| known == identity) {
            Some(index) => {
                self.identities.remove(index);
                true
            }
            None => false,
        }
    }

    /// Update from a server event; anything other than a join or leave is ignored.
    pub fn apply(&mut self, event: &ChatEvent) {
        match event {
            ChatEvent::Joined { identity } => self.push(identity.clone()),
            ChatEvent::Left { identity } => {
                self.remove(identity);
            }
            _ => {}
        }
    }

    pub fn identities(&self) -> &[String] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
