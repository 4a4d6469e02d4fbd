//! A `Topic` holds the ids of the connections currently subscribed to one
//! topic name. Adding a member twice is a no-op.

use std::collections::HashSet;

use super::connection::ConnectionId;

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub members: HashSet<ConnectionId>,
}

impl Topic {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: HashSet::new(),
        }
    }

    /// Returns `false` if the connection was already a member.
    pub fn join(&mut self, id: ConnectionId) -> bool {
        self.members.insert(id)
    }

    /// Returns `false` if the connection was not a member.
    pub fn leave(&mut self, id: &ConnectionId) -> bool {
        self.members.remove(id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
