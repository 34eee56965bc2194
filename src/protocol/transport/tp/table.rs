//! Session Table: the fixed-capacity pool of live [`Session`]s (spec.md
//! §4.2). Slots are plain `Option<Session>` array entries — "allocating" a
//! session is claiming a `None` slot, "releasing" it is setting it back to
//! `None`. There is no heap involved, so I2 (every allocation is released
//! on every exit path) holds structurally: it is simply not possible to
//! leak a slot once the `Session` value is dropped.
use crate::error::TableError;
use crate::protocol::transport::tp::session::{Role, Session};

/// Default session table capacity (spec.md §4.2). Small embedded targets
/// with only one or two peers can shrink this by changing the const.
pub const MAX_SESSIONS: usize = 8;

/// Fixed-capacity pool of concurrent Transport Protocol sessions.
pub struct SessionTable {
    slots: [Option<Session>; MAX_SESSIONS],
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTable {
    pub const fn new() -> Self {
        Self { slots: [const { None }; MAX_SESSIONS] }
    }

    /// Look up the (at most one) session for a given `(peer, role)` key.
    pub fn lookup(&self, peer: u8, role: Role) -> Option<&Session> {
        self.slots.iter().flatten().find(|s| s.peer == peer && s.role == role)
    }

    pub fn lookup_mut(&mut self, peer: u8, role: Role) -> Option<&mut Session> {
        self.slots.iter_mut().flatten().find(|s| s.peer == peer && s.role == role)
    }

    /// Insert a new session, enforcing I1: at most one session per
    /// `(peer, role)` key. Returns `TableError::Busy` if one already
    /// exists for that key (an I1 collision), `TableError::NoResources`
    /// if the table is full.
    pub fn insert(&mut self, session: Session) -> Result<(), TableError> {
        if self.lookup(session.peer, session.role).is_some() {
            return Err(TableError::Busy);
        }
        for slot in self.slots.iter_mut() {
            if slot.is_none() {
                *slot = Some(session);
                return Ok(());
            }
        }
        Err(TableError::NoResources)
    }

    /// Remove and drop the session for `(peer, role)`, if any.
    pub fn remove(&mut self, peer: u8, role: Role) {
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some(s) if s.peer == peer && s.role == role) {
                *slot = None;
                return;
            }
        }
    }

    /// All live sessions, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.slots.iter_mut().flatten()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
