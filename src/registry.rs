//! Directory of online users.
//!
//! A username maps to at most one live session. All operations are single
//! `DashMap` shard operations; no I/O happens while a shard lock is held.

use crate::session::SessionHandle;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("user '{0}' is already logged in")]
    AlreadyPresent(String),
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-insert. Never replaces an existing entry.
    pub fn register(&self, username: &str, handle: SessionHandle) -> Result<(), RegistryError> {
        match self.sessions.entry(username.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyPresent(username.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(handle);
                Ok(())
            }
        }
    }

    /// Remove the entry for `username`, whoever owns it. Idempotent.
    pub fn unregister(&self, username: &str) -> Option<SessionHandle> {
        self.sessions.remove(username).map(|(_, handle)| handle)
    }

    /// Remove the entry only if it still belongs to connection `conn_id`, so a
    /// late teardown can never evict a newer session under the same name.
    pub fn unregister_session(&self, username: &str, conn_id: &str) -> bool {
        self.sessions
            .remove_if(username, |_, handle| handle.conn_id() == conn_id)
            .is_some()
    }

    pub fn lookup(&self, username: &str) -> Option<SessionHandle> {
        self.sessions.get(username).map(|entry| entry.value().clone())
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Sorted snapshot of online usernames.
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Remove every entry and hand the handles back for closing.
    pub fn drain(&self) -> Vec<(String, SessionHandle)> {
        let names: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        names
            .into_iter()
            .filter_map(|name| self.sessions.remove(&name))
            .collect()
    }
}
