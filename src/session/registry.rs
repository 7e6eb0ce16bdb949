//! Session Registry
//!
//! Thread-safe lookup of connected sessions using DashMap for concurrent access.

use dashmap::DashMap;
use tracing::{debug, info};

use super::types::{Session, SessionId};

/// Registry of sessions known to the console, keyed by session ID
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register (or replace) a session
    pub fn register(&self, session: Session) {
        info!(
            "[session-registry] Registered session {} ({}, {})",
            session.id, session.name, session.os
        );
        self.sessions.insert(session.id.clone(), session);
    }

    /// Get a session by ID
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|r| r.value().clone())
    }

    /// Check if a session is registered
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Remove a session, returning it if it was registered
    pub fn remove(&self, id: &SessionId) -> Option<Session> {
        let removed = self.sessions.remove(id).map(|(_, s)| s);
        if removed.is_some() {
            debug!("[session-registry] Removed session {}", id);
        }
        removed
    }

    /// All registered sessions, sorted by ID for stable output
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.iter().map(|r| r.value().clone()).collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
