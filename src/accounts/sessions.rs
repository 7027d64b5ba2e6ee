// =============================================================================
// Session Store — in-memory login sessions keyed by an opaque id
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a session for `username` and return its id.
    pub fn create(&self, username: &str) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let session = Session {
            username: username.to_string(),
            expires_at: Utc::now() + self.ttl,
        };
        self.sessions.write().insert(id.clone(), session);
        debug!(username, "session created");
        id
    }

    /// The live session for `id`. Expired sessions are dropped on sight.
    pub fn resolve(&self, id: &str) -> Option<Session> {
        let session = self.sessions.read().get(id).cloned()?;
        if session.expires_at <= Utc::now() {
            self.sessions.write().remove(id);
            debug!(username = %session.username, "session expired");
            return None;
        }
        Some(session)
    }

    pub fn destroy(&self, id: &str) -> Option<Session> {
        self.sessions.write().remove(id)
    }

    /// Remove every expired session, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
