//! Session credentials minted by `/login`.
//!
//! A session is the cookie-borne alternative to sending the API key on
//! every request to a protected path. Only the digest of the session id is
//! kept, together with its expiry.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::clock::SharedClock;
use crate::observability::metrics;
use crate::security::vault::{self, VaultError};

/// A newly minted session. `id` goes into the cookie and nowhere else.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, DateTime<Utc>>,
    ttl: Duration,
    clock: SharedClock,
}

impl SessionStore {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self) -> Result<Session, VaultError> {
        let id = vault::generate_default()?;
        let expires_at = self.clock.now() + self.ttl;
        self.sessions.insert(vault::digest(&id), expires_at);
        Ok(Session { id, expires_at })
    }

    /// True while the session exists and has not expired.
    pub fn validate(&self, id: &str) -> bool {
        if !vault::is_well_formed(id) {
            return false;
        }
        let now = self.clock.now();
        self.sessions
            .get(&vault::digest(id))
            .is_some_and(|expires_at| now < *expires_at)
    }

    /// Forget a session. Returns whether it existed.
    pub fn revoke(&self, id: &str) -> bool {
        self.sessions.remove(&vault::digest(id)).is_some()
    }

    /// Drop expired sessions.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.sessions.len();
        self.sessions.retain(|_, expires_at| *expires_at > now);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            metrics::record_evicted("sessions", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    #[test]
    fn session_lifecycle() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = SessionStore::new(Duration::minutes(10), clock.clone());

        let session = store.issue().unwrap();
        assert!(store.validate(&session.id));
        assert!(!store.validate("forged"));

        clock.advance(Duration::minutes(10));
        assert!(!store.validate(&session.id));
        assert_eq!(store.sweep(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn revoked_session_is_invalid() {
        let store = SessionStore::new(Duration::minutes(10), Arc::new(ManualClock::starting_now()));
        let session = store.issue().unwrap();
        assert!(store.revoke(&session.id));
        assert!(!store.validate(&session.id));
        assert!(!store.revoke(&session.id));
    }
}
