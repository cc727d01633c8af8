//! Short-lived session tokens for the `/api/login` exchange.
//!
//! Sessions exist only in memory; a restart logs everyone out. Expiry is
//! enforced on every lookup, and deleting the backing AuthKey revokes its
//! sessions immediately.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::{distributions::Alphanumeric, Rng};

use super::{AuthContext, Permission};

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

const TOKEN_LEN: usize = 48;

/// One issued session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Id of the AuthKey the session was minted from.
    pub key_id: String,
    /// Permission set copied from the key at login time.
    pub permissions: HashSet<Permission>,
    /// Hard expiry; not refreshed by use.
    pub expires_at: DateTime<Utc>,
}

/// In-memory session table.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: chrono::Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(3600)),
        }
    }

    /// Issue a token carrying the key's permission set.
    pub fn issue(&self, key_id: &str, permissions: HashSet<Permission>) -> (String, DateTime<Utc>) {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        let expires_at = Utc::now() + self.ttl;
        self.sessions.insert(
            token.clone(),
            Session {
                key_id: key_id.to_string(),
                permissions,
                expires_at,
            },
        );
        (token, expires_at)
    }

    /// Resolve a bearer token; expired sessions are dropped on sight.
    pub fn resolve(&self, token: &str) -> Option<AuthContext> {
        let session = self.sessions.get(token)?.value().clone();
        if Utc::now() >= session.expires_at {
            drop(self.sessions.remove(token));
            return None;
        }
        Some(AuthContext {
            key_id: session.key_id,
            permissions: session.permissions,
        })
    }

    /// Drop every session minted from a key. Called on key deletion.
    pub fn revoke_for_key(&self, key_id: &str) {
        self.sessions.retain(|_, session| session.key_id != key_id);
    }

    /// Drop expired sessions; called by the background sweeper.
    pub fn purge_expired(&self) {
        let now = Utc::now();
        self.sessions.retain(|_, session| session.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms() -> HashSet<Permission> {
        [Permission::Read, Permission::Write].into_iter().collect()
    }

    #[test]
    fn test_issue_and_resolve() {
        let store = SessionStore::default();
        let (token, expires_at) = store.issue("key-1", perms());
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(expires_at > Utc::now());

        let ctx = store.resolve(&token).unwrap();
        assert_eq!(ctx.key_id, "key-1");
        assert!(ctx.has(Permission::Write));
    }

    #[test]
    fn test_unknown_token_rejected() {
        let store = SessionStore::default();
        assert!(store.resolve("nope").is_none());
    }

    #[test]
    fn test_expired_session_rejected_and_dropped() {
        let store = SessionStore::new(Duration::from_secs(0));
        let (token, _) = store.issue("key-1", perms());
        assert!(store.resolve(&token).is_none());
        assert!(store.is_empty(), "expired session must be removed");
    }

    #[test]
    fn test_revoke_for_key() {
        let store = SessionStore::default();
        let (t1, _) = store.issue("key-1", perms());
        let (t2, _) = store.issue("key-2", perms());
        store.revoke_for_key("key-1");
        assert!(store.resolve(&t1).is_none());
        assert!(store.resolve(&t2).is_some());
    }

    #[test]
    fn test_purge_expired() {
        let store = SessionStore::new(Duration::from_secs(0));
        store.issue("key-1", perms());
        store.issue("key-2", perms());
        assert_eq!(store.len(), 2);
        store.purge_expired();
        assert!(store.is_empty());
    }

    #[test]
    fn test_tokens_are_unique() {
        let store = SessionStore::default();
        let (t1, _) = store.issue("key-1", perms());
        let (t2, _) = store.issue("key-1", perms());
        assert_ne!(t1, t2);
    }
}
