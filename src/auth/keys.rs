//! RBAC key records and secret verification.
//!
//! A secret is `dk_{key_id}_{random}`. Embedding the id makes verification a
//! lookup followed by an argon2 verify: the salted-KDF comparison is
//! constant-time, and the stored hash never reveals the secret. The random
//! part is 43 alphanumeric characters (~256 bits).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{rand_core::OsRng as HashOsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use uuid::Uuid;

use super::{all_permissions, AuthContext, Permission, BOOT_KEY_ID};
use crate::error::{DbError, DbResult};

/// Every key secret starts with this.
pub const SECRET_PREFIX: &str = "dk_";

const SECRET_RANDOM_LEN: usize = 43;

/// One stored key record. The secret itself is never stored.
#[derive(Debug)]
struct AuthKey {
    id: String,
    name: String,
    secret_hash: String,
    permissions: HashSet<Permission>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl AuthKey {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Listing form of a key, everything except the secret.
#[derive(Debug, Clone, Serialize)]
pub struct AuthKeySummary {
    pub id: String,
    pub name: String,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of creating a key; the only place the secret ever appears.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedKey {
    pub id: String,
    pub secret: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Concurrent store of RBAC keys plus the admin boot credential.
///
/// Records are held behind `Arc` and replaced wholesale on update, so
/// readers never observe a partially modified record.
pub struct AuthStore {
    keys: DashMap<String, Arc<AuthKey>>,
    boot_hash: Option<String>,
    argon2: Argon2<'static>,
}

impl AuthStore {
    /// Build a store, seeding the admin boot key from the environment value
    /// when present. The plaintext boot secret is hashed immediately and not
    /// retained.
    pub fn new(boot_secret: Option<&str>) -> DbResult<Self> {
        let argon2 = Argon2::default();
        let boot_hash = match boot_secret {
            Some(secret) if !secret.is_empty() => Some(hash_secret(&argon2, secret)?),
            _ => None,
        };
        Ok(Self {
            keys: DashMap::new(),
            boot_hash,
            argon2,
        })
    }

    /// Create a key. Returns the one-time secret.
    pub fn create(
        &self,
        name: &str,
        permissions: HashSet<Permission>,
        expires_in: Option<Duration>,
    ) -> DbResult<CreatedKey> {
        if name.is_empty() {
            return Err(DbError::bad_input("key name must not be empty"));
        }
        if permissions.is_empty() {
            return Err(DbError::bad_input("permissions must not be empty"));
        }

        let id = Uuid::new_v4().simple().to_string();
        let random: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SECRET_RANDOM_LEN)
            .map(char::from)
            .collect();
        let secret = format!("{SECRET_PREFIX}{id}_{random}");
        let secret_hash = hash_secret(&self.argon2, &secret)?;

        let now = Utc::now();
        let expires_at = expires_in.and_then(|d| {
            chrono::Duration::from_std(d)
                .ok()
                .map(|delta| now + delta)
        });

        let record = AuthKey {
            id: id.clone(),
            name: name.to_string(),
            secret_hash,
            permissions,
            created_at: now,
            expires_at,
        };
        self.keys.insert(id.clone(), Arc::new(record));

        Ok(CreatedKey {
            id,
            secret,
            expires_at,
        })
    }

    /// Verify a bearer secret. Handles both the boot key and `dk_` secrets;
    /// expired or deleted keys never verify.
    pub fn verify_secret(&self, secret: &str) -> Option<AuthContext> {
        if let Some(boot_hash) = &self.boot_hash {
            if verify_hash(&self.argon2, secret, boot_hash) {
                return Some(AuthContext {
                    key_id: BOOT_KEY_ID.to_string(),
                    permissions: all_permissions(),
                });
            }
        }

        let rest = secret.strip_prefix(SECRET_PREFIX)?;
        let (id, _) = rest.split_once('_')?;
        let record = self.keys.get(id)?.value().clone();

        if record.is_expired(Utc::now()) {
            return None;
        }
        if !verify_hash(&self.argon2, secret, &record.secret_hash) {
            return None;
        }

        Some(AuthContext {
            key_id: record.id.clone(),
            permissions: record.permissions.clone(),
        })
    }

    /// List key summaries (no secrets), newest first.
    pub fn list(&self) -> Vec<AuthKeySummary> {
        let mut summaries: Vec<AuthKeySummary> = self
            .keys
            .iter()
            .map(|entry| {
                let key = entry.value();
                let mut permissions: Vec<Permission> = key.permissions.iter().copied().collect();
                permissions.sort_by_key(|p| format!("{p:?}"));
                AuthKeySummary {
                    id: key.id.clone(),
                    name: key.name.clone(),
                    permissions,
                    created_at: key.created_at,
                    expires_at: key.expires_at,
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    /// Revoke a key. Returns false when the id is unknown.
    pub fn delete(&self, id: &str) -> bool {
        self.keys.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn hash_secret(argon2: &Argon2<'_>, secret: &str) -> DbResult<String> {
    let salt = SaltString::generate(&mut HashOsRng);
    argon2
        .hash_password(secret.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| DbError::internal("credential storage error"))
}

fn verify_hash(argon2: &Argon2<'_>, secret: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => argon2.verify_password(secret.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

/// Parse an `expires_in` spec: bare seconds (`"3600"`) or a value with a
/// unit suffix (`"90s"`, `"30m"`, `"24h"`, `"7d"`).
pub fn parse_duration_spec(spec: &str) -> Option<Duration> {
    let spec = spec.trim();
    if spec.is_empty() {
        return None;
    }
    if let Ok(seconds) = spec.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let (value, unit) = spec.split_at(spec.len() - 1);
    let value: u64 = value.parse().ok()?;
    let seconds = match unit {
        "s" => value,
        "m" => value.checked_mul(60)?,
        "h" => value.checked_mul(3600)?,
        "d" => value.checked_mul(86_400)?,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AuthStore {
        AuthStore::new(Some("boot-secret")).unwrap()
    }

    fn read_only() -> HashSet<Permission> {
        [Permission::Read].into_iter().collect()
    }

    #[test]
    fn test_create_and_verify() {
        let store = store();
        let created = store.create("test-readonly", read_only(), None).unwrap();
        assert!(created.secret.starts_with(SECRET_PREFIX));

        let ctx = store.verify_secret(&created.secret).unwrap();
        assert_eq!(ctx.key_id, created.id);
        assert!(ctx.has(Permission::Read));
        assert!(!ctx.has(Permission::Write));
    }

    #[test]
    fn test_boot_key_verifies_with_all_permissions() {
        let store = store();
        let ctx = store.verify_secret("boot-secret").unwrap();
        assert_eq!(ctx.key_id, BOOT_KEY_ID);
        assert!(ctx.has(Permission::Admin));
        assert!(ctx.has(Permission::Read));
        assert!(ctx.has(Permission::Write));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let store = store();
        let created = store.create("k", read_only(), None).unwrap();
        assert!(store.verify_secret("dk_bogus_secret").is_none());
        assert!(store.verify_secret("not-even-prefixed").is_none());

        // Right id, wrong random part.
        let forged = format!("{}x", &created.secret[..created.secret.len() - 1]);
        assert!(store.verify_secret(&forged).is_none());
    }

    #[test]
    fn test_deleted_key_rejected() {
        let store = store();
        let created = store.create("ephemeral", read_only(), None).unwrap();
        assert!(store.verify_secret(&created.secret).is_some());
        assert!(store.delete(&created.id));
        assert!(store.verify_secret(&created.secret).is_none());
        assert!(!store.delete(&created.id));
    }

    #[test]
    fn test_expired_key_rejected() {
        let store = store();
        let created = store
            .create("expiring", read_only(), Some(Duration::from_secs(0)))
            .unwrap();
        assert!(created.expires_at.is_some());
        assert!(store.verify_secret(&created.secret).is_none());
    }

    #[test]
    fn test_list_hides_secrets() {
        let store = store();
        store.create("a", read_only(), None).unwrap();
        store.create("b", read_only(), Some(Duration::from_secs(3600))).unwrap();

        let listed = store.list();
        assert_eq!(listed.len(), 2);
        let rendered = serde_json::to_string(&listed).unwrap();
        assert!(!rendered.contains(SECRET_PREFIX), "secret material in listing");
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let store = store();
        assert!(store.create("", read_only(), None).is_err());
        assert!(store.create("k", HashSet::new(), None).is_err());
    }

    #[test]
    fn test_parse_duration_spec() {
        assert_eq!(parse_duration_spec("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration_spec("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_duration_spec("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration_spec("7d"), Some(Duration::from_secs(604_800)));
        assert_eq!(parse_duration_spec("3600"), Some(Duration::from_secs(3600)));
        assert!(parse_duration_spec("").is_none());
        assert!(parse_duration_spec("soon").is_none());
        assert!(parse_duration_spec("-5h").is_none());
    }
}
