//! # Authentication & RBAC
//!
//! Three credential forms share one permission model:
//!
//! - **AuthKeys** ([`AuthStore`]): persistent `dk_`-prefixed secrets with a
//!   permission set and optional expiry, usable directly as bearer tokens.
//!   Secrets are stored as salted argon2 hashes and returned exactly once at
//!   creation.
//! - **Session tokens** ([`SessionStore`]): short-lived opaque tokens issued
//!   by `/api/login` in exchange for a valid key secret.
//! - **The admin boot key**: supplied via the environment at startup and
//!   treated as a permanent AuthKey with every permission.
//!
//! Worker subscription tokens are deliberately *not* handled here; they
//! authorize only the `Process` RPC and live in the worker registry.

mod bearer;
mod keys;
mod sessions;

pub use bearer::extract_bearer;
pub use keys::{parse_duration_spec, AuthKeySummary, AuthStore, CreatedKey, SECRET_PREFIX};
pub use sessions::{Session, SessionStore, DEFAULT_SESSION_TTL};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One grantable capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Admin,
}

/// Identifier the admin boot key is known by internally.
pub const BOOT_KEY_ID: &str = "boot";

/// Resolved identity of an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Id of the AuthKey behind the credential (`boot` for the boot key).
    pub key_id: String,
    /// Permissions carried by the credential.
    pub permissions: HashSet<Permission>,
}

impl AuthContext {
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn has_any(&self, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.has(*p))
    }
}

/// The full permission set, granted to the boot key.
pub fn all_permissions() -> HashSet<Permission> {
    [Permission::Read, Permission::Write, Permission::Admin]
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Permission::Read).unwrap(), r#""read""#);
        let parsed: Permission = serde_json::from_str(r#""admin""#).unwrap();
        assert_eq!(parsed, Permission::Admin);
        assert!(serde_json::from_str::<Permission>(r#""root""#).is_err());
    }

    #[test]
    fn test_context_checks() {
        let ctx = AuthContext {
            key_id: "k1".to_string(),
            permissions: [Permission::Read].into_iter().collect(),
        };
        assert!(ctx.has(Permission::Read));
        assert!(!ctx.has(Permission::Write));
        assert!(ctx.has_any(&[Permission::Read, Permission::Admin]));
        assert!(!ctx.has_any(&[Permission::Write, Permission::Admin]));
    }
}
