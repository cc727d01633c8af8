//! Central name validation for databases, entity keys, and schema ids.
//!
//! Every component that turns a caller-supplied name into a filesystem path
//! goes through [`validate_name`] first. The allowed charset is
//! `[A-Za-z0-9_.\-]`; anything else, separators and NUL bytes included,
//! is rejected before a path is ever constructed.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DbError, DbResult};

/// Longest accepted name. Long enough for versioned schema ids, short
/// enough to keep `{database}_{key}` filenames within filesystem limits.
pub const MAX_NAME_LEN: usize = 128;

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap()
});

/// Validate a single name component (`database`, `entity_key`, or
/// `schema_id`). `what` names the field in the error message.
pub fn validate_name(what: &str, name: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::bad_input(format!("{what} must not be empty")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(DbError::bad_input(format!("{what} is too long")));
    }
    if !NAME_RE.is_match(name) {
        return Err(DbError::bad_input(format!("{what} contains invalid characters")));
    }
    // Dots are legal inside a name (schema ids like "chat.v1"), but a name
    // made of dots alone is a directory reference.
    if name.bytes().all(|b| b == b'.') {
        return Err(DbError::bad_input(format!("{what} is not a valid name")));
    }
    Ok(())
}

/// Validate the `(database, entity_key)` pair addressed by an operation.
pub fn validate_entity_names(database: &str, entity_key: &str) -> DbResult<()> {
    validate_name("database", database)?;
    validate_name("entity_key", entity_key)
}
