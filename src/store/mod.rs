//! # Durable Entity Storage
//!
//! One entity is a pair of sibling files on the shared filesystem:
//!
//! ```text
//! files/{database}_{key}.json.enc    ciphertext, no tag, no header
//! files/{database}_{key}.meta.json   plaintext JSON metadata
//! files/{database}_{key}.lock        advisory lock file (persists, may be empty)
//! ```
//!
//! Multiple worker processes share the directory, so mutual exclusion is a
//! cross-process advisory file lock, not an in-process mutex. Writes go to
//! `*.tmp-{rand}` siblings, are fsynced, and are renamed over the target so a
//! reader never observes a half-written file.

mod filestore;

pub use filestore::{EntityMetadata, FileStore, StoreError, StoreResult, ENTITY_ALG};
