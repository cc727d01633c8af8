//! # DeltaDatabase
//!
//! A small two-tier encrypted key-value store. A front-tier **main worker**
//! accepts client traffic over REST and RPC and coordinates back-tier
//! **processing workers** that own the on-disk state: entities are JSON
//! documents, optionally validated against a registered JSON Schema,
//! sealed with AES-256-GCM, and persisted as blob + metadata file pairs on
//! a filesystem shared by all workers.
//!
//! ## Architecture
//!
//! - `error`: cross-cutting error kinds with REST and RPC mappings
//! - `naming`: central charset validation for names that become paths
//! - `store`: atomic persistence with cross-process advisory locking
//! - `crypto`: AES-GCM sealing and RSA-OAEP master-key wrapping
//! - `schema`: persistent Draft-07 schema registry with compiled validators
//! - `cache`: bounded write-through LRU of decrypted plaintext
//! - `auth`: RBAC keys, session tokens, strict bearer parsing
//! - `registry`: subscribed-worker table with TTL and round-robin routing
//! - `rpc`: the JSON wire codec, error envelope, and client
//! - `worker`: the processing worker's `Process(GET|PUT)` pipelines
//! - `api`: the main worker's REST and RPC surfaces
//! - `config`: CLI flags and environment for both binaries

// Cross-cutting foundations
pub mod error;
pub mod naming;

// Persistence and crypto
pub mod crypto;
pub mod store;

// Registries and caches
pub mod cache;
pub mod registry;
pub mod schema;

// Credentials
pub mod auth;

// Wire protocol
pub mod rpc;

// Workers and surfaces
pub mod api;
pub mod worker;

// Process configuration
pub mod config;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
