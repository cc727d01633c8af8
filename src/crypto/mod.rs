//! # Encryption at Rest
//!
//! Cryptographic primitives for the persistence pipeline:
//!
//! - **Master key** ([`MasterKey`]): the 32-byte AES key shared by all
//!   workers of a deployment, referenced everywhere by its stable `key_id`.
//! - **Sealing** ([`EntityCipher`]): AES-256-GCM with a fresh 12-byte nonce
//!   per write and the 16-byte tag carried separately in entity metadata.
//! - **Key wrapping** ([`wrap_for_worker`], [`WorkerKeyPair`]): RSA-OAEP
//!   (SHA-256) transport of the master key to a subscribing worker's
//!   in-memory keypair.
//!
//! Key material is zeroized on drop and never serialized, logged, or written
//! to the shared filesystem.

mod aead;
mod wrap;

pub use aead::{CryptoError, CryptoResult, EntityCipher, MasterKey, SealedEntity, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use wrap::{wrap_for_worker, wrapped_key_fingerprint, WorkerKeyPair, MIN_RSA_BITS};
