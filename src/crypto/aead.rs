//! AES-256-GCM sealing of entity payloads.
//!
//! The AEAD output of `aes-gcm` is `ciphertext || tag`; the persistence
//! layer stores the two parts separately (blob file carries the bare
//! ciphertext, metadata carries base64 of nonce and tag), so [`EntityCipher`]
//! splits on seal and rejoins on open.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key size in bytes (256 bits).
pub const KEY_SIZE: usize = 32;
/// Nonce size in bytes (96 bits). Never reused under the same key.
pub const NONCE_SIZE: usize = 12;
/// GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Crypto subsystem errors.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Invalid key size
    #[error("invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    /// Invalid nonce or tag size in stored metadata
    #[error("invalid {field} size: expected {expected}, got {actual}")]
    InvalidFieldSize {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// Authentication failure on open: tampered ciphertext, wrong nonce or
    /// tag, or a different key
    #[error("decryption failed: authentication error")]
    AuthFailed,

    /// Malformed or undersized public key supplied for wrapping
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// RSA wrap/unwrap failure
    #[error("key wrapping failed")]
    WrapFailed,
}

pub type CryptoResult<T> = Result<T, CryptoError>;

// ============================================================================
// Master Key
// ============================================================================

/// The deployment-wide 32-byte symmetric key.
///
/// The `key_id` is derived from the key bytes, so every process that holds
/// the same key derives the same id without coordination. The id is safe to
/// log and persist; the bytes are not.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
    #[zeroize(skip)]
    key_id: String,
}

impl MasterKey {
    /// Wrap existing key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        let digest = Sha256::digest(bytes);
        let key_id = format!("key-{}", hex::encode(&digest[..4]));
        Self { bytes, key_id }
    }

    /// Generate a fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    /// Parse a hex-encoded 32-byte key (the `DELTADB_MASTER_KEY` format).
    pub fn from_hex(encoded: &str) -> CryptoResult<Self> {
        let raw = hex::decode(encoded.trim()).map_err(|_| CryptoError::InvalidKeySize {
            expected: KEY_SIZE,
            actual: 0,
        })?;
        let bytes: [u8; KEY_SIZE] =
            raw.try_into().map_err(|v: Vec<u8>| CryptoError::InvalidKeySize {
                expected: KEY_SIZE,
                actual: v.len(),
            })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Stable identifier recorded in entity metadata and worker records.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub(crate) fn bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key bytes must never reach Debug output.
        f.debug_struct("MasterKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Entity Cipher
// ============================================================================

/// Result of sealing one entity version.
pub struct SealedEntity {
    /// Bare ciphertext, tag stripped. Written to the `.json.enc` blob.
    pub ciphertext: Vec<u8>,
    /// The fresh 12-byte nonce drawn for this write.
    pub nonce: [u8; NONCE_SIZE],
    /// The 16-byte GCM tag.
    pub tag: [u8; TAG_SIZE],
}

/// AES-256-GCM cipher bound to the master key.
pub struct EntityCipher {
    cipher: Aes256Gcm,
    key_id: String,
}

impl EntityCipher {
    pub fn new(key: &MasterKey) -> Self {
        // new_from_slice cannot fail for a [u8; 32] input.
        let cipher = Aes256Gcm::new_from_slice(key.bytes()).expect("32-byte key");
        Self {
            cipher,
            key_id: key.key_id().to_string(),
        }
    }

    /// `key_id` of the key this cipher seals under.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Encrypt a payload with a fresh nonce and empty AAD, splitting the
    /// trailing GCM tag out of the AEAD output.
    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<SealedEntity> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let mut out = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let split = out.len() - TAG_SIZE;
        let tag_bytes = out.split_off(split);
        let tag: [u8; TAG_SIZE] = tag_bytes.try_into().map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(SealedEntity {
            ciphertext: out,
            nonce,
            tag,
        })
    }

    /// Decrypt a stored blob. Any mismatch between ciphertext, nonce, tag,
    /// and key collapses to [`CryptoError::AuthFailed`]; callers must not
    /// reveal which input was wrong.
    pub fn open(&self, ciphertext: &[u8], nonce: &[u8], tag: &[u8]) -> CryptoResult<Vec<u8>> {
        if nonce.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidFieldSize {
                field: "nonce",
                expected: NONCE_SIZE,
                actual: nonce.len(),
            });
        }
        if tag.len() != TAG_SIZE {
            return Err(CryptoError::InvalidFieldSize {
                field: "tag",
                expected: TAG_SIZE,
                actual: tag.len(),
            });
        }

        let mut joined = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
        joined.extend_from_slice(ciphertext);
        joined.extend_from_slice(tag);

        self.cipher
            .decrypt(Nonce::from_slice(nonce), joined.as_slice())
            .map_err(|_| CryptoError::AuthFailed)
    }
}
