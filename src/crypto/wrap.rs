//! RSA-OAEP wrapping of the master key for the Subscribe handshake.
//!
//! A processing worker generates its keypair in memory at startup and sends
//! only the public half to the main worker. The wrapped blob that comes back
//! is opaque bytes; the private key never leaves the worker process.

use rsa::{
    pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding},
    traits::PublicKeyParts,
    Oaep, RsaPrivateKey, RsaPublicKey,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use super::aead::{CryptoError, CryptoResult, MasterKey, KEY_SIZE};

/// Smallest accepted worker public key. Subscribe rejects anything below.
pub const MIN_RSA_BITS: usize = 2048;

/// Encrypt the master key to a PEM-encoded worker public key.
///
/// OAEP with SHA-256 (the `rsa` crate pairs MGF1 with the same digest) and
/// an empty label.
pub fn wrap_for_worker(master: &MasterKey, pub_pem: &str) -> CryptoResult<Vec<u8>> {
    let public = RsaPublicKey::from_public_key_pem(pub_pem)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

    if public.size() * 8 < MIN_RSA_BITS {
        return Err(CryptoError::InvalidPublicKey(format!(
            "key is smaller than {MIN_RSA_BITS} bits"
        )));
    }

    public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), master.bytes())
        .map_err(|_| CryptoError::WrapFailed)
}

/// Short stable digest of a wrapped key blob, recorded in the worker
/// registry so operators can correlate a worker with the wrap it received.
pub fn wrapped_key_fingerprint(wrapped: &[u8]) -> String {
    let digest = Sha256::digest(wrapped);
    hex::encode(&digest[..8])
}

/// A processing worker's in-memory RSA keypair.
pub struct WorkerKeyPair {
    private: RsaPrivateKey,
    public_pem: String,
}

impl WorkerKeyPair {
    /// Generate a fresh 2048-bit keypair. Done once per worker process.
    pub fn generate() -> CryptoResult<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, MIN_RSA_BITS)
            .map_err(|_| CryptoError::WrapFailed)?;
        let public_pem = private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|_| CryptoError::WrapFailed)?;
        Ok(Self { private, public_pem })
    }

    /// PEM of the public half, sent in the SubscribeRequest.
    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    /// Recover the master key from a Subscribe response.
    pub fn unwrap_master(&self, wrapped: &[u8]) -> CryptoResult<MasterKey> {
        let raw = self
            .private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|_| CryptoError::WrapFailed)?;
        let bytes: [u8; KEY_SIZE] =
            raw.try_into().map_err(|v: Vec<u8>| CryptoError::InvalidKeySize {
                expected: KEY_SIZE,
                actual: v.len(),
            })?;
        Ok(MasterKey::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let master = MasterKey::generate();
        let pair = WorkerKeyPair::generate().unwrap();
        let wrapped = wrap_for_worker(&master, pair.public_pem()).unwrap();
        let recovered = pair.unwrap_master(&wrapped).unwrap();
        assert_eq!(recovered.key_id(), master.key_id());
    }

    #[test]
    fn test_wrapped_blob_hides_key_bytes() {
        let master = MasterKey::generate();
        let pair = WorkerKeyPair::generate().unwrap();
        let wrapped = wrap_for_worker(&master, pair.public_pem()).unwrap();
        assert!(!wrapped
            .windows(KEY_SIZE)
            .any(|w| w == master.bytes().as_slice()));
    }

    #[test]
    fn test_malformed_pem_rejected() {
        let master = MasterKey::generate();
        let err = wrap_for_worker(&master, "not a pem").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPublicKey(_)));
    }

    #[test]
    fn test_wrong_private_key_cannot_unwrap() {
        let master = MasterKey::generate();
        let pair = WorkerKeyPair::generate().unwrap();
        let other = WorkerKeyPair::generate().unwrap();
        let wrapped = wrap_for_worker(&master, pair.public_pem()).unwrap();
        assert!(other.unwrap_master(&wrapped).is_err());
    }

    #[test]
    fn test_fingerprint_is_short_hex() {
        let fp = wrapped_key_fingerprint(b"opaque-bytes");
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
