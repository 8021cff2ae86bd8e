//! Field-level encryption for data at rest.
//!
//! Goal text, step actions, and profile fields are sealed with AES-256-GCM
//! before they reach the database. The stored form is `nonce || ciphertext`
//! with a fresh 12-byte random nonce per value, so identical plaintexts
//! produce distinct ciphertexts.
//!
//! Decryption failures are typed: callers that read historical rows (for
//! example after a key rotation) skip unreadable records instead of failing
//! the whole request.

use aes_gcm::aead::{Aead, AeadCore, OsRng};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of the random nonce prefixed to every stored ciphertext.
pub const NONCE_LEN: usize = 12;

/// Error produced when sealing or opening a stored field.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encrypt,
    #[error("ciphertext too short to contain a nonce")]
    Truncated,
    #[error("decryption failed (wrong key or corrupted ciphertext)")]
    Decrypt,
    #[error("decrypted bytes are not valid UTF-8")]
    NotUtf8,
}

/// Symmetric cipher applied to every encrypted column.
///
/// The AES-256 key is derived from the configured secret with SHA-256, so
/// any non-empty secret string works; key hygiene is the operator's concern.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    /// Derive the AES-256 key from `secret` and build the cipher.
    pub fn new(secret: &str) -> Self {
        let key = Sha256::digest(secret.as_bytes());
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Seal `plaintext`, returning `nonce || ciphertext` ready for storage.
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Open a stored `nonce || ciphertext` value.
    pub fn decrypt(&self, stored: &[u8]) -> Result<String, CryptoError> {
        if stored.len() < NONCE_LEN {
            return Err(CryptoError::Truncated);
        }
        let (nonce, sealed) = stored.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(plain).map_err(|_| CryptoError::NotUtf8)
    }
}
