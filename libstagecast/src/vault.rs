//! Credential vault: authenticated encryption for OAuth secrets
//!
//! Secrets are encrypted with AES-256-GCM under a process-wide 32-byte key
//! and stored as a single base64 string with the layout
//! `nonce(12) || auth_tag(16) || ciphertext`. The layout is load-bearing:
//! previously stored records must keep decrypting across releases.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Key size for AES-256
const KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM
const NONCE_SIZE: usize = 12;

/// GCM authentication tag size
const TAG_SIZE: usize = 16;

/// Encrypts and decrypts credential secrets
pub struct Vault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").field("cipher", &"<redacted>").finish()
    }
}

impl Vault {
    /// Create a vault from a raw 32-byte key
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(&key.into()),
        }
    }

    /// Create a vault from a base64-encoded key, as supplied via
    /// `STAGECAST_ENCRYPTION_KEY`
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyMisconfigured` if the value is empty, is
    /// not valid base64, or does not decode to exactly 32 bytes.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CryptoError> {
        if encoded.trim().is_empty() {
            return Err(CryptoError::KeyMisconfigured(
                "encryption key is not set".to_string(),
            ));
        }

        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::KeyMisconfigured(format!("invalid base64: {}", e)))?;

        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::KeyMisconfigured(format!(
                "expected {} bytes after decoding, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(Self::new(key))
    }

    /// Encrypt a secret into a `base64(nonce || tag || ciphertext)` blob
    ///
    /// A fresh random nonce is generated per call, so encrypting the same
    /// plaintext twice yields different blobs.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EmptyInput` if the secret is empty or
    /// whitespace-only.
    pub fn encrypt(&self, secret: &str) -> Result<String, CryptoError> {
        if secret.trim().is_empty() {
            return Err(CryptoError::EmptyInput);
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        // aes-gcm appends the tag to the ciphertext; the stored layout
        // puts the tag between nonce and ciphertext
        let ct_and_tag = self
            .cipher
            .encrypt(nonce, secret.as_bytes())
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        let (ciphertext, tag) = ct_and_tag.split_at(ct_and_tag.len() - TAG_SIZE);

        let mut blob = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(tag);
        blob.extend_from_slice(ciphertext);

        Ok(general_purpose::STANDARD.encode(blob))
    }

    /// Decrypt a blob produced by [`Vault::encrypt`]
    ///
    /// The returned buffer zeroes itself on drop; callers hold the
    /// plaintext only for the duration of a single outbound call.
    ///
    /// # Errors
    ///
    /// - `CryptoError::EmptyInput` on an empty blob
    /// - `CryptoError::Truncated` if the decoded blob is shorter than
    ///   nonce + tag (28 bytes)
    /// - `CryptoError::AuthenticationFailed` if the tag check fails
    ///   (wrong key, corruption, or tampering) or the blob is not valid
    ///   base64
    pub fn decrypt(&self, blob: &str) -> Result<Zeroizing<String>, CryptoError> {
        if blob.trim().is_empty() {
            return Err(CryptoError::EmptyInput);
        }

        let decoded = general_purpose::STANDARD
            .decode(blob.trim())
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        if decoded.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Truncated);
        }

        let (nonce_bytes, rest) = decoded.split_at(NONCE_SIZE);
        let (tag, ciphertext) = rest.split_at(TAG_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let mut ct_and_tag = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
        ct_and_tag.extend_from_slice(ciphertext);
        ct_and_tag.extend_from_slice(tag);

        let plaintext = self
            .cipher
            .decrypt(nonce, ct_and_tag.as_slice())
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}
