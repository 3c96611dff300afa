//! String-level field encryption.
//!
//! Sensitive record fields (card number, expiry, security code) are stored
//! as a single opaque string: base64 of the provider's `[nonce | ct+tag]`
//! blob. Nonce and tag lengths are fixed constants, so the decoder can
//! slice the blob without extra metadata.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};

use crate::error::CryptoError;
use crate::provider::CryptoKeyProvider;

/// Encrypts and decrypts individual text fields under the device key.
///
/// Cheap to clone; shares the underlying provider.
#[derive(Clone)]
pub struct FieldCipher {
    provider: Arc<dyn CryptoKeyProvider>,
}

impl FieldCipher {
    pub fn new(provider: Arc<dyn CryptoKeyProvider>) -> Self {
        Self { provider }
    }

    /// Encrypt a field value. Every call uses a fresh nonce, so the same
    /// value encrypts to a different string each time.
    pub fn encrypt_field(&self, value: &str) -> Result<String, CryptoError> {
        let blob = self.provider.encrypt(value.as_bytes())?;
        Ok(general_purpose::STANDARD.encode(blob))
    }

    /// Decrypt a field value produced by `encrypt_field`.
    ///
    /// Any failure (bad base64, truncated blob, tag mismatch, invalid
    /// UTF-8) is `DecryptionFailed`. Callers must treat that as an error,
    /// never as "the stored value happened to be plaintext".
    pub fn decrypt_field(&self, encoded: &str) -> Result<String, CryptoError> {
        let blob = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let plaintext = self.provider.decrypt(&blob)?;
        String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::DecryptionFailed)
    }
}
