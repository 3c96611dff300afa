use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key store unavailable: {0}")]
    KeyStoreUnavailable(String),

    #[error("AEAD encryption failed")]
    EncryptionFailed,

    #[error("AEAD decryption failed (authentication tag mismatch, possible tampering)")]
    DecryptionFailed,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}
