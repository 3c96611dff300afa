use thiserror::Error;

use cardlock_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Vault is locked — authenticate first")]
    Locked,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    #[error("Container failed authentication (corrupt data or wrong device key)")]
    CorruptData,

    #[error("Record validation failed: {0}")]
    ValidationFailed(String),

    #[error("Authentication cancelled")]
    AuthenticationCancelled,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Authentication locked out: {0}")]
    AuthenticationLockedOut(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Store(String),

    #[error("Background task aborted: {0}")]
    TaskAborted(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
