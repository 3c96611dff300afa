//! Authenticated Encryption with Associated Data
//!
//! Uses ChaCha20-Poly1305 (IETF variant).
//! Key size: 32 bytes.  Nonce: 12 bytes (random).  Tag: 16 bytes.
//!
//! Ciphertext wire format:
//!   [ nonce (12 bytes) | ciphertext + tag ]

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Generate a fresh random 32-byte AEAD key.
pub fn generate_key() -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    rand::rngs::OsRng.fill_bytes(key.as_mut());
    key
}

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` with a 32-byte key, prepending a random 12-byte nonce.
/// The nonce is freshly generated on every call; identical plaintext never
/// produces identical output.
pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailed)?;
    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    // Prepend nonce
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt wire-format bytes (nonce || ciphertext+tag).
///
/// A blob too short to hold a nonce and tag, or one whose tag fails to
/// verify, yields `DecryptionFailed` rather than garbage plaintext.
pub fn open(key: &[u8; KEY_LEN], data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let (nonce_bytes, ct) = data.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?;

    let plaintext = cipher
        .decrypt(nonce, ct)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    Ok(Zeroizing::new(plaintext))
}

/// Encrypt a 32-byte key with another 32-byte wrapping key (key transport).
pub fn wrap_key(wrap_key: &[u8; KEY_LEN], key_to_wrap: &[u8; KEY_LEN]) -> Result<Vec<u8>, CryptoError> {
    seal(wrap_key, key_to_wrap)
}

/// Decrypt a wrapped key.
pub fn unwrap_key(wrap_key: &[u8; KEY_LEN], wrapped: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let plaintext = open(wrap_key, wrapped)?;
    if plaintext.len() != KEY_LEN {
        return Err(CryptoError::InvalidKey("Unwrapped key wrong length".into()));
    }
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    out.copy_from_slice(&plaintext);
    Ok(out)
}
