//! Secure export container (`.qcx`).
//!
//! A container re-encrypts the full record set under a one-time export
//! key, then wraps that key under the device key so only this device can
//! open the file. Wrapping a fresh key (rather than encrypting the payload
//! under the device key directly) bounds how much ciphertext the
//! long-lived key ever covers and keeps the file self-describing.
//!
//! Byte layout (integers big-endian, fixed widths):
//!
//!   | offset | field                     | size      |
//!   |--------|---------------------------|-----------|
//!   | 0      | magic                     | 18        |
//!   | 18     | wrapped-key length        | 4         |
//!   | 22     | wrapped key (nonce|ct|tag)| variable  |
//!   | ...    | export nonce              | 12        |
//!   | ...    | ciphertext + tag          | remainder |
//!
//! The magic is validated before any cryptographic work so non-container
//! files are rejected cheaply. Truncation and bad lengths are
//! `InvalidContainer`; an AEAD tag failure (tampering, wrong device) is
//! `CorruptData`. Unpack never yields a partial record list.

use zeroize::Zeroizing;

use cardlock_crypto::aead::{self, KEY_LEN, NONCE_LEN, TAG_LEN};
use cardlock_crypto::{CryptoError, CryptoKeyProvider};

use crate::error::VaultError;
use crate::model::CardRecord;

pub const CONTAINER_MAGIC: &[u8] = b"CARDLOCK_SECURE_V1";
pub const FILE_EXTENSION: &str = "qcx";

const KEY_LEN_FIELD: usize = 4;
/// A wrapped 32-byte key in aead wire format.
const WRAPPED_KEY_LEN: usize = NONCE_LEN + KEY_LEN + TAG_LEN;

pub fn format_info() -> &'static str {
    "Cardlock encrypted export format v1"
}

/// Cheap magic check; lets callers reject arbitrary files before paying
/// for any decryption.
pub fn is_container(bytes: &[u8]) -> bool {
    bytes.len() >= CONTAINER_MAGIC.len() && &bytes[..CONTAINER_MAGIC.len()] == CONTAINER_MAGIC
}

/// Package `records` (sensitive fields in plaintext) into an encrypted
/// container. The export key lives only in zeroized buffers here and in
/// wrapped form inside the output.
pub fn pack(
    records: &[CardRecord],
    provider: &dyn CryptoKeyProvider,
) -> Result<Vec<u8>, VaultError> {
    let payload = Zeroizing::new(serde_json::to_vec(records)?);

    let export_key = aead::generate_key();
    let sealed = aead::seal(&export_key, &payload)?;
    let wrapped_key = provider.encrypt(export_key.as_ref())?;

    let mut out = Vec::with_capacity(
        CONTAINER_MAGIC.len() + KEY_LEN_FIELD + wrapped_key.len() + sealed.len(),
    );
    out.extend_from_slice(CONTAINER_MAGIC);
    out.extend_from_slice(&(wrapped_key.len() as u32).to_be_bytes());
    out.extend_from_slice(&wrapped_key);
    // `sealed` is already nonce-first, matching the layout above.
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a container produced by `pack` on this device.
pub fn unpack(
    bytes: &[u8],
    provider: &dyn CryptoKeyProvider,
) -> Result<Vec<CardRecord>, VaultError> {
    if !is_container(bytes) {
        return Err(VaultError::InvalidContainer(
            "missing or unknown header".into(),
        ));
    }
    let mut offset = CONTAINER_MAGIC.len();

    if bytes.len() < offset + KEY_LEN_FIELD {
        return Err(VaultError::InvalidContainer("truncated key length".into()));
    }
    let key_len = u32::from_be_bytes(
        bytes[offset..offset + KEY_LEN_FIELD]
            .try_into()
            .map_err(|_| VaultError::InvalidContainer("truncated key length".into()))?,
    ) as usize;
    offset += KEY_LEN_FIELD;

    if key_len != WRAPPED_KEY_LEN {
        return Err(VaultError::InvalidContainer(format!(
            "wrapped key length {key_len} out of range"
        )));
    }
    if bytes.len() < offset + key_len + NONCE_LEN + TAG_LEN {
        return Err(VaultError::InvalidContainer("truncated payload".into()));
    }

    let wrapped_key = &bytes[offset..offset + key_len];
    offset += key_len;

    let export_key = unwrap_export_key(wrapped_key, provider)?;
    let plaintext = aead::open(&export_key, &bytes[offset..]).map_err(map_aead_error)?;

    let records: Vec<CardRecord> = serde_json::from_slice(&plaintext)
        .map_err(|e| VaultError::InvalidContainer(format!("payload parse: {e}")))?;
    Ok(records)
}

fn unwrap_export_key(
    wrapped: &[u8],
    provider: &dyn CryptoKeyProvider,
) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultError> {
    let raw = provider.decrypt(wrapped).map_err(map_aead_error)?;
    if raw.len() != KEY_LEN {
        return Err(VaultError::CorruptData);
    }
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&raw);
    Ok(key)
}

fn map_aead_error(err: CryptoError) -> VaultError {
    match err {
        CryptoError::DecryptionFailed => VaultError::CorruptData,
        other => VaultError::Crypto(other),
    }
}
