//! Device-bound key providers.
//!
//! The vault encrypts every sensitive field under a single persistent
//! 256-bit AEAD key that is confined to this device. The key is created
//! lazily the first time a provider is opened and is never handed to
//! callers; the provider exposes only the encrypt/decrypt contract.
//!
//! Unlock gating is NOT enforced here. The session layer decides whether a
//! decrypt is currently permitted; the key layer stays usable at all times
//! so that storage writes (which always produce ciphertext) never depend on
//! session state.
//!
//! Implementations:
//! - `KeyringKeyProvider`  — key stored base64 in the OS credential store
//!   (Windows Credential Manager, macOS Keychain, Linux Secret Service).
//! - `SoftwareKeyProvider` — random in-memory key; for tests and for
//!   platforms without a usable credential store.

use keyring::Entry;
use zeroize::Zeroizing;

use crate::aead::{self, KEY_LEN};
use crate::error::CryptoError;
use base64::{engine::general_purpose, Engine as _};

const SERVICE_NAME: &str = "Cardlock";
const DEVICE_KEY_ENTRY: &str = "device_key";

/// Encrypt/decrypt under a key the caller can never observe.
///
/// Output and input use the `aead` wire format: `[nonce | ciphertext+tag]`.
pub trait CryptoKeyProvider: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}

// ── OS keyring ──────────────────────────────────────────────────────────────

/// Device key held in the platform credential store.
///
/// Opening the provider reads the key into process memory once; the
/// credential store is not consulted again for the lifetime of the value.
pub struct KeyringKeyProvider {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl KeyringKeyProvider {
    /// Load the device key, generating and persisting a fresh one if this
    /// is the first run. A credential store that cannot be reached is a
    /// fatal initialization error; there is no plaintext fallback.
    pub fn open_or_create() -> Result<Self, CryptoError> {
        let entry = Entry::new(SERVICE_NAME, DEVICE_KEY_ENTRY)
            .map_err(|e| CryptoError::KeyStoreUnavailable(e.to_string()))?;

        let key = match entry.get_password() {
            Ok(encoded) => decode_key(&encoded)?,
            Err(keyring::Error::NoEntry) => {
                let key = aead::generate_key();
                let encoded = general_purpose::STANDARD.encode(key.as_ref());
                entry
                    .set_password(&encoded)
                    .map_err(|e| CryptoError::KeyStoreUnavailable(e.to_string()))?;
                tracing::info!("generated new device key in credential store");
                key
            }
            Err(e) => return Err(CryptoError::KeyStoreUnavailable(e.to_string())),
        };

        Ok(Self { key })
    }

    /// Remove the device key from the credential store. Existing ciphertext
    /// becomes permanently unreadable.
    pub fn delete_persisted_key() -> Result<(), CryptoError> {
        let entry = Entry::new(SERVICE_NAME, DEVICE_KEY_ENTRY)
            .map_err(|e| CryptoError::KeyStoreUnavailable(e.to_string()))?;
        match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CryptoError::KeyStoreUnavailable(e.to_string())),
        }
    }
}

impl CryptoKeyProvider for KeyringKeyProvider {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        aead::seal(&self.key, plaintext)
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        aead::open(&self.key, blob)
    }
}

fn decode_key(encoded: &str) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::InvalidKey(format!("decode device key: {e}")))?;
    if decoded.len() != KEY_LEN {
        return Err(CryptoError::InvalidKey("device key wrong length".into()));
    }
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&decoded);
    Ok(key)
}

// ── Software key ────────────────────────────────────────────────────────────

/// In-memory key with no persistence. The key is zeroized on drop.
pub struct SoftwareKeyProvider {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl SoftwareKeyProvider {
    pub fn random() -> Self {
        Self {
            key: aead::generate_key(),
        }
    }

    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }
}

impl CryptoKeyProvider for SoftwareKeyProvider {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        aead::seal(&self.key, plaintext)
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        aead::open(&self.key, blob)
    }
}
