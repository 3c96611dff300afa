//! cardlock_crypto — cryptographic primitives for the Cardlock vault
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - The device key never leaves the provider; callers only see the
//!   encrypt/decrypt contract.
//! - Zeroize secret material on drop.
//!
//! # Module layout
//! - `aead`     — ChaCha20-Poly1305 seal/open helpers
//! - `provider` — device-bound key providers (OS keyring, software)
//! - `field`    — string-level field encryption (base64 blobs)
//! - `error`    — unified error type

pub mod aead;
pub mod error;
pub mod field;
pub mod provider;

pub use error::CryptoError;
pub use field::FieldCipher;
pub use provider::{CryptoKeyProvider, KeyringKeyProvider, SoftwareKeyProvider};
