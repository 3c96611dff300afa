//! cardlock_core — local encrypted vault for payment-card records
//!
//! # Security model
//! - Sensitive fields (card number, expiry, security code) exist in
//!   storage only as AEAD blobs under a device-bound key
//!   (`cardlock_crypto`). Plaintext lives in memory, inside the
//!   decrypted cache, and only while a session is unlocked.
//! - `SessionGuard` is the single authority on whether decryption and
//!   display are permitted: locked on start, unlocked by the platform
//!   authenticator, relocked by idle timeout (background time included)
//!   or explicit request. Every lock clears the cache synchronously.
//! - Export/import uses a self-describing `.qcx` container: the record
//!   set is re-encrypted under a one-time key, which is itself wrapped
//!   by the device key.
//!
//! # Module layout
//! - `model`     — card record and display helpers
//! - `store`     — storage collaborator trait + in-memory reference
//! - `session`   — lock state machine + authenticator contract
//! - `cache`     — decrypted-record memoization, cleared on lock
//! - `container` — `.qcx` export container codec
//! - `reconcile` — import validation, duplicate detection, merge
//! - `vault`     — the wired-together facade
//! - `settings`  — persisted preferences (lock timeout)
//! - `paths`     — platform data/config directories
//! - `error`     — unified error type

pub mod cache;
pub mod container;
pub mod error;
pub mod model;
pub mod paths;
pub mod reconcile;
pub mod session;
pub mod settings;
pub mod store;
pub mod vault;

pub use cache::DecryptedCache;
pub use error::VaultError;
pub use model::CardRecord;
pub use reconcile::ImportOutcome;
pub use session::{AuthErrorCode, AuthOutcome, Authenticator, SessionGuard};
pub use settings::VaultSettings;
pub use store::{CardStore, MemoryCardStore, StoreEvent};
pub use vault::CardVault;
