//! The wired-together vault: storage, field crypto, session, cache.
//!
//! `CardVault` is an explicitly constructed object graph, not a process
//! global. Whatever owns the application lifetime builds one and hands
//! out clones (the handle is cheap to clone; all parts are shared).
//!
//! Reads decrypt through the cache and are permitted only while the
//! session guard reports unlocked; the unlock epoch is re-checked after
//! every decrypt so a lock racing a read wins. Container pack/unpack are
//! CPU-bound and run on the blocking pool, never on the caller's task.

use std::sync::Arc;

use tokio::task;
use tracing::{debug, info};

use cardlock_crypto::{CryptoKeyProvider, FieldCipher};

use crate::cache::DecryptedCache;
use crate::container;
use crate::error::VaultError;
use crate::model::{self, CardRecord};
use crate::reconcile::{self, ImportOutcome};
use crate::session::SessionGuard;
use crate::settings::VaultSettings;
use crate::store::CardStore;

#[derive(Clone)]
pub struct CardVault {
    store: Arc<dyn CardStore>,
    provider: Arc<dyn CryptoKeyProvider>,
    cipher: FieldCipher,
    session: Arc<SessionGuard>,
    cache: Arc<DecryptedCache>,
}

impl CardVault {
    pub fn new(
        store: Arc<dyn CardStore>,
        provider: Arc<dyn CryptoKeyProvider>,
        settings: &VaultSettings,
    ) -> Self {
        let cache = Arc::new(DecryptedCache::new());
        let session = Arc::new(SessionGuard::new(settings.lock_timeout(), cache.clone()));
        let cipher = FieldCipher::new(provider.clone());
        Self {
            store,
            provider,
            cipher,
            session,
            cache,
        }
    }

    pub fn session(&self) -> &Arc<SessionGuard> {
        &self.session
    }

    pub fn store(&self) -> &Arc<dyn CardStore> {
        &self.store
    }

    // ── CRUD ────────────────────────────────────────────────────────────────

    /// Encrypt and persist a new record (plaintext in, id assigned if
    /// absent). The decrypted form is memoized so the following read does
    /// not pay for a decrypt.
    pub async fn add_card(&self, mut record: CardRecord) -> Result<CardRecord, VaultError> {
        self.session.ensure_unlocked()?;
        if record.id.is_empty() {
            record.id = uuid::Uuid::new_v4().to_string();
        }
        record.color = model::normalize_color(&record.color, &record.issuer);

        let generation = self.cache.generation();
        let stored = self.encrypt_sensitive(&record)?;
        self.store.insert(stored).await?;
        self.cache.insert(generation, record.clone());
        debug!(id = %record.id, "card added");
        Ok(record)
    }

    /// Re-encrypt and persist an edited record; bumps `updated_at`.
    pub async fn update_card(&self, mut record: CardRecord) -> Result<CardRecord, VaultError> {
        self.session.ensure_unlocked()?;
        record.updated_at = chrono::Utc::now();
        record.color = model::normalize_color(&record.color, &record.issuer);

        let generation = self.cache.generation();
        let stored = self.encrypt_sensitive(&record)?;
        self.store.update(stored).await?;
        self.cache.insert(generation, record.clone());
        debug!(id = %record.id, "card updated");
        Ok(record)
    }

    pub async fn delete_card(&self, id: &str) -> Result<(), VaultError> {
        self.store.delete(id).await?;
        self.cache.invalidate(id);
        Ok(())
    }

    pub async fn delete_all(&self) -> Result<(), VaultError> {
        self.store.delete_all().await?;
        self.cache.clear();
        info!("all cards deleted");
        Ok(())
    }

    // ── Gated reads ─────────────────────────────────────────────────────────

    /// Decrypted record by id. Fails `Locked` unless an authenticated
    /// session is live, including when the session ends mid-read.
    pub async fn card(&self, id: &str) -> Result<CardRecord, VaultError> {
        let epoch = self.session.ensure_unlocked()?;
        let row = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
        let record = self
            .cache
            .get_or_decrypt(id, || self.decrypt_sensitive(&row))?;
        if self.session.verify_epoch(epoch).is_err() {
            self.cache.invalidate(id);
            return Err(VaultError::Locked);
        }
        Ok(record)
    }

    /// All records, decrypted, in stable storage order.
    pub async fn cards(&self) -> Result<Vec<CardRecord>, VaultError> {
        let epoch = self.session.ensure_unlocked()?;
        let rows = self.store.get_all().await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let record = self
                .cache
                .get_or_decrypt(&row.id, || self.decrypt_sensitive(&row))?;
            out.push(record);
        }
        if self.session.verify_epoch(epoch).is_err() {
            return Err(VaultError::Locked);
        }
        Ok(out)
    }

    // ── Export / import ─────────────────────────────────────────────────────

    /// Produce `.qcx` container bytes for the full record set. The result
    /// is buffered fully in memory; a caller that abandons the export
    /// simply drops the buffer, leaving no partial file anywhere.
    pub async fn export_container(&self) -> Result<Vec<u8>, VaultError> {
        self.session.ensure_unlocked()?;
        let rows = self.store.get_all().await?;
        let mut plain = Vec::with_capacity(rows.len());
        for row in &rows {
            plain.push(self.decrypt_sensitive(row)?);
        }
        info!(records = plain.len(), "packing export container");

        let provider = self.provider.clone();
        task::spawn_blocking(move || container::pack(&plain, provider.as_ref()))
            .await
            .map_err(|e| VaultError::TaskAborted(e.to_string()))?
    }

    /// Unpack and reconcile a container. The container is fully verified
    /// before the first insert, so a corrupt or foreign file changes
    /// nothing.
    pub async fn import_container(
        &self,
        bytes: Vec<u8>,
        force_import: bool,
    ) -> Result<ImportOutcome, VaultError> {
        self.session.ensure_unlocked()?;

        let provider = self.provider.clone();
        let candidates = task::spawn_blocking(move || container::unpack(&bytes, provider.as_ref()))
            .await
            .map_err(|e| VaultError::TaskAborted(e.to_string()))??;
        info!(candidates = candidates.len(), force_import, "importing container");

        // Decrypted views may be stale after a merge; start from scratch.
        self.cache.clear();
        reconcile::reconcile(candidates, self.store.as_ref(), &self.cipher, force_import).await
    }

    // ── Field helpers ───────────────────────────────────────────────────────

    fn encrypt_sensitive(&self, record: &CardRecord) -> Result<CardRecord, VaultError> {
        let mut out = record.clone();
        out.card_number = self.cipher.encrypt_field(&record.card_number)?;
        out.expiry_date = self.cipher.encrypt_field(&record.expiry_date)?;
        out.security_code = self.cipher.encrypt_field(&record.security_code)?;
        Ok(out)
    }

    fn decrypt_sensitive(&self, record: &CardRecord) -> Result<CardRecord, VaultError> {
        let mut out = record.clone();
        out.card_number = self.cipher.decrypt_field(&record.card_number)?;
        out.expiry_date = self.cipher.decrypt_field(&record.expiry_date)?;
        out.security_code = self.cipher.decrypt_field(&record.security_code)?;
        Ok(out)
    }
}
