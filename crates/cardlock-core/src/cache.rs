//! Memoization of decrypted records, invalidated wholesale on lock.
//!
//! The cache is the only place decrypted records live between reads, so
//! clearing it IS the lock transition's confidentiality guarantee. The
//! generation counter makes that race-free: a decrypt that was already in
//! flight when `clear()` ran finds the generation changed and is refused,
//! instead of re-populating the cache with (or serving) plaintext that
//! post-dates the lock.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::VaultError;
use crate::model::CardRecord;

struct CacheInner {
    generation: u64,
    map: HashMap<String, CardRecord>,
}

pub struct DecryptedCache {
    inner: Mutex<CacheInner>,
}

impl DecryptedCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                generation: 0,
                map: HashMap::new(),
            }),
        }
    }

    /// Current generation token. Bumped by every `clear()`.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Return the memoized record for `id`, or run `decrypt` and memoize
    /// its result. The generation is captured before `decrypt` runs and
    /// re-checked under the lock afterwards; if the cache was cleared in
    /// between, the freshly decrypted value is discarded and the call
    /// fails `Locked`.
    pub fn get_or_decrypt<F>(&self, id: &str, decrypt: F) -> Result<CardRecord, VaultError>
    where
        F: FnOnce() -> Result<CardRecord, VaultError>,
    {
        let generation = {
            let inner = self.inner.lock();
            if let Some(hit) = inner.map.get(id) {
                return Ok(hit.clone());
            }
            inner.generation
        };

        // Decrypt outside the lock; it is the slow part.
        let record = decrypt()?;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return Err(VaultError::Locked);
        }
        inner.map.insert(id.to_string(), record.clone());
        Ok(record)
    }

    /// Memoize a record the caller already holds decrypted (e.g. right
    /// after an add/edit). Refused if the cache has been cleared since
    /// `expected_generation` was observed; returns whether it stored.
    pub fn insert(&self, expected_generation: u64, record: CardRecord) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != expected_generation {
            return false;
        }
        inner.map.insert(record.id.clone(), record);
        true
    }

    pub fn invalidate(&self, id: &str) {
        self.inner.lock().map.remove(id);
    }

    /// Drop every entry and bump the generation. Called synchronously on
    /// every unlocked-to-locked transition.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.map.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DecryptedCache {
    fn default() -> Self {
        Self::new()
    }
}
