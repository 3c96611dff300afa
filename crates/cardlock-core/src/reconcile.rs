//! Import reconciliation: validate, detect duplicates, merge.
//!
//! Candidates arrive decrypted (from a just-unpacked container). Each one
//! is structurally validated, checked against the fingerprints of every
//! record already in the store, and on acceptance re-encrypted under this
//! device's key with a brand-new id. Imported ids are never reused; a
//! container produced on another install may collide with local ids.
//!
//! The two-phase flow: callers run with `force_import = false` first,
//! show the duplicate count, and only re-run with `force_import = true`
//! on explicit user confirmation. The first pass inserts nothing it
//! counted as a duplicate.

use std::collections::HashSet;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use cardlock_crypto::FieldCipher;

use crate::error::VaultError;
use crate::model::{self, CardRecord};
use crate::store::CardStore;

pub const MIN_CARD_DIGITS: usize = 13;
pub const MAX_CARD_DIGITS: usize = 19;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    pub imported: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

/// Merge `candidates` into the store.
///
/// Returns how many records were imported, skipped as duplicates, and
/// rejected as structurally invalid. The existing fingerprint set is
/// computed once per call; with `force_import` it is skipped entirely,
/// since nothing would consult it.
pub async fn reconcile(
    candidates: Vec<CardRecord>,
    store: &dyn CardStore,
    cipher: &FieldCipher,
    force_import: bool,
) -> Result<ImportOutcome, VaultError> {
    let existing = if force_import {
        HashSet::new()
    } else {
        existing_fingerprints(store, cipher).await?
    };

    let mut outcome = ImportOutcome::default();
    for candidate in candidates {
        if let Err(reason) = validate(&candidate) {
            debug!(%reason, "rejecting invalid import candidate");
            outcome.invalid += 1;
            continue;
        }

        let fingerprint = candidate.fingerprint();
        if !force_import && existing.contains(&fingerprint) {
            outcome.duplicates += 1;
            continue;
        }

        let now = Utc::now();
        let color = model::normalize_color(&candidate.color, &candidate.issuer);
        let accepted = CardRecord {
            id: Uuid::new_v4().to_string(),
            card_number: cipher.encrypt_field(&candidate.card_number)?,
            expiry_date: cipher.encrypt_field(&candidate.expiry_date)?,
            security_code: cipher.encrypt_field(&candidate.security_code)?,
            color,
            created_at: now,
            updated_at: now,
            ..candidate
        };
        store.insert(accepted).await?;
        outcome.imported += 1;
    }

    debug!(
        imported = outcome.imported,
        duplicates = outcome.duplicates,
        invalid = outcome.invalid,
        "import reconciled"
    );
    Ok(outcome)
}

/// Digits-only card numbers of everything already stored, decrypted once
/// per call.
async fn existing_fingerprints(
    store: &dyn CardStore,
    cipher: &FieldCipher,
) -> Result<HashSet<String>, VaultError> {
    let mut fingerprints = HashSet::new();
    for row in store.get_all().await? {
        let number = cipher.decrypt_field(&row.card_number)?;
        fingerprints.insert(model::digits_only(&number));
    }
    Ok(fingerprints)
}

/// Structural check on a decrypted candidate: required fields non-empty
/// and a plausible card number length. The Luhn checksum is deliberately
/// not enforced; prepaid and private-label ranges fail it in the wild.
pub fn validate(record: &CardRecord) -> Result<(), String> {
    let required = [
        ("card number", &record.card_number),
        ("expiry date", &record.expiry_date),
        ("security code", &record.security_code),
        ("card type", &record.card_type),
        ("issuer", &record.issuer),
        ("owner", &record.owner),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(format!("missing {name}"));
        }
    }

    let digits = model::digits_only(&record.card_number);
    if digits.len() < MIN_CARD_DIGITS || digits.len() > MAX_CARD_DIGITS {
        return Err(format!("card number length {} out of range", digits.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCardStore;
    use cardlock_crypto::SoftwareKeyProvider;
    use std::sync::Arc;

    fn cipher() -> FieldCipher {
        FieldCipher::new(Arc::new(SoftwareKeyProvider::random()))
    }

    fn candidate(number: &str) -> CardRecord {
        CardRecord::new(number, "1225", "123", "Credit", "Visa", "me")
    }

    async fn seed(store: &MemoryCardStore, cipher: &FieldCipher, number: &str) {
        let mut record = candidate(number);
        record.card_number = cipher.encrypt_field(number).unwrap();
        record.expiry_date = cipher.encrypt_field("1225").unwrap();
        record.security_code = cipher.encrypt_field("123").unwrap();
        store.insert(record).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_detection_then_force_import() {
        let store = MemoryCardStore::new();
        let cipher = cipher();
        seed(&store, &cipher, "4111111111111111").await;

        let candidates = vec![
            candidate("4111111111111111"),
            candidate("5500000000000004"),
        ];

        let first = reconcile(candidates.clone(), &store, &cipher, false)
            .await
            .unwrap();
        assert_eq!(
            first,
            ImportOutcome {
                imported: 1,
                duplicates: 1,
                invalid: 0
            }
        );
        assert_eq!(store.get_all().await.unwrap().len(), 2);

        let second = reconcile(candidates, &store, &cipher, true).await.unwrap();
        assert_eq!(
            second,
            ImportOutcome {
                imported: 2,
                duplicates: 0,
                invalid: 0
            }
        );

        // Two copies of the first number now exist.
        let mut count = 0;
        for row in store.get_all().await.unwrap() {
            if cipher.decrypt_field(&row.card_number).unwrap() == "4111111111111111" {
                count += 1;
            }
        }
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn short_number_is_invalid_not_duplicate() {
        let store = MemoryCardStore::new();
        let cipher = cipher();
        seed(&store, &cipher, "4111111111111111").await;

        let outcome = reconcile(vec![candidate("4111111111")], &store, &cipher, false)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ImportOutcome {
                imported: 0,
                duplicates: 0,
                invalid: 1
            }
        );
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_required_field_is_invalid() {
        let store = MemoryCardStore::new();
        let cipher = cipher();

        let mut bad = candidate("4111111111111111");
        bad.owner = "  ".into();
        let outcome = reconcile(vec![bad], &store, &cipher, false).await.unwrap();
        assert_eq!(outcome.invalid, 1);
        assert_eq!(outcome.imported, 0);
    }

    #[tokio::test]
    async fn imported_ids_are_fresh_and_fields_reencrypted() {
        let store = MemoryCardStore::new();
        let cipher = cipher();

        let candidate = candidate("5500000000000004");
        let original_id = candidate.id.clone();
        reconcile(vec![candidate], &store, &cipher, false)
            .await
            .unwrap();

        let rows = store.get_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_ne!(rows[0].id, original_id);
        assert_ne!(rows[0].card_number, "5500000000000004");
        assert_eq!(
            cipher.decrypt_field(&rows[0].card_number).unwrap(),
            "5500000000000004"
        );
    }

    #[tokio::test]
    async fn formatted_number_matches_plain_fingerprint() {
        let store = MemoryCardStore::new();
        let cipher = cipher();
        seed(&store, &cipher, "4111111111111111").await;

        // Same digits, different formatting: still a duplicate.
        let outcome = reconcile(
            vec![candidate("4111 1111 1111 1111")],
            &store,
            &cipher,
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome.duplicates, 1);
    }
}
