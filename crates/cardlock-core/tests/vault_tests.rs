//! End-to-end tests for the assembled vault.
//!
//! Scenarios:
//!  1. Ciphertext at rest, plaintext only through gated reads
//!  2. Lock invalidation (no cached plaintext survives a lock)
//!  3. Export → import roundtrip through the `.qcx` container
//!  4. Duplicate detection with the two-phase force-import flow
//!  5. Corrupt containers change nothing
//!  6. Idle timeout through the facade, background time included

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cardlock_core::{
    AuthOutcome, Authenticator, CardRecord, CardVault, MemoryCardStore, VaultError, VaultSettings,
};
use cardlock_crypto::SoftwareKeyProvider;

struct StubAuthenticator(AuthOutcome);

#[async_trait]
impl Authenticator for StubAuthenticator {
    async fn authenticate(&self, _prompt: &str) -> AuthOutcome {
        self.0.clone()
    }
}

fn vault() -> CardVault {
    CardVault::new(
        Arc::new(MemoryCardStore::new()),
        Arc::new(SoftwareKeyProvider::random()),
        &VaultSettings::default(),
    )
}

async fn unlocked_vault() -> CardVault {
    let vault = vault();
    vault
        .session()
        .authenticate(&StubAuthenticator(AuthOutcome::Success), "unlock")
        .await
        .unwrap();
    vault
}

fn card(number: &str) -> CardRecord {
    CardRecord::new(number, "1225", "123", "Credit", "Visa", "me")
}

#[tokio::test]
async fn sensitive_fields_are_ciphertext_at_rest() {
    let vault = unlocked_vault().await;
    let added = vault.add_card(card("4111111111111111")).await.unwrap();

    let row = vault.store().get(&added.id).await.unwrap().unwrap();
    assert_ne!(row.card_number, "4111111111111111");
    assert_ne!(row.expiry_date, "1225");
    assert_ne!(row.security_code, "123");
    // Non-sensitive fields stay readable for list queries.
    assert_eq!(row.issuer, "Visa");

    let read = vault.card(&added.id).await.unwrap();
    assert_eq!(read.card_number, "4111111111111111");
    assert_eq!(read.security_code, "123");
}

#[tokio::test]
async fn reads_require_an_unlocked_session() {
    let vault = unlocked_vault().await;
    let added = vault.add_card(card("4111111111111111")).await.unwrap();

    vault.session().lock();
    assert!(matches!(
        vault.card(&added.id).await,
        Err(VaultError::Locked)
    ));
    assert!(matches!(vault.cards().await, Err(VaultError::Locked)));

    // A fresh authentication restores access.
    vault
        .session()
        .authenticate(&StubAuthenticator(AuthOutcome::Success), "unlock")
        .await
        .unwrap();
    assert_eq!(
        vault.card(&added.id).await.unwrap().card_number,
        "4111111111111111"
    );
}

#[tokio::test]
async fn failed_authentication_leaves_vault_locked() {
    let vault = vault();
    let err = vault
        .session()
        .authenticate(&StubAuthenticator(AuthOutcome::Failed), "unlock")
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::AuthenticationFailed));
    assert!(matches!(vault.cards().await, Err(VaultError::Locked)));
}

#[tokio::test]
async fn update_reencrypts_and_bumps_timestamp() {
    let vault = unlocked_vault().await;
    let added = vault.add_card(card("4111111111111111")).await.unwrap();
    let stored_before = vault.store().get(&added.id).await.unwrap().unwrap();

    let mut edited = added.clone();
    edited.security_code = "999".into();
    let updated = vault.update_card(edited).await.unwrap();

    assert!(updated.updated_at >= added.updated_at);
    let stored_after = vault.store().get(&added.id).await.unwrap().unwrap();
    // Fresh nonce on re-encryption even for the unchanged number.
    assert_ne!(stored_after.card_number, stored_before.card_number);
    assert_eq!(vault.card(&added.id).await.unwrap().security_code, "999");
}

#[tokio::test]
async fn export_import_roundtrip_between_vault_instances() {
    let provider = Arc::new(SoftwareKeyProvider::from_key([7u8; 32]));
    let source = CardVault::new(
        Arc::new(MemoryCardStore::new()),
        provider.clone(),
        &VaultSettings::default(),
    );
    source
        .session()
        .authenticate(&StubAuthenticator(AuthOutcome::Success), "unlock")
        .await
        .unwrap();

    source.add_card(card("4111111111111111")).await.unwrap();
    source.add_card(card("5500000000000004")).await.unwrap();
    let bytes = source.export_container().await.unwrap();

    // Same device key, empty store: everything imports.
    let target = CardVault::new(
        Arc::new(MemoryCardStore::new()),
        provider,
        &VaultSettings::default(),
    );
    target
        .session()
        .authenticate(&StubAuthenticator(AuthOutcome::Success), "unlock")
        .await
        .unwrap();

    let outcome = target.import_container(bytes, false).await.unwrap();
    assert_eq!(outcome.imported, 2);
    assert_eq!(outcome.duplicates, 0);

    let mut numbers: Vec<String> = target
        .cards()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.card_number)
        .collect();
    numbers.sort();
    assert_eq!(numbers, vec!["4111111111111111", "5500000000000004"]);
}

#[tokio::test]
async fn duplicate_detection_two_phase_flow() {
    // Containers are device-bound, so source and target share a provider.
    let provider = Arc::new(SoftwareKeyProvider::from_key([3u8; 32]));
    let source = CardVault::new(
        Arc::new(MemoryCardStore::new()),
        provider.clone(),
        &VaultSettings::default(),
    );
    source
        .session()
        .authenticate(&StubAuthenticator(AuthOutcome::Success), "unlock")
        .await
        .unwrap();
    source.add_card(card("4111111111111111")).await.unwrap();
    source.add_card(card("5500000000000004")).await.unwrap();
    let bytes = source.export_container().await.unwrap();

    let target = CardVault::new(
        Arc::new(MemoryCardStore::new()),
        provider,
        &VaultSettings::default(),
    );
    target
        .session()
        .authenticate(&StubAuthenticator(AuthOutcome::Success), "unlock")
        .await
        .unwrap();
    target.add_card(card("4111111111111111")).await.unwrap();

    // First pass: report the duplicate without importing it.
    let first = target.import_container(bytes.clone(), false).await.unwrap();
    assert_eq!(first.imported, 1);
    assert_eq!(first.duplicates, 1);
    assert_eq!(target.cards().await.unwrap().len(), 2);

    // Explicit confirmation: everything imports, duplicate included.
    let second = target.import_container(bytes, true).await.unwrap();
    assert_eq!(second.imported, 2);
    assert_eq!(second.duplicates, 0);

    let all = target.cards().await.unwrap();
    let copies = all
        .iter()
        .filter(|c| c.card_number == "4111111111111111")
        .count();
    assert_eq!(copies, 2);
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn corrupt_container_imports_nothing() {
    let vault = unlocked_vault().await;
    vault.add_card(card("4111111111111111")).await.unwrap();
    let bytes = vault.export_container().await.unwrap();

    let mut tampered = bytes.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    assert!(matches!(
        vault.import_container(tampered, true).await,
        Err(VaultError::CorruptData)
    ));

    let mut bad_magic = bytes;
    bad_magic[0] ^= 0x01;
    assert!(matches!(
        vault.import_container(bad_magic, true).await,
        Err(VaultError::InvalidContainer(_))
    ));

    // Nothing was merged by either failure.
    assert_eq!(vault.cards().await.unwrap().len(), 1);
}

#[tokio::test]
async fn container_from_another_device_is_rejected() {
    let source = unlocked_vault().await;
    source.add_card(card("4111111111111111")).await.unwrap();
    let bytes = source.export_container().await.unwrap();

    // Different device key: the wrapped export key cannot be unwrapped.
    let target = unlocked_vault().await;
    assert!(matches!(
        target.import_container(bytes, false).await,
        Err(VaultError::CorruptData)
    ));
    assert!(target.cards().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn idle_timeout_locks_reads_through_facade() {
    let vault = unlocked_vault().await;
    let added = vault.add_card(card("4111111111111111")).await.unwrap();

    vault.session().on_background();
    tokio::time::advance(Duration::from_secs(40)).await;
    vault.session().on_foreground();

    assert!(matches!(
        vault.card(&added.id).await,
        Err(VaultError::Locked)
    ));
}
