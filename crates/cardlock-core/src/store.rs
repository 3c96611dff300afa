//! Storage collaborator for card rows.
//!
//! The core owns no SQL. It speaks to whatever persistence substrate the
//! embedding app provides through `CardStore`: pull (`get_all`) plus push
//! (`subscribe`) so decrypted views can be re-derived when rows change.
//! Sensitive columns only ever hold field-cipher blobs; the substrate
//! never sees plaintext.
//!
//! `MemoryCardStore` is the in-process reference implementation, used by
//! the test suite and by embeddings that bring their own durability.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::error::VaultError;
use crate::model::CardRecord;

#[derive(Debug, Clone)]
pub enum StoreEvent {
    Inserted(String),
    Updated(String),
    Deleted(String),
    Cleared,
}

#[async_trait]
pub trait CardStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<CardRecord>, VaultError>;
    async fn get_all(&self) -> Result<Vec<CardRecord>, VaultError>;
    async fn insert(&self, record: CardRecord) -> Result<(), VaultError>;
    async fn update(&self, record: CardRecord) -> Result<(), VaultError>;
    async fn delete(&self, id: &str) -> Result<(), VaultError>;
    async fn delete_all(&self) -> Result<(), VaultError>;

    /// Live change notifications. Lagging receivers miss events; callers
    /// that fall behind should re-pull with `get_all`.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct MemoryCardStore {
    rows: RwLock<HashMap<String, CardRecord>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            rows: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn notify(&self, event: StoreEvent) {
        // No receivers is fine; notifications are best-effort.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryCardStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CardStore for MemoryCardStore {
    async fn get(&self, id: &str) -> Result<Option<CardRecord>, VaultError> {
        Ok(self.rows.read().get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<CardRecord>, VaultError> {
        let mut all: Vec<CardRecord> = self.rows.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn insert(&self, record: CardRecord) -> Result<(), VaultError> {
        let id = record.id.clone();
        self.rows.write().insert(id.clone(), record);
        self.notify(StoreEvent::Inserted(id));
        Ok(())
    }

    async fn update(&self, record: CardRecord) -> Result<(), VaultError> {
        let mut rows = self.rows.write();
        if !rows.contains_key(&record.id) {
            return Err(VaultError::NotFound(record.id.clone()));
        }
        let id = record.id.clone();
        rows.insert(id.clone(), record);
        drop(rows);
        self.notify(StoreEvent::Updated(id));
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), VaultError> {
        let removed = self.rows.write().remove(id).is_some();
        if removed {
            self.notify(StoreEvent::Deleted(id.to_string()));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), VaultError> {
        self.rows.write().clear();
        self.notify(StoreEvent::Cleared);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
