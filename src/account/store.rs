//! Persistent account record storage

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::types::{AccountId, AccountRecord, AccountUpdate};
use crate::error::{KeyringError, Result};

/// Durable table of non-secret account metadata.
///
/// `get` and `update` report a missing id as `KeyringError::NotFound`.
#[async_trait]
pub trait AccountRecordStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<AccountRecord>;
    async fn insert(&self, record: AccountRecord) -> Result<()>;
    async fn update(&self, id: &str, update: AccountUpdate) -> Result<AccountRecord>;
    async fn remove(&self, id: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<AccountRecord>>;
}

/// In-memory record store, used by tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<AccountId, AccountRecord>>,
    reads: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls served so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountRecordStore for MemoryRecordStore {
    async fn get(&self, id: &str) -> Result<AccountRecord> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| KeyringError::NotFound(id.to_string()))
    }

    async fn insert(&self, record: AccountRecord) -> Result<()> {
        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update(&self, id: &str, update: AccountUpdate) -> Result<AccountRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| KeyringError::NotFound(id.to_string()))?;
        update.apply(record);
        Ok(record.clone())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.records
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| KeyringError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<AccountRecord>> {
        let mut all: Vec<AccountRecord> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}

const ACCOUNTS_TREE: &str = "accounts";

/// Sled-backed record store. Values are bincode-encoded records keyed by id.
pub struct SledRecordStore {
    tree: sled::Tree,
    // Serializes read-modify-write so concurrent updates never interleave.
    write_lock: Mutex<()>,
}

impl SledRecordStore {
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(ACCOUNTS_TREE)?,
            write_lock: Mutex::new(()),
        })
    }

    fn decode(id: &str, bytes: &[u8]) -> Result<AccountRecord> {
        bincode::deserialize(bytes)
            .map_err(|e| KeyringError::Corrupted(format!("account {} record is unreadable: {}", id, e)))
    }

    async fn put(&self, record: &AccountRecord) -> Result<()> {
        let bytes = bincode::serialize(record)?;
        self.tree.insert(record.id.as_bytes(), bytes)?;
        self.tree.flush_async().await?;
        Ok(())
    }
}

#[async_trait]
impl AccountRecordStore for SledRecordStore {
    async fn get(&self, id: &str) -> Result<AccountRecord> {
        match self.tree.get(id.as_bytes())? {
            Some(bytes) => Self::decode(id, &bytes),
            None => Err(KeyringError::NotFound(id.to_string())),
        }
    }

    async fn insert(&self, record: AccountRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        debug!(account = %record.id, "persisting new account record");
        self.put(&record).await
    }

    async fn update(&self, id: &str, update: AccountUpdate) -> Result<AccountRecord> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.get(id).await?;
        update.apply(&mut record);
        self.put(&record).await?;
        Ok(record)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.tree.remove(id.as_bytes())?.is_none() {
            return Err(KeyringError::NotFound(id.to_string()));
        }
        self.tree.flush_async().await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AccountRecord>> {
        let mut all = Vec::new();
        for entry in self.tree.iter() {
            let (key, value) = entry?;
            let id = String::from_utf8_lossy(&key);
            all.push(Self::decode(&id, &value)?);
        }
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}
