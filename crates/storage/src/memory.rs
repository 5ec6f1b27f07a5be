//! In-memory stores for tests and one-shot runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{JournalState, WriteBatch};
use crate::traits::{CacheStore, JournalStore};

fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, StorageError> {
    m.lock()
        .map_err(|_| StorageError::Backend(format!("{} lock poisoned", what)))
}

/// Journal store backed by a shared map. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryJournalStore {
    journals: Arc<Mutex<HashMap<String, JournalState>>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryJournalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JournalStore for MemoryJournalStore {
    async fn create(
        &self,
        unit: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<JournalState, StorageError> {
        let state = JournalState::new(unit, tags);
        lock(&self.journals, "journals")?.insert(state.id.clone(), state.clone());
        Ok(state)
    }

    async fn load(&self, id: &str) -> Result<JournalState, StorageError> {
        lock(&self.journals, "journals")?
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::JournalNotFound { id: id.to_string() })
    }

    async fn save(&self, state: &JournalState) -> Result<(), StorageError> {
        lock(&self.journals, "journals")?.insert(state.id.clone(), state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Cache store backed by a shared sorted map. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    type Batch = WriteBatch;

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.entries, "cache")?.get(key).cloned())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(lock(&self.entries, "cache")?
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn begin_batch(&self) -> Result<WriteBatch, StorageError> {
        Ok(WriteBatch::default())
    }

    async fn put(
        &self,
        batch: &mut WriteBatch,
        key: &str,
        value: String,
    ) -> Result<(), StorageError> {
        batch.put(key, value);
        Ok(())
    }

    async fn delete(&self, batch: &mut WriteBatch, key: &str) -> Result<(), StorageError> {
        batch.delete(key);
        Ok(())
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries, "cache")?;
        for (key, value) in batch.into_ops() {
            match value {
                Some(value) => {
                    entries.insert(key, value);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn abort_batch(&self, _batch: WriteBatch) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;

    #[tokio::test]
    async fn memory_stores_pass_conformance() {
        let report = run_conformance_suite(|| async {
            (MemoryJournalStore::new(), MemoryCacheStore::new())
        })
        .await;
        assert!(report.failed == 0, "{report}");
    }

    #[tokio::test]
    async fn save_count_tracks_saves_not_creates() {
        let store = MemoryJournalStore::new();
        let j = store.create("u", &BTreeMap::new()).await.unwrap();
        assert_eq!(store.save_count(), 0);
        store.save(&j).await.unwrap();
        store.clone().save(&j).await.unwrap();
        assert_eq!(store.save_count(), 2);
    }
}
