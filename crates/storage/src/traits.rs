use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::JournalState;

/// Durable storage of activity journals.
///
/// Each call is atomic: a `save` either replaces the whole journal or leaves
/// the previous version in place. At most one stepper per journal id is
/// assumed; no locking is performed.
#[async_trait]
pub trait JournalStore: Send + Sync + 'static {
    /// Create and persist a fresh journal positioned at the start sentinel.
    async fn create(
        &self,
        unit: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<JournalState, StorageError>;

    /// Returns `Err(StorageError::JournalNotFound)` if the id is unknown.
    async fn load(&self, id: &str) -> Result<JournalState, StorageError>;

    async fn save(&self, state: &JournalState) -> Result<(), StorageError>;
}

/// Key/value persistence for compiled activities.
///
/// ## Batch Semantics
///
/// Writes are staged in a `Batch` and become visible only on
/// `commit_batch`; `abort_batch` discards them. Reads always see the last
/// committed state. This backs the rebuild-then-swap pattern of the cache.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    type Batch: Send;

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Committed keys starting with `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    // ── Batch lifecycle ──────────────────────────────────────────────────────

    async fn begin_batch(&self) -> Result<Self::Batch, StorageError>;

    async fn put(
        &self,
        batch: &mut Self::Batch,
        key: &str,
        value: String,
    ) -> Result<(), StorageError>;

    async fn delete(&self, batch: &mut Self::Batch, key: &str) -> Result<(), StorageError>;

    async fn commit_batch(&self, batch: Self::Batch) -> Result<(), StorageError>;

    async fn abort_batch(&self, batch: Self::Batch) -> Result<(), StorageError>;
}
