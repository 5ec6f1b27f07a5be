//! Filesystem stores rooted at a state directory.
//!
//! ```text
//! <root>/journals/<id>.json
//! <root>/cache/CURRENT                         name of the live generation
//! <root>/cache/gen-<id>/<percent-encoded key>
//! ```
//!
//! Journals are written to a temporary sibling and renamed into place. Cache
//! commits build a complete new generation directory next to the live one and
//! switch `CURRENT` to it with a single rename, so a reader sees either every
//! write of a batch or none of them.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{generate_id, is_valid_id, JournalState, WriteBatch};
use crate::traits::{CacheStore, JournalStore};

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FsJournalStore {
    dir: PathBuf,
}

impl FsJournalStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        FsJournalStore {
            dir: root.as_ref().join("journals"),
        }
    }

    fn path(&self, id: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_id(id) {
            return Err(StorageError::JournalNotFound { id: id.to_string() });
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

#[async_trait]
impl JournalStore for FsJournalStore {
    async fn create(
        &self,
        unit: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<JournalState, StorageError> {
        let state = JournalState::new(unit, tags);
        let json = serde_json::to_vec_pretty(&state)?;
        write_atomic(&self.path(&state.id)?, &json).await?;
        tracing::debug!(journal = %state.id, unit, "created journal");
        Ok(state)
    }

    async fn load(&self, id: &str) -> Result<JournalState, StorageError> {
        let path = self.path(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::JournalNotFound { id: id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &JournalState) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path(&state.id)?, &json).await
    }
}

/// Cache entries as one file per key inside the live generation directory.
/// Assumes a single writer; readers may run concurrently with a commit.
#[derive(Debug, Clone)]
pub struct FsCacheStore {
    dir: PathBuf,
}

const CURRENT: &str = "CURRENT";

impl FsCacheStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        FsCacheStore {
            dir: root.as_ref().join("cache"),
        }
    }

    /// Directory of the live generation, if anything was ever committed.
    async fn live(&self) -> Result<Option<PathBuf>, StorageError> {
        match tokio::fs::read_to_string(self.dir.join(CURRENT)).await {
            Ok(name) => Ok(Some(self.dir.join(name.trim()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fill `next` with the live entries overlaid by `ops`.
    async fn build_generation(
        &self,
        live: Option<&Path>,
        next: &Path,
        ops: BTreeMap<String, Option<String>>,
    ) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(next).await?;
        if let Some(live) = live {
            let mut entries = tokio::fs::read_dir(live).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let overridden = name
                    .to_str()
                    .and_then(decode_key)
                    .is_some_and(|key| ops.contains_key(&key));
                if overridden {
                    continue;
                }
                let from = entry.path();
                let to = next.join(&name);
                if tokio::fs::hard_link(&from, &to).await.is_err() {
                    tokio::fs::copy(&from, &to).await?;
                }
            }
        }
        for (key, value) in ops {
            if let Some(value) = value {
                tokio::fs::write(next.join(encode_key(&key)), value).await?;
            }
        }
        Ok(())
    }
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[async_trait]
impl CacheStore for FsCacheStore {
    type Batch = WriteBatch;

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let Some(live) = self.live().await? else {
            return Ok(None);
        };
        match tokio::fs::read_to_string(live.join(encode_key(key))).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let Some(live) = self.live().await? else {
            return Ok(Vec::new());
        };
        let mut entries = match tokio::fs::read_dir(&live).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(key) = decode_key(name).filter(|k| k.starts_with(prefix)) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
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
        let count = batch.len();
        // Later operations on the same key win.
        let ops: BTreeMap<String, Option<String>> = batch.into_ops().into_iter().collect();

        let live = self.live().await?;
        let name = format!("gen-{}", generate_id());
        let next = self.dir.join(&name);
        let built = match self.build_generation(live.as_deref(), &next, ops).await {
            Ok(()) => write_atomic(&self.dir.join(CURRENT), name.as_bytes()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = built {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&next).await {
                tracing::warn!(dir = %next.display(), error = %cleanup, "leaving unused cache generation");
            }
            return Err(e);
        }

        if let Some(old) = live {
            if let Err(e) = tokio::fs::remove_dir_all(&old).await {
                tracing::warn!(dir = %old.display(), error = %e, "could not remove old cache generation");
            }
        }
        tracing::debug!(dir = %self.dir.display(), generation = %name, ops = count, "committed cache batch");
        Ok(())
    }

    async fn abort_batch(&self, _batch: WriteBatch) -> Result<(), StorageError> {
        Ok(())
    }
}
