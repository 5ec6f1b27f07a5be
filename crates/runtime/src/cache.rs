//! Compiled-graph cache.
//!
//! A rebuild compiles every tag combination a unit can produce and stores one
//! [`CompiledTable`] per combination, keyed by a digest of its tag vector:
//!
//! ```text
//! <unit>/index            UnitIndex: tag order, wildcard tags, stored digests
//! <unit>/table/<digest>   CompiledTable JSON
//! ```
//!
//! All writes of a rebuild go through one batch, so lookups see either the
//! previous generation or the new one. Tables of the previous generation that
//! were not produced again are deleted in the same batch, after the new index.

use std::collections::{BTreeMap, BTreeSet};

use choreo_core::{compile, CompiledTable, TagMatcher, TagValue, TagVector, Unit, START_KEY};
use choreo_storage::CacheStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CacheError;

/// Per-unit metadata written by [`GraphCache::rebuild`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitIndex {
    pub unit: String,
    pub tag_order: Vec<String>,
    /// Tags declared as wildcards by at least one variant.
    pub wildcards: Vec<String>,
    /// Stored tables by digest.
    pub tables: BTreeMap<String, TagVector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub unit: String,
    /// Distinct tag vectors tried.
    pub vectors: usize,
    /// Tables stored.
    pub tables: usize,
    /// Stale tables of the previous generation removed.
    pub pruned: usize,
}

/// Digest of a tag vector, used as the table key.
pub fn vector_digest(vector: &TagVector) -> String {
    // Serializing a Vec of plain strings and enums cannot fail.
    let canonical = serde_json::to_string(vector).unwrap_or_default();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

fn index_key(unit: &str) -> String {
    format!("{}/index", unit)
}

fn table_prefix(unit: &str) -> String {
    format!("{}/table/", unit)
}

fn table_key(unit: &str, digest: &str) -> String {
    format!("{}/table/{}", unit, digest)
}

/// Every tag vector reachable by varying each tag over absent, its declared
/// values and, for wildcard tags, the wildcard.
fn tag_vectors(unit: &Unit) -> Vec<TagVector> {
    let wildcards = unit.wildcard_tags();
    let mut vectors: Vec<Vec<(String, Option<TagValue>)>> = vec![Vec::new()];
    for tag in unit.tag_order() {
        let mut options: Vec<Option<TagValue>> = vec![None];
        options.extend(unit.declared_values(tag).into_iter().map(Some));
        if wildcards.contains(tag) {
            options.push(Some(TagValue::Wildcard));
        }
        vectors = vectors
            .into_iter()
            .flat_map(|prefix| {
                options.iter().map(move |option| {
                    let mut entries = prefix.clone();
                    entries.push((tag.clone(), option.clone()));
                    entries
                })
            })
            .collect();
    }
    vectors.into_iter().map(TagVector::new).collect()
}

/// Positions of the tags in `vector` that must become the wildcard to turn it
/// into `stored`, or `None` when no such substitution exists. Only present
/// tags listed in `wildcards` may be substituted.
fn wildcard_subset(
    vector: &TagVector,
    stored: &TagVector,
    wildcards: &[String],
) -> Option<Vec<usize>> {
    if vector.entries().len() != stored.entries().len() {
        return None;
    }
    let mut subset = Vec::new();
    for (pos, ((name, want), (stored_name, have))) in
        vector.entries().iter().zip(stored.entries()).enumerate()
    {
        if name != stored_name {
            return None;
        }
        if want == have {
            continue;
        }
        let substitutable = want.is_some()
            && matches!(have, Some(TagValue::Wildcard))
            && wildcards.contains(name);
        if !substitutable {
            return None;
        }
        subset.push(pos);
    }
    Some(subset)
}

pub struct GraphCache<C> {
    store: C,
}

impl<C: CacheStore> GraphCache<C> {
    pub fn new(store: C) -> Self {
        GraphCache { store }
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    /// Recompile every tag combination of `unit` and replace its stored tables.
    pub async fn rebuild(&self, unit: &Unit) -> Result<RebuildSummary, CacheError> {
        let name = unit.name();
        let mut index = UnitIndex {
            unit: name.to_string(),
            tag_order: unit.tag_order().to_vec(),
            wildcards: unit.wildcard_tags(),
            tables: BTreeMap::new(),
        };
        let mut seen = BTreeSet::new();
        let mut compiled = Vec::new();
        for vector in tag_vectors(unit) {
            let digest = vector_digest(&vector);
            if !seen.insert(digest.clone()) {
                continue;
            }
            match compile(unit, START_KEY, &TagMatcher::new(vector.clone())) {
                Ok(table) => {
                    index.tables.insert(digest.clone(), vector);
                    compiled.push((digest, table));
                }
                Err(miss) => {
                    tracing::warn!(unit = name, error = %miss, "discarding tag vector");
                }
            }
        }

        let stale: Vec<String> = self
            .store
            .keys(&table_prefix(name))
            .await?
            .into_iter()
            .filter(|key| {
                key.rsplit('/')
                    .next()
                    .is_some_and(|digest| !index.tables.contains_key(digest))
            })
            .collect();

        let mut batch = self.store.begin_batch().await?;
        let staged = self
            .stage(&mut batch, name, &index, &compiled, &stale)
            .await;
        if let Err(e) = staged {
            self.store.abort_batch(batch).await?;
            return Err(e);
        }
        self.store.commit_batch(batch).await?;

        let summary = RebuildSummary {
            unit: name.to_string(),
            vectors: seen.len(),
            tables: compiled.len(),
            pruned: stale.len(),
        };
        tracing::info!(
            unit = name,
            vectors = summary.vectors,
            tables = summary.tables,
            pruned = summary.pruned,
            "rebuilt activity cache"
        );
        Ok(summary)
    }

    async fn stage(
        &self,
        batch: &mut C::Batch,
        unit: &str,
        index: &UnitIndex,
        compiled: &[(String, CompiledTable)],
        stale: &[String],
    ) -> Result<(), CacheError> {
        for (digest, table) in compiled {
            let json = serde_json::to_string(table).map_err(|source| CacheError::Corrupt {
                key: table_key(unit, digest),
                source,
            })?;
            self.store
                .put(batch, &table_key(unit, digest), json)
                .await?;
        }
        let json = serde_json::to_string(index).map_err(|source| CacheError::Corrupt {
            key: index_key(unit),
            source,
        })?;
        self.store.put(batch, &index_key(unit), json).await?;
        // Tables first, then the index, then the deletes: a store that applies
        // a batch in order never exposes an index naming a missing table.
        for key in stale {
            self.store.delete(batch, key).await?;
        }
        Ok(())
    }

    pub async fn index(&self, unit: &str) -> Result<Option<UnitIndex>, CacheError> {
        let key = index_key(unit);
        match self.store.get(&key).await? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|source| CacheError::Corrupt { key, source }),
            None => Ok(None),
        }
    }

    async fn table(&self, unit: &str, digest: &str) -> Result<Option<CompiledTable>, CacheError> {
        let key = table_key(unit, digest);
        match self.store.get(&key).await? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|source| CacheError::Corrupt { key, source }),
            None => Ok(None),
        }
    }

    /// Find the compiled activity for `unit` and concrete tag values.
    ///
    /// Tags the unit never declares are ignored. On an exact miss, every
    /// subset of the present wildcard tags is tried with those tags set to
    /// the wildcard, smallest subsets first.
    pub async fn lookup(
        &self,
        unit: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<Option<CompiledTable>, CacheError> {
        let Some(index) = self.index(unit).await? else {
            return Ok(None);
        };
        let vector = TagVector::concrete(&index.tag_order, tags);
        let digest = vector_digest(&vector);
        if index.tables.contains_key(&digest) {
            return self.table(unit, &digest).await;
        }

        // A stored vector is reachable from `vector` through at most one
        // subset of wildcard substitutions.
        let best = index
            .tables
            .iter()
            .filter_map(|(digest, stored)| {
                wildcard_subset(&vector, stored, &index.wildcards).map(|subset| (subset, digest))
            })
            .min_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        if let Some((subset, digest)) = best {
            tracing::debug!(
                unit,
                tags = %vector,
                fallback = %index.tables[digest],
                wildcards = subset.len(),
                "wildcard fallback"
            );
            return self.table(unit, digest).await;
        }
        tracing::debug!(unit, tags = %vector, "no compiled activity");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use choreo_core::{SourceScanner, StaticScanner, Transition, Target};
    use choreo_storage::{FsCacheStore, MemoryCacheStore};

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn unit(actions: &[(&str, &str)]) -> Unit {
        let mut scanner = StaticScanner::new();
        for (key, expr) in actions {
            scanner = scanner.action("shop", key, expr);
        }
        scanner.scan().unwrap().remove(0)
    }

    fn goto(key: &str) -> Transition {
        Transition::Goto(Target::Action(key.to_string()))
    }

    #[test]
    fn vectors_cover_absent_values_and_wildcards() {
        let u = unit(&[
            ("a", "start #lang=en #web > b"),
            ("a", "start #lang=fr > b"),
            ("b", "end"),
        ]);
        // lang: none, en, fr; web: none, wildcard
        assert_eq!(tag_vectors(&u).len(), 6);
    }

    #[tokio::test]
    async fn rebuild_stores_only_compilable_vectors() {
        let cache = GraphCache::new(MemoryCacheStore::new());
        let u = unit(&[("a", "start #lang=en > b"), ("b", "end")]);
        let summary = cache.rebuild(&u).await.unwrap();
        assert_eq!(summary.vectors, 2);
        assert_eq!(summary.tables, 1);
        assert_eq!(summary.pruned, 0);

        let table = cache.lookup("shop", &tags(&[("lang", "en")])).await.unwrap();
        assert_eq!(table.unwrap().transition("a"), Some(&goto("b")));
        assert!(cache.lookup("shop", &tags(&[])).await.unwrap().is_none());
        assert!(cache.lookup("other", &tags(&[])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lookup_ignores_undeclared_tags() {
        let cache = GraphCache::new(MemoryCacheStore::new());
        cache.rebuild(&unit(&[("go", "start end")])).await.unwrap();
        let table = cache
            .lookup("shop", &tags(&[("device", "tablet")]))
            .await
            .unwrap();
        assert!(table.is_some());
    }

    #[tokio::test]
    async fn wildcard_fallback() {
        let cache = GraphCache::new(MemoryCacheStore::new());
        let u = unit(&[("a", "start #a > b"), ("b", "end")]);
        cache.rebuild(&u).await.unwrap();

        let table = cache
            .lookup("shop", &tags(&[("a", "x"), ("b", "y")]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(table.tags.get("a"), Some(&TagValue::Wildcard));

        assert!(cache.lookup("shop", &tags(&[("b", "y")])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exact_table_wins_over_fallback() {
        let cache = GraphCache::new(MemoryCacheStore::new());
        let u = unit(&[
            ("a", "start #lang > generic"),
            ("a", "start #lang=en > english"),
            ("generic", "end"),
            ("english", "end"),
        ]);
        cache.rebuild(&u).await.unwrap();
        let en = cache.lookup("shop", &tags(&[("lang", "en")])).await.unwrap().unwrap();
        assert_eq!(en.transition("a"), Some(&goto("english")));
        let de = cache.lookup("shop", &tags(&[("lang", "de")])).await.unwrap().unwrap();
        assert_eq!(de.transition("a"), Some(&goto("generic")));
    }

    #[tokio::test]
    async fn fallback_prefers_the_smallest_change() {
        let cache = GraphCache::new(MemoryCacheStore::new());
        let u = unit(&[
            ("a", "start #x #y=1 > one"),
            ("a", "start #x #y > both"),
            ("one", "end"),
            ("both", "end"),
        ]);
        cache.rebuild(&u).await.unwrap();
        let t = cache
            .lookup("shop", &tags(&[("x", "q"), ("y", "1")]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.transition("a"), Some(&goto("one")));
        let t = cache
            .lookup("shop", &tags(&[("x", "q"), ("y", "2")]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.transition("a"), Some(&goto("both")));
    }

    #[tokio::test]
    async fn rebuild_prunes_stale_tables() {
        let store = MemoryCacheStore::new();
        let cache = GraphCache::new(store.clone());
        cache
            .rebuild(&unit(&[("a", "start #lang=en > b"), ("a", "start #lang=fr > b"), ("b", "end")]))
            .await
            .unwrap();
        assert_eq!(store.keys("shop/table/").await.unwrap().len(), 2);

        let summary = cache
            .rebuild(&unit(&[("a", "start #lang=en > b"), ("b", "end")]))
            .await
            .unwrap();
        assert_eq!(summary.pruned, 1);
        assert_eq!(store.keys("shop/table/").await.unwrap().len(), 1);
        assert!(cache.lookup("shop", &tags(&[("lang", "fr")])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fallback_reaches_every_wildcard_tag() {
        let names: Vec<String> = (0..13).map(|i| format!("t{:02}", i)).collect();
        let declared: Vec<String> = names.iter().map(|n| format!("#{}", n)).collect();
        let expr = format!("start {} > b", declared.join(" "));
        let cache = GraphCache::new(MemoryCacheStore::new());
        let summary = cache
            .rebuild(&unit(&[("a", expr.as_str()), ("b", "end")]))
            .await
            .unwrap();
        assert_eq!(summary.tables, 1);

        let all: BTreeMap<String, String> =
            names.iter().map(|n| (n.clone(), "x".to_string())).collect();
        let table = cache.lookup("shop", &all).await.unwrap().unwrap();
        assert_eq!(table.tags.get("t12"), Some(&TagValue::Wildcard));
        assert_eq!(table.transition("a"), Some(&goto("b")));

        let mut partial = all.clone();
        partial.remove("t00");
        assert!(cache.lookup("shop", &partial).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_the_previous_tables() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GraphCache::new(FsCacheStore::new(dir.path()));
        cache
            .rebuild(&unit(&[("a", "start #lang=en > b"), ("a", "start #lang=fr > b"), ("b", "end")]))
            .await
            .unwrap();

        let blocker = dir.path().join("cache").join("CURRENT.tmp");
        std::fs::create_dir(&blocker).unwrap();
        let err = cache
            .rebuild(&unit(&[("a", "start #lang=en > b"), ("b", "end")]))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Storage(_)));
        let fr = cache.lookup("shop", &tags(&[("lang", "fr")])).await.unwrap();
        assert!(fr.is_some());

        std::fs::remove_dir(&blocker).unwrap();
        let summary = cache
            .rebuild(&unit(&[("a", "start #lang=en > b"), ("b", "end")]))
            .await
            .unwrap();
        assert_eq!(summary.pruned, 1);
        assert!(cache.lookup("shop", &tags(&[("lang", "fr")])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_entries_are_reported() {
        let store = MemoryCacheStore::new();
        let mut batch = store.begin_batch().await.unwrap();
        store
            .put(&mut batch, "shop/index", "not json".to_string())
            .await
            .unwrap();
        store.commit_batch(batch).await.unwrap();
        let err = GraphCache::new(store).lookup("shop", &tags(&[])).await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { ref key, .. } if key == "shop/index"));
    }
}
