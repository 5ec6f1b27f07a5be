//! Cache store conformance tests.
//!
//! Verifies that staged writes stay invisible until commit, that commit
//! applies every staged write, and that abort discards them.

use std::future::Future;

use super::{check, TestResult};
use crate::{CacheStore, JournalStore};

pub(super) async fn run_cache_tests<J, C, F, Fut>(factory: &F) -> Vec<TestResult>
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    vec![
        TestResult::from_result(
            "cache",
            "missing_key_is_none",
            missing_key_is_none(factory).await,
        ),
        TestResult::from_result(
            "cache",
            "staged_put_invisible_before_commit",
            staged_put_invisible_before_commit(factory).await,
        ),
        TestResult::from_result(
            "cache",
            "commit_applies_all_writes",
            commit_applies_all_writes(factory).await,
        ),
        TestResult::from_result(
            "cache",
            "abort_discards_writes",
            abort_discards_writes(factory).await,
        ),
        TestResult::from_result(
            "cache",
            "delete_removes_after_commit",
            delete_removes_after_commit(factory).await,
        ),
        TestResult::from_result(
            "cache",
            "keys_filter_by_prefix",
            keys_filter_by_prefix(factory).await,
        ),
    ]
}

async fn missing_key_is_none<J, C, F, Fut>(factory: &F) -> Result<(), String>
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    let (_, c) = factory().await;
    let got = c.get("nope/index").await.map_err(|e| e.to_string())?;
    check(got.is_none(), || format!("got {:?}", got))
}

async fn staged_put_invisible_before_commit<J, C, F, Fut>(factory: &F) -> Result<(), String>
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    let (_, c) = factory().await;
    let mut batch = c.begin_batch().await.map_err(|e| e.to_string())?;
    c.put(&mut batch, "u/index", "{}".to_string())
        .await
        .map_err(|e| e.to_string())?;
    let before = c.get("u/index").await.map_err(|e| e.to_string())?;
    c.commit_batch(batch).await.map_err(|e| e.to_string())?;
    check(before.is_none(), || format!("visible before commit: {:?}", before))
}

async fn commit_applies_all_writes<J, C, F, Fut>(factory: &F) -> Result<(), String>
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    let (_, c) = factory().await;
    let mut batch = c.begin_batch().await.map_err(|e| e.to_string())?;
    for (k, v) in [("u/a", "1"), ("u/b", "2"), ("u/a", "3")] {
        c.put(&mut batch, k, v.to_string())
            .await
            .map_err(|e| e.to_string())?;
    }
    c.commit_batch(batch).await.map_err(|e| e.to_string())?;
    let a = c.get("u/a").await.map_err(|e| e.to_string())?;
    let b = c.get("u/b").await.map_err(|e| e.to_string())?;
    check(a.as_deref() == Some("3"), || format!("u/a = {:?}", a))?;
    check(b.as_deref() == Some("2"), || format!("u/b = {:?}", b))
}

async fn abort_discards_writes<J, C, F, Fut>(factory: &F) -> Result<(), String>
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    let (_, c) = factory().await;
    let mut batch = c.begin_batch().await.map_err(|e| e.to_string())?;
    c.put(&mut batch, "u/a", "1".to_string())
        .await
        .map_err(|e| e.to_string())?;
    c.abort_batch(batch).await.map_err(|e| e.to_string())?;
    let a = c.get("u/a").await.map_err(|e| e.to_string())?;
    check(a.is_none(), || format!("aborted write visible: {:?}", a))
}

async fn delete_removes_after_commit<J, C, F, Fut>(factory: &F) -> Result<(), String>
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    let (_, c) = factory().await;
    let mut batch = c.begin_batch().await.map_err(|e| e.to_string())?;
    c.put(&mut batch, "u/a", "1".to_string())
        .await
        .map_err(|e| e.to_string())?;
    c.commit_batch(batch).await.map_err(|e| e.to_string())?;

    let mut batch = c.begin_batch().await.map_err(|e| e.to_string())?;
    c.delete(&mut batch, "u/a").await.map_err(|e| e.to_string())?;
    c.delete(&mut batch, "u/never").await.map_err(|e| e.to_string())?;
    let during = c.get("u/a").await.map_err(|e| e.to_string())?;
    c.commit_batch(batch).await.map_err(|e| e.to_string())?;
    let after = c.get("u/a").await.map_err(|e| e.to_string())?;
    check(during.is_some(), || "staged delete visible before commit".to_string())?;
    check(after.is_none(), || format!("deleted key still present: {:?}", after))
}

async fn keys_filter_by_prefix<J, C, F, Fut>(factory: &F) -> Result<(), String>
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    let (_, c) = factory().await;
    let mut batch = c.begin_batch().await.map_err(|e| e.to_string())?;
    for k in ["u/table/2", "u/table/1", "u/index", "v/table/1"] {
        c.put(&mut batch, k, "x".to_string())
            .await
            .map_err(|e| e.to_string())?;
    }
    c.commit_batch(batch).await.map_err(|e| e.to_string())?;
    let keys = c.keys("u/table/").await.map_err(|e| e.to_string())?;
    check(keys == vec!["u/table/1", "u/table/2"], || {
        format!("keys = {:?}", keys)
    })
}
