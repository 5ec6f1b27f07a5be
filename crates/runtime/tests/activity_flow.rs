//! End-to-end flows: scan actions, rebuild the cache, open activities by tags
//! and drive them over the memory and filesystem stores.

use std::collections::BTreeMap;

use choreo_core::{SourceScanner, StaticScanner, Unit};
use choreo_runtime::{Activity, ActionRegistry, GraphCache, RunState, RuntimeError, Step};
use choreo_storage::{FsCacheStore, FsJournalStore, JournalStore, MemoryCacheStore, MemoryJournalStore};

fn checkout() -> Unit {
    StaticScanner::new()
        .action("checkout", "Cart::review", "start #channel > Pay::charge")
        .action("checkout", "Cart::review", "start #channel=kiosk > Pay::cash")
        .action("checkout", "Pay::charge", "+> Ship::pack -> Cart::review")
        .action("checkout", "Pay::cash", "> Ship::pack")
        .action("checkout", "Ship::pack", "> label | notify")
        .action("checkout", "Ship::label", "> Ship::done")
        .action("checkout", "Ship::notify", "> Ship::done")
        .action("checkout", "Ship::done", ">| end")
        .scan()
        .unwrap()
        .remove(0)
}

fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn shop() -> ActionRegistry {
    ActionRegistry::new()
        .register("Cart::review", |_| Ok(None))
        .register("Pay::charge", |_| Ok(Some(true.into())))
        .register("Pay::cash", |_| Ok(None))
        .register("Ship::pack", |_| Ok(None))
        .register("Ship::label", |_| Ok(None))
        .register("Ship::notify", |_| Ok(None))
        .register("Ship::done", |_| Ok(None))
}

fn actions(steps: &[Step]) -> Vec<&str> {
    steps.iter().map(|s| s.action.as_str()).collect()
}

#[tokio::test]
async fn web_checkout_runs_through_the_fallback_table() {
    let cache = GraphCache::new(MemoryCacheStore::new());
    let summary = cache.rebuild(&checkout()).await.unwrap();
    assert_eq!(summary.tables, 2);

    let store = MemoryJournalStore::new();
    let mut activity = Activity::open(&cache, store.clone(), "checkout", &tags(&[("channel", "web")]))
        .await
        .unwrap();
    let steps = activity.drive(&mut shop()).await.unwrap();
    assert_eq!(
        actions(&steps),
        vec![
            "Cart::review",
            "Pay::charge",
            "Ship::pack",
            "Ship::label",
            "Ship::notify",
            "Ship::done",
        ]
    );
    assert_eq!(activity.status().state, RunState::Stopped);
    // One save per yielded step plus the final settle.
    assert_eq!(store.save_count(), steps.len() + 1);
}

#[tokio::test]
async fn kiosk_checkout_uses_its_exact_variant() {
    let cache = GraphCache::new(MemoryCacheStore::new());
    cache.rebuild(&checkout()).await.unwrap();
    let mut activity = Activity::open(
        &cache,
        MemoryJournalStore::new(),
        "checkout",
        &tags(&[("channel", "kiosk")]),
    )
    .await
    .unwrap();
    let steps = activity.drive(&mut shop()).await.unwrap();
    assert_eq!(actions(&steps)[..3], ["Cart::review", "Pay::cash", "Ship::pack"]);
}

#[tokio::test]
async fn missing_tags_have_no_activity() {
    let cache = GraphCache::new(MemoryCacheStore::new());
    cache.rebuild(&checkout()).await.unwrap();
    let err = Activity::open(&cache, MemoryJournalStore::new(), "checkout", &BTreeMap::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RuntimeError::NoActivity { ref unit, .. } if unit == "checkout"));
}

#[tokio::test]
async fn filesystem_stores_resume_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GraphCache::new(FsCacheStore::new(dir.path()));
    cache.rebuild(&checkout()).await.unwrap();
    let store = FsJournalStore::new(dir.path());

    let mut first = Activity::open(&cache, store.clone(), "checkout", &tags(&[("channel", "web")]))
        .await
        .unwrap();
    assert_eq!(first.next_step().await.unwrap().unwrap().action, "Cart::review");
    assert_eq!(first.next_step().await.unwrap().unwrap().action, "Pay::charge");
    first.decide(false).unwrap();
    let id = first.id().to_string();
    first.checkpoint().await.unwrap();
    drop(first);

    let mut second = Activity::reopen(&cache, store.clone(), &id).await.unwrap();
    assert_eq!(second.next_step().await.unwrap().unwrap().action, "Cart::review");

    let saved = store.load(&id).await.unwrap();
    assert_eq!(saved.main.current_action, "Cart::review");
    assert_eq!(saved.tags.get("channel").map(String::as_str), Some("web"));
}
