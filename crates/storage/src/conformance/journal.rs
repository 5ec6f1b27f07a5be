//! Journal store conformance tests.

use std::collections::BTreeMap;
use std::future::Future;

use super::{check, TestResult};
use crate::record::{sentinel, BranchRecord, PendingStep, SplitRecord};
use crate::{CacheStore, JournalStore, StorageError};

pub(super) async fn run_journal_tests<J, C, F, Fut>(factory: &F) -> Vec<TestResult>
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    vec![
        TestResult::from_result(
            "journal",
            "create_then_load_round_trips",
            create_then_load_round_trips(factory).await,
        ),
        TestResult::from_result(
            "journal",
            "created_ids_are_distinct",
            created_ids_are_distinct(factory).await,
        ),
        TestResult::from_result(
            "journal",
            "save_replaces_previous_state",
            save_replaces_previous_state(factory).await,
        ),
        TestResult::from_result(
            "journal",
            "full_shape_is_preserved",
            full_shape_is_preserved(factory).await,
        ),
        TestResult::from_result(
            "journal",
            "unknown_id_is_not_found",
            unknown_id_is_not_found(factory).await,
        ),
    ]
}

fn tags() -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert("lang".to_string(), "en".to_string());
    tags
}

async fn create_then_load_round_trips<J, C, F, Fut>(factory: &F) -> Result<(), String>
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    let (j, _) = factory().await;
    let created = j.create("unit", &tags()).await.map_err(|e| e.to_string())?;
    check(created.main.current_action == sentinel::START, || {
        format!("fresh journal at '{}'", created.main.current_action)
    })?;
    let loaded = j.load(&created.id).await.map_err(|e| e.to_string())?;
    check(loaded == created, || format!("loaded {:?}", loaded))
}

async fn created_ids_are_distinct<J, C, F, Fut>(factory: &F) -> Result<(), String>
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    let (j, _) = factory().await;
    let a = j.create("unit", &tags()).await.map_err(|e| e.to_string())?;
    let b = j.create("unit", &tags()).await.map_err(|e| e.to_string())?;
    check(a.id != b.id, || format!("duplicate id {}", a.id))
}

async fn save_replaces_previous_state<J, C, F, Fut>(factory: &F) -> Result<(), String>
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    let (j, _) = factory().await;
    let mut state = j.create("unit", &tags()).await.map_err(|e| e.to_string())?;
    state.main.current_action = "Shop::pay".to_string();
    j.save(&state).await.map_err(|e| e.to_string())?;
    state.main.current_action = sentinel::STOP.to_string();
    state.main.running = false;
    j.save(&state).await.map_err(|e| e.to_string())?;
    let loaded = j.load(&state.id).await.map_err(|e| e.to_string())?;
    check(loaded == state, || format!("loaded {:?}", loaded))
}

async fn full_shape_is_preserved<J, C, F, Fut>(factory: &F) -> Result<(), String>
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    let (j, _) = factory().await;
    let mut state = j.create("unit", &tags()).await.map_err(|e| e.to_string())?;
    state.main.current_action = sentinel::FORK.to_string();
    state.main.state = serde_json::json!({"cart": [1, 2, 3]});
    let mut failed = BranchRecord::new(2, sentinel::EXCEPTION, serde_json::Value::Null);
    failed.running = false;
    failed.error_message = Some("card declined".to_string());
    state.branches.push(BranchRecord::new(1, "Shop::ship", serde_json::json!("x")));
    state.retired.push(failed);
    state.branches[0].decision = Some("+".to_string());
    state.split = Some(SplitRecord {
        branches: vec![("next".to_string(), "Shop::a".to_string())],
        chosen: Some("next".to_string()),
    });
    state.pending = Some(PendingStep {
        branch: 1,
        action: "Shop::ship".to_string(),
    });
    state.next_branch_id = 3;
    state.last_branch = Some(1);
    j.save(&state).await.map_err(|e| e.to_string())?;
    let loaded = j.load(&state.id).await.map_err(|e| e.to_string())?;
    check(loaded == state, || format!("loaded {:?}", loaded))
}

async fn unknown_id_is_not_found<J, C, F, Fut>(factory: &F) -> Result<(), String>
where
    J: JournalStore,
    C: CacheStore,
    F: Fn() -> Fut,
    Fut: Future<Output = (J, C)>,
{
    let (j, _) = factory().await;
    match j.load("0000000000000000").await {
        Err(StorageError::JournalNotFound { id }) if id == "0000000000000000" => Ok(()),
        other => Err(format!("expected JournalNotFound, got {:?}", other.map(|s| s.id))),
    }
}
