#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use authoring_store::remote::MemoryRemote;
use authoring_store::Store;
use serde_json::{json, Value};
use tokio::sync::watch;

pub async fn store_on(remote: &Arc<MemoryRemote>) -> Arc<Store> {
    Store::initialize(remote.clone()).await.expect("store should initialize")
}

pub async fn fresh_store() -> (Arc<MemoryRemote>, Arc<Store>) {
    let remote = Arc::new(MemoryRemote::new());
    let store = store_on(&remote).await;
    (remote, store)
}

/// Waits for the next published value of a slice.
pub async fn next_change<T: Clone>(rx: &mut watch::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.changed())
        .await
        .expect("slice should change before timeout")
        .expect("store should still be alive");
    rx.borrow_and_update().clone()
}

/// Lets spawned push consumers drain their queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn problem_json(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "kind": "WORD_PROBLEM",
        "title": title,
        "description": "",
        "difficulty": "EASY",
        "concepts": [],
        "aiPrompt": "",
        "createdAt": "2024-05-01T08:00:00.000Z",
        "updatedAt": "2024-05-01T08:00:00.000Z",
        "createdBy": "teacher-1",
        "answerBlocks": []
    })
}

/// Remote holding module `m1` listing `p2` before `p1`.
pub fn seeded_remote() -> Arc<MemoryRemote> {
    Arc::new(MemoryRemote::with_states([
        (
            "mathModules",
            json!({ "modules": { "m1": { "id": "m1", "name": "Addition", "description": "", "problems": ["p2", "p1"] } } }),
        ),
        (
            "mathProblems",
            json!({ "problems": { "p1": problem_json("p1", "first"), "p2": problem_json("p2", "second") } }),
        ),
        ("mathConcepts", json!({ "concepts": {} })),
        ("mathMisconceptions", json!({ "misconceptions": {} })),
    ]))
}
