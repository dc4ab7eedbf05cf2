//! Rollback tests for the optimistic action layer.
//!
//! Points the API client at a port nothing listens on, so every remote call
//! fails at the transport, and asserts the store is restored to its
//! pre-mutation state.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tasklink::model::{Priority, Task, TaskKind, TaskPatch, TaskStatus};
use tasklink::{ApiClient, SessionTag, TaskActions, TaskStore};

/// Base URL for a port with no listener: connections are refused.
fn refused_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

fn task(id: i64, priority: Priority) -> Task {
    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    Task {
        id,
        title: format!("task {id}"),
        description: Some("before".into()),
        kind: TaskKind::Task,
        status: TaskStatus::Active,
        priority: Some(priority),
        created_at: t0,
        updated_at: t0,
        due_date: None,
        context: None,
        recurrence: None,
    }
}

fn make_actions() -> (TaskActions, Arc<TaskStore>) {
    let api = ApiClient::new(&refused_base_url(), SessionTag::generate()).unwrap();
    let store = Arc::new(TaskStore::new());
    (TaskActions::new(api, store.clone()), store)
}

#[tokio::test]
async fn failed_update_restores_the_pre_mutation_record() {
    let (actions, store) = make_actions();
    store.insert(task(1, Priority::High));
    store.insert(task(2, Priority::Critical));
    let before = store.tasks();

    let patch = TaskPatch {
        title: Some("renamed".into()),
        priority: Some(Priority::Lowest),
        status: Some(TaskStatus::Done),
        ..Default::default()
    };
    let result = actions.update(1, patch).await;

    assert!(result.is_err());
    // The optimistic apply must be rolled back field for field, and the
    // collection order must be back to what it was.
    assert_eq!(store.get(1).unwrap(), task(1, Priority::High));
    assert_eq!(store.tasks(), before);
    assert!(store.error().is_some(), "remote failure must surface the error flag");
}

#[tokio::test]
async fn failed_delete_reinserts_the_record() {
    let (actions, store) = make_actions();
    store.insert(task(1, Priority::High));
    store.insert(task(2, Priority::Critical));
    let before = store.tasks();

    let result = actions.remove(1).await;

    assert!(result.is_err());
    assert_eq!(store.get(1).unwrap(), task(1, Priority::High));
    assert_eq!(store.tasks(), before);
    assert!(store.error().is_some());
}

#[tokio::test]
async fn failed_update_of_unknown_id_leaves_the_store_unchanged() {
    let (actions, store) = make_actions();
    store.insert(task(2, Priority::Critical));
    let before = store.tasks();

    let patch = TaskPatch {
        title: Some("renamed".into()),
        ..Default::default()
    };
    let result = actions.update(99, patch).await;

    assert!(result.is_err());
    assert_eq!(store.tasks(), before);
}

#[tokio::test]
async fn failed_create_inserts_nothing() {
    let (actions, store) = make_actions();

    let result = actions
        .create(tasklink::model::TaskCreate {
            title: "never lands".into(),
            ..Default::default()
        })
        .await;

    assert!(result.is_err());
    assert!(store.tasks().is_empty());
    assert!(store.error().is_some());
}
