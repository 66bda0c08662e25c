//! Integration tests for JSONL-backed persistence: snapshots survive
//! process restarts, relationships round-trip, and corrupted files load
//! resiliently.

mod common;

use common::test_app;
use quill::domain::{NewIssue, NewTag};
use quill::store::{create_store, InMemoryStore, RecordStore, StoreBackend};
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_snapshot_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");

    let issue_id = {
        let store = create_store(StoreBackend::Jsonl(path.clone())).await.unwrap();
        let issue = store
            .insert_issue(NewIssue::titled("persisted entry"))
            .await
            .unwrap();
        store.save().await.unwrap();
        issue.id
    };

    let store = create_store(StoreBackend::Jsonl(path)).await.unwrap();
    let reloaded = store.issue(&issue_id).await.unwrap().unwrap();

    assert_eq!(reloaded.title(), "persisted entry");
}

#[tokio::test]
async fn test_relationships_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");

    let (issue_id, tag_id) = {
        let store = create_store(StoreBackend::Jsonl(path.clone())).await.unwrap();
        let tag = store.insert_tag(NewTag::named("Work")).await.unwrap();
        let issue = store
            .insert_issue(NewIssue {
                tags: vec![tag.id.clone()],
                ..NewIssue::titled("report")
            })
            .await
            .unwrap();
        store.save().await.unwrap();
        (issue.id, tag.id)
    };

    let store = create_store(StoreBackend::Jsonl(path)).await.unwrap();

    let issue = store.issue(&issue_id).await.unwrap().unwrap();
    let tag = store.tag(&tag_id).await.unwrap().unwrap();
    assert!(issue.has_tag(&tag_id));
    assert!(tag.issue_ids().contains(&issue_id));
    assert_eq!(tag.name(), "Work");
}

#[tokio::test]
async fn test_unsaved_changes_do_not_reach_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");

    {
        let store = create_store(StoreBackend::Jsonl(path.clone())).await.unwrap();
        store.insert_issue(NewIssue::titled("ephemeral")).await.unwrap();
        // Dropped without save().
    }

    assert!(!path.exists());
}

#[tokio::test]
async fn test_corrupted_snapshot_loads_resiliently() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");

    let content = concat!(
        r#"{"kind":"issue","id":"issue-good","title":"survivor"}"#,
        "\n",
        "}}} definitely broken {{{\n",
    );
    std::fs::write(&path, content).unwrap();

    let (store, warnings) = InMemoryStore::with_data_file(path).await.unwrap();

    assert_eq!(warnings.len(), 1);
    let issue = store
        .issue(&"issue-good".into())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(issue.title(), "survivor");
}

#[tokio::test]
async fn test_app_over_file_backed_store_saves_creates_immediately() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");

    let (store, warnings) = InMemoryStore::with_data_file(path.clone()).await.unwrap();
    assert!(warnings.is_empty());

    let store = Arc::new(store);
    let mut app = test_app(Arc::clone(&store));

    app.new_issue().await.unwrap();

    // new_issue saves synchronously, so the snapshot is already on disk.
    assert!(path.exists());
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn test_loaded_ids_never_collide_with_new_ones() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");

    {
        let store = create_store(StoreBackend::Jsonl(path.clone())).await.unwrap();
        for n in 0..20 {
            insert_titled_dyn(store.as_ref(), &format!("entry {}", n)).await;
        }
        store.save().await.unwrap();
    }

    let store = create_store(StoreBackend::Jsonl(path)).await.unwrap();
    for n in 0..20 {
        insert_titled_dyn(store.as_ref(), &format!("more {}", n)).await;
    }

    use quill::store::IssuePredicate;
    assert_eq!(store.count_issues(&IssuePredicate::True).await.unwrap(), 40);
}

async fn insert_titled_dyn(store: &dyn RecordStore, title: &str) {
    store.insert_issue(NewIssue::titled(title)).await.unwrap();
}
