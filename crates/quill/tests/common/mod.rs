//! Shared helpers for integration tests.
#![allow(dead_code)] // not every test binary uses every helper

use quill::app::App;
use quill::awards::AwardCatalog;
use quill::domain::{Issue, NewIssue};
use quill::store::{InMemoryStore, RecordStore};
use std::sync::Arc;
use std::time::Duration;

/// Initialize test logging; visibility is controlled via RUST_LOG.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quill=info")),
        )
        .with_test_writer()
        .try_init();
}

/// Build an app around an existing in-memory store with the bundled
/// catalog and the production save delay.
pub fn test_app(store: Arc<InMemoryStore>) -> App {
    App::with_store(store, AwardCatalog::bundled().unwrap(), Duration::from_secs(3))
}

/// Insert an issue with just a title, panicking on failure.
pub async fn insert_titled(store: &InMemoryStore, title: &str) -> Issue {
    store.insert_issue(NewIssue::titled(title)).await.unwrap()
}

/// Titles of the given issues, in order.
pub fn titles(issues: &[Issue]) -> Vec<&str> {
    issues.iter().map(Issue::title).collect()
}
