//! Record store abstraction for quill.
//!
//! This module defines the durable-storage contract the rest of the crate
//! depends on, the predicate/sort vocabulary pushed down into it, and a
//! factory for the provided backend. The store is the single writer-view of
//! all records: relationship edges, timestamps, and the pending-changes flag
//! are maintained here and nowhere else.
//!
//! # Architecture
//!
//! The trait is async and object-safe, allowing dynamic dispatch via
//! `Arc<dyn RecordStore>`. All methods take `&self`; implementations use
//! interior mutability (the in-memory backend holds its state behind a
//! `Mutex`) so that a shared handle can be saved from background tasks -
//! the debounced persistence scheduler relies on exactly this.
//!
//! # Failure policy
//!
//! Methods return `Result`; the policy of degrading reads to empty results
//! and swallowing write failures lives in the callers ([`crate::query`],
//! [`crate::app`]), keeping this layer honest about what actually happened.

use crate::domain::{
    Issue, IssueId, IssueUpdate, NewIssue, NewTag, Tag, TagId,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

// Storage backend implementations
pub mod in_memory;
mod snapshot;

pub use in_memory::InMemoryStore;
pub use snapshot::LoadWarning;

/// Marker event emitted when the backing data changed outside this process
/// (e.g., a sync layer merged records from another device).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteChange;

/// A predicate over issues, pushed down into the store so filtering happens
/// at the storage layer rather than over a broad in-application fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuePredicate {
    /// Matches every issue.
    True,

    /// Matches issues whose modification date is strictly after the bound.
    ModifiedAfter(DateTime<Utc>),

    /// Matches issues related to the given tag.
    HasTag(TagId),

    /// Matches issues whose title OR content contains the needle,
    /// case-insensitively.
    TextContains(String),

    /// Matches issues with exactly this priority.
    Priority(u8),

    /// Matches issues with this completion state.
    Completed(bool),

    /// Matches issues satisfying every sub-predicate.
    And(Vec<IssuePredicate>),
}

impl IssuePredicate {
    /// Evaluate this predicate against a single issue.
    pub fn matches(&self, issue: &Issue) -> bool {
        match self {
            IssuePredicate::True => true,
            IssuePredicate::ModifiedAfter(bound) => issue.modification_date() > *bound,
            IssuePredicate::HasTag(tag_id) => issue.has_tag(tag_id),
            IssuePredicate::TextContains(needle) => {
                let needle = needle.to_lowercase();
                issue.title().to_lowercase().contains(&needle)
                    || issue.content().to_lowercase().contains(&needle)
            }
            IssuePredicate::Priority(priority) => issue.priority == *priority,
            IssuePredicate::Completed(completed) => issue.completed == *completed,
            IssuePredicate::And(parts) => parts.iter().all(|p| p.matches(issue)),
        }
    }
}

/// A predicate over tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagPredicate {
    /// Matches every tag.
    All,

    /// Matches tags whose name contains the needle, case-insensitively.
    NameContains(String),
}

impl TagPredicate {
    /// Evaluate this predicate against a single tag.
    pub fn matches(&self, tag: &Tag) -> bool {
        match self {
            TagPredicate::All => true,
            TagPredicate::NameContains(needle) => {
                tag.name().to_lowercase().contains(&needle.to_lowercase())
            }
        }
    }
}

/// Issue attribute a [`SortDescriptor`] orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Creation date.
    CreationDate,

    /// Last modification date.
    ModificationDate,

    /// Title, compared case-insensitively.
    Title,
}

/// One step of a lexicographic sort order over issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortDescriptor {
    /// Attribute to compare.
    pub key: SortKey,

    /// Ascending (oldest/alphabetically-first first) when true.
    pub ascending: bool,
}

impl SortDescriptor {
    fn compare(&self, a: &Issue, b: &Issue) -> Ordering {
        let ordering = match self.key {
            SortKey::CreationDate => a.creation_date().cmp(&b.creation_date()),
            SortKey::ModificationDate => a.modification_date().cmp(&b.modification_date()),
            SortKey::Title => a.title().to_lowercase().cmp(&b.title().to_lowercase()),
        };

        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Compare two issues under a lexicographic list of descriptors, falling
/// back to the record ID so the result is deterministic even for issues
/// with identical keys all the way down.
pub fn compare_with(descriptors: &[SortDescriptor], a: &Issue, b: &Issue) -> Ordering {
    descriptors
        .iter()
        .map(|d| d.compare(a, b))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or_else(|| a.id.cmp(&b.id))
}

/// Durable, mergeable key-object storage with predicate query support.
///
/// # Method Categories
///
/// - **CRUD**: `insert_issue`, `insert_tag`, `issue`, `tag`, `update_issue`,
///   `rename_tag`, `delete_issue`, `delete_tag`, `delete_all_issues`,
///   `delete_all_tags`
/// - **Relationship**: `attach_tag`, `detach_tag`, `issue_tags`,
///   `tag_active_issues`, `missing_tags`
/// - **Queries**: `fetch_issues`, `fetch_tags`, `count_issues`, `count_tags`
/// - **Persistence**: `save`, `has_pending_changes`
/// - **Sync**: `subscribe_remote`
///
/// # Relationship invariant
///
/// The Issue<->Tag relationship is bidirectional; `attach_tag` and
/// `detach_tag` update both sides atomically under one lock. Callers must
/// never try to maintain one side themselves.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ========== CRUD Operations ==========

    /// Create a new issue, stamping its ID and both dates.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPriority` if priority exceeds 2, or
    /// `Error::TagNotFound` if a requested tag does not exist.
    async fn insert_issue(&self, new_issue: NewIssue) -> Result<Issue>;

    /// Create a new tag.
    async fn insert_tag(&self, new_tag: NewTag) -> Result<Tag>;

    /// Get an issue by ID. Returns `None` if it doesn't exist.
    async fn issue(&self, id: &IssueId) -> Result<Option<Issue>>;

    /// Get a tag by ID. Returns `None` if it doesn't exist.
    async fn tag(&self, id: &TagId) -> Result<Option<Tag>>;

    /// Update an existing issue. Only fields present in `update` are
    /// modified; the modification date is restamped.
    ///
    /// # Errors
    ///
    /// Returns `Error::IssueNotFound` if the issue doesn't exist.
    async fn update_issue(&self, id: &IssueId, update: IssueUpdate) -> Result<Issue>;

    /// Rename an existing tag.
    ///
    /// # Errors
    ///
    /// Returns `Error::TagNotFound` if the tag doesn't exist.
    async fn rename_tag(&self, id: &TagId, name: String) -> Result<Tag>;

    /// Delete an issue, detaching it from all of its tags.
    async fn delete_issue(&self, id: &IssueId) -> Result<()>;

    /// Delete a tag, cascading to every issue related to it.
    ///
    /// Cascaded issues are detached from their other tags first so no
    /// dangling references remain. Returns the IDs of the deleted issues.
    async fn delete_tag(&self, id: &TagId) -> Result<Vec<IssueId>>;

    /// Bulk-delete every issue. Returns the affected IDs.
    async fn delete_all_issues(&self) -> Result<Vec<IssueId>>;

    /// Bulk-delete every tag, detaching related issues (no cascade).
    /// Returns the affected IDs.
    async fn delete_all_tags(&self) -> Result<Vec<TagId>>;

    // ========== Relationship Operations ==========

    /// Atomically relate an issue and a tag (both sides), restamping the
    /// issue's modification date. Idempotent.
    async fn attach_tag(&self, issue_id: &IssueId, tag_id: &TagId) -> Result<()>;

    /// Atomically unrelate an issue and a tag (both sides), restamping the
    /// issue's modification date. Idempotent.
    async fn detach_tag(&self, issue_id: &IssueId, tag_id: &TagId) -> Result<()>;

    /// Tags related to the given issue, in natural tag order.
    async fn issue_tags(&self, id: &IssueId) -> Result<Vec<Tag>>;

    /// Open (not completed) issues related to the given tag, in natural
    /// issue order.
    async fn tag_active_issues(&self, id: &TagId) -> Result<Vec<Issue>>;

    /// Every tag NOT related to the given issue, in natural tag order.
    async fn missing_tags(&self, id: &IssueId) -> Result<Vec<Tag>>;

    // ========== Queries ==========

    /// Issues matching the predicate, ordered by the descriptors (natural
    /// issue order when the descriptor list is empty).
    async fn fetch_issues(
        &self,
        predicate: &IssuePredicate,
        sort: &[SortDescriptor],
    ) -> Result<Vec<Issue>>;

    /// Tags matching the predicate, in natural tag order.
    async fn fetch_tags(&self, predicate: &TagPredicate) -> Result<Vec<Tag>>;

    /// Number of issues matching the predicate.
    async fn count_issues(&self, predicate: &IssuePredicate) -> Result<usize>;

    /// Total number of tags.
    async fn count_tags(&self) -> Result<usize>;

    // ========== Persistence ==========

    /// Write pending changes durably.
    ///
    /// Implementations should make this cheap when nothing changed; callers
    /// are expected to consult [`RecordStore::has_pending_changes`] first.
    async fn save(&self) -> Result<()>;

    /// Whether any mutation happened since the last successful save.
    async fn has_pending_changes(&self) -> bool;

    // ========== Sync ==========

    /// Subscribe to externally-originated change events.
    ///
    /// The owner of the persistence scheduler listens here and re-signals
    /// its own observers without writing, avoiding write amplification.
    fn subscribe_remote(&self) -> broadcast::Receiver<RemoteChange>;
}

/// Storage backend configuration.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// In-memory storage (ephemeral)
    InMemory,

    /// In-memory storage snapshotted to a JSONL file on save
    Jsonl(PathBuf),
}

/// Create a store instance for the given backend.
///
/// # Example
///
/// ```no_run
/// use quill::store::{create_store, RecordStore, StoreBackend};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> anyhow::Result<()> {
///     let store = create_store(StoreBackend::InMemory).await?;
///     let tags = store.count_tags().await?;
///     assert_eq!(tags, 0);
///     Ok(())
/// }
/// ```
///
/// # Errors
///
/// Returns `Error::Io` if the JSONL backing file exists but cannot be read.
pub async fn create_store(backend: StoreBackend) -> Result<Arc<dyn RecordStore>> {
    match backend {
        StoreBackend::InMemory => Ok(Arc::new(InMemoryStore::new())),
        StoreBackend::Jsonl(path) => {
            let (store, warnings) = InMemoryStore::with_data_file(path).await?;
            // Log warnings but continue - the store is still usable
            for warning in &warnings {
                tracing::warn!(warning = ?warning, "snapshot load warning");
            }
            Ok(Arc::new(store))
        }
    }
}
