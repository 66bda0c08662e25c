//! In-memory record store, optionally snapshotted to a JSONL file.
//!
//! All records live in RAM behind a single `Mutex`, matching the
//! single-writer-view discipline of the rest of the crate: every operation
//! acquires the lock, mutates both sides of any relationship it touches,
//! and marks the store dirty. `save()` is cheap when nothing changed and
//! writes an atomic JSONL snapshot when a data file is configured.
//!
//! # Remote changes
//!
//! Cross-device sync is an external process. When a sync layer merges
//! records into the backing data it calls
//! [`InMemoryStore::notify_remote_change`]; subscribers (the application
//! context) re-signal their own observers without writing.

use super::snapshot::{self, LoadWarning};
use super::{
    compare_with, IssuePredicate, RecordStore, RemoteChange, SortDescriptor, TagPredicate,
};
use crate::domain::{
    Issue, IssueId, IssueUpdate, NewIssue, NewTag, Tag, TagId, MAX_PRIORITY,
};
use crate::error::{Error, Result};
use crate::id_generation::IdGenerator;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

const REMOTE_CHANNEL_CAPACITY: usize = 16;

/// Inner storage structure (not thread-safe on its own).
struct StoreInner {
    /// Issues indexed by ID for O(1) lookups
    issues: HashMap<IssueId, Issue>,

    /// Tags indexed by ID
    tags: HashMap<TagId, Tag>,

    /// ID generators, one per record kind
    issue_ids: IdGenerator,
    tag_ids: IdGenerator,

    /// Set by every mutation, cleared by a successful save
    dirty: bool,
}

impl StoreInner {
    fn new() -> Self {
        Self {
            issues: HashMap::new(),
            tags: HashMap::new(),
            issue_ids: IdGenerator::new("issue"),
            tag_ids: IdGenerator::new("tag"),
            dirty: false,
        }
    }
}

/// The provided [`RecordStore`] implementation.
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
    remote: broadcast::Sender<RemoteChange>,
    data_file: Option<PathBuf>,
    saves: AtomicU64,
}

impl InMemoryStore {
    /// Create an empty, ephemeral store.
    pub fn new() -> Self {
        let (remote, _) = broadcast::channel(REMOTE_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(StoreInner::new()),
            remote,
            data_file: None,
            saves: AtomicU64::new(0),
        }
    }

    /// Create a store backed by a JSONL snapshot file.
    ///
    /// If the file exists it is loaded resiliently: malformed lines and
    /// orphaned relationship references are skipped and reported as
    /// [`LoadWarning`]s rather than failing the whole load.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file exists but cannot be read.
    pub async fn with_data_file(
        path: impl Into<PathBuf>,
    ) -> Result<(Self, Vec<LoadWarning>)> {
        let path = path.into();
        let mut inner = StoreInner::new();
        let mut warnings = Vec::new();

        if path.exists() {
            let (issues, tags, load_warnings) = snapshot::load_snapshot(&path).await?;
            for id in issues.keys() {
                inner.issue_ids.register_id(id.as_str().to_string());
            }
            for id in tags.keys() {
                inner.tag_ids.register_id(id.as_str().to_string());
            }
            inner.issues = issues;
            inner.tags = tags;
            warnings = load_warnings;
        }

        let (remote, _) = broadcast::channel(REMOTE_CHANNEL_CAPACITY);
        Ok((
            Self {
                inner: Mutex::new(inner),
                remote,
                data_file: Some(path),
                saves: AtomicU64::new(0),
            },
            warnings,
        ))
    }

    /// Signal that the backing data changed outside this process.
    ///
    /// Called by sync integrations (and tests); fans out to every
    /// [`RecordStore::subscribe_remote`] subscriber.
    pub fn notify_remote_change(&self) {
        let _ = self.remote.send(RemoteChange);
    }

    /// Number of durable writes performed so far.
    ///
    /// Exposed for observability; the debounce tests assert on it.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert_issue(&self, new_issue: NewIssue) -> Result<Issue> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if new_issue.priority > MAX_PRIORITY {
            return Err(Error::InvalidPriority(new_issue.priority));
        }

        // Validate every requested tag before mutating anything.
        for tag_id in &new_issue.tags {
            if !inner.tags.contains_key(tag_id) {
                return Err(Error::TagNotFound(tag_id.clone()));
            }
        }

        let seed = new_issue.title.as_deref().unwrap_or("");
        let id = IssueId::new(
            inner
                .issue_ids
                .generate(seed)
                .map_err(|e| Error::Store(format!("ID generation failed: {}", e)))?,
        );

        let now = Utc::now();
        let issue = Issue {
            id: id.clone(),
            title: new_issue.title,
            content: new_issue.content,
            creation_date: Some(now),
            modification_date: Some(now),
            completed: new_issue.completed,
            priority: new_issue.priority,
            tags: new_issue.tags.into_iter().collect(),
        };

        for tag_id in &issue.tags {
            if let Some(tag) = inner.tags.get_mut(tag_id) {
                tag.issues.insert(id.clone());
            }
        }

        inner.issues.insert(id.clone(), issue.clone());
        inner.dirty = true;

        Ok(issue)
    }

    async fn insert_tag(&self, new_tag: NewTag) -> Result<Tag> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let seed = new_tag.name.as_deref().unwrap_or("");
        let id = TagId::new(
            inner
                .tag_ids
                .generate(seed)
                .map_err(|e| Error::Store(format!("ID generation failed: {}", e)))?,
        );

        let tag = Tag {
            id: id.clone(),
            name: new_tag.name,
            issues: Default::default(),
        };

        inner.tags.insert(id, tag.clone());
        inner.dirty = true;

        Ok(tag)
    }

    async fn issue(&self, id: &IssueId) -> Result<Option<Issue>> {
        let inner = self.inner.lock().await;
        Ok(inner.issues.get(id).cloned())
    }

    async fn tag(&self, id: &TagId) -> Result<Option<Tag>> {
        let inner = self.inner.lock().await;
        Ok(inner.tags.get(id).cloned())
    }

    async fn update_issue(&self, id: &IssueId, update: IssueUpdate) -> Result<Issue> {
        let mut inner = self.inner.lock().await;

        if let Some(priority) = update.priority {
            if priority > MAX_PRIORITY {
                return Err(Error::InvalidPriority(priority));
            }
        }

        let issue = inner
            .issues
            .get_mut(id)
            .ok_or_else(|| Error::IssueNotFound(id.clone()))?;

        if let Some(title) = update.title {
            issue.title = Some(title);
        }
        if let Some(content) = update.content {
            issue.content = Some(content);
        }
        if let Some(completed) = update.completed {
            issue.completed = completed;
        }
        if let Some(priority) = update.priority {
            issue.priority = priority;
        }

        issue.modification_date = Some(Utc::now());
        let updated = issue.clone();

        inner.dirty = true;
        Ok(updated)
    }

    async fn rename_tag(&self, id: &TagId, name: String) -> Result<Tag> {
        let mut inner = self.inner.lock().await;

        let tag = inner
            .tags
            .get_mut(id)
            .ok_or_else(|| Error::TagNotFound(id.clone()))?;

        tag.name = Some(name);
        let renamed = tag.clone();

        inner.dirty = true;
        Ok(renamed)
    }

    async fn delete_issue(&self, id: &IssueId) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let issue = inner
            .issues
            .remove(id)
            .ok_or_else(|| Error::IssueNotFound(id.clone()))?;

        for tag_id in &issue.tags {
            if let Some(tag) = inner.tags.get_mut(tag_id) {
                tag.issues.remove(id);
            }
        }

        inner.dirty = true;
        Ok(())
    }

    async fn delete_tag(&self, id: &TagId) -> Result<Vec<IssueId>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let tag = inner
            .tags
            .remove(id)
            .ok_or_else(|| Error::TagNotFound(id.clone()))?;

        // Cascade: every issue related to this tag is deleted, after being
        // detached from any other tags it carries.
        let mut cascaded = Vec::new();
        for issue_id in &tag.issues {
            if let Some(issue) = inner.issues.remove(issue_id) {
                for other_tag_id in &issue.tags {
                    if other_tag_id == id {
                        continue;
                    }
                    if let Some(other_tag) = inner.tags.get_mut(other_tag_id) {
                        other_tag.issues.remove(issue_id);
                    }
                }
                cascaded.push(issue_id.clone());
            }
        }

        inner.dirty = true;
        Ok(cascaded)
    }

    async fn delete_all_issues(&self) -> Result<Vec<IssueId>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let mut ids: Vec<IssueId> = inner.issues.keys().cloned().collect();
        ids.sort();

        inner.issues.clear();
        for tag in inner.tags.values_mut() {
            tag.issues.clear();
        }

        inner.dirty = true;
        Ok(ids)
    }

    async fn delete_all_tags(&self) -> Result<Vec<TagId>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let mut ids: Vec<TagId> = inner.tags.keys().cloned().collect();
        ids.sort();

        inner.tags.clear();
        for issue in inner.issues.values_mut() {
            issue.tags.clear();
        }

        inner.dirty = true;
        Ok(ids)
    }

    async fn attach_tag(&self, issue_id: &IssueId, tag_id: &TagId) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if !inner.tags.contains_key(tag_id) {
            return Err(Error::TagNotFound(tag_id.clone()));
        }
        let Some(issue) = inner.issues.get_mut(issue_id) else {
            return Err(Error::IssueNotFound(issue_id.clone()));
        };

        // Idempotent: only stamp and dirty when the edge is new.
        if issue.tags.insert(tag_id.clone()) {
            issue.modification_date = Some(Utc::now());
            if let Some(tag) = inner.tags.get_mut(tag_id) {
                tag.issues.insert(issue_id.clone());
            }
            inner.dirty = true;
        }

        Ok(())
    }

    async fn detach_tag(&self, issue_id: &IssueId, tag_id: &TagId) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if !inner.tags.contains_key(tag_id) {
            return Err(Error::TagNotFound(tag_id.clone()));
        }
        let Some(issue) = inner.issues.get_mut(issue_id) else {
            return Err(Error::IssueNotFound(issue_id.clone()));
        };

        if issue.tags.remove(tag_id) {
            issue.modification_date = Some(Utc::now());
            if let Some(tag) = inner.tags.get_mut(tag_id) {
                tag.issues.remove(issue_id);
            }
            inner.dirty = true;
        }

        Ok(())
    }

    async fn issue_tags(&self, id: &IssueId) -> Result<Vec<Tag>> {
        let inner = self.inner.lock().await;

        let issue = inner
            .issues
            .get(id)
            .ok_or_else(|| Error::IssueNotFound(id.clone()))?;

        let mut tags: Vec<Tag> = issue
            .tags
            .iter()
            .filter_map(|tag_id| inner.tags.get(tag_id))
            .cloned()
            .collect();
        tags.sort();

        Ok(tags)
    }

    async fn tag_active_issues(&self, id: &TagId) -> Result<Vec<Issue>> {
        let inner = self.inner.lock().await;

        let tag = inner
            .tags
            .get(id)
            .ok_or_else(|| Error::TagNotFound(id.clone()))?;

        let mut issues: Vec<Issue> = tag
            .issues
            .iter()
            .filter_map(|issue_id| inner.issues.get(issue_id))
            .filter(|issue| !issue.completed)
            .cloned()
            .collect();
        issues.sort();

        Ok(issues)
    }

    async fn missing_tags(&self, id: &IssueId) -> Result<Vec<Tag>> {
        let inner = self.inner.lock().await;

        let issue = inner
            .issues
            .get(id)
            .ok_or_else(|| Error::IssueNotFound(id.clone()))?;

        let mut tags: Vec<Tag> = inner
            .tags
            .values()
            .filter(|tag| !issue.has_tag(&tag.id))
            .cloned()
            .collect();
        tags.sort();

        Ok(tags)
    }

    async fn fetch_issues(
        &self,
        predicate: &IssuePredicate,
        sort: &[SortDescriptor],
    ) -> Result<Vec<Issue>> {
        let inner = self.inner.lock().await;

        let mut issues: Vec<Issue> = inner
            .issues
            .values()
            .filter(|issue| predicate.matches(issue))
            .cloned()
            .collect();

        if sort.is_empty() {
            issues.sort();
        } else {
            issues.sort_by(|a, b| compare_with(sort, a, b));
        }

        Ok(issues)
    }

    async fn fetch_tags(&self, predicate: &TagPredicate) -> Result<Vec<Tag>> {
        let inner = self.inner.lock().await;

        let mut tags: Vec<Tag> = inner
            .tags
            .values()
            .filter(|tag| predicate.matches(tag))
            .cloned()
            .collect();
        tags.sort();

        Ok(tags)
    }

    async fn count_issues(&self, predicate: &IssuePredicate) -> Result<usize> {
        let inner = self.inner.lock().await;
        Ok(inner
            .issues
            .values()
            .filter(|issue| predicate.matches(issue))
            .count())
    }

    async fn count_tags(&self) -> Result<usize> {
        let inner = self.inner.lock().await;
        Ok(inner.tags.len())
    }

    async fn save(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if !inner.dirty {
            return Ok(());
        }

        if let Some(path) = &self.data_file {
            snapshot::write_snapshot(&inner.issues, &inner.tags, path).await?;
        }

        inner.dirty = false;
        self.saves.fetch_add(1, Ordering::SeqCst);
        debug!(saves = self.save_count(), "store saved");

        Ok(())
    }

    async fn has_pending_changes(&self) -> bool {
        self.inner.lock().await.dirty
    }

    fn subscribe_remote(&self) -> broadcast::Receiver<RemoteChange> {
        self.remote.subscribe()
    }
}
