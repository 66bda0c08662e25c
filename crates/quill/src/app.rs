//! Application context for the journal core.
//!
//! [`App`] is the single logical owner of all mutable state: the record
//! store handle, the current [`FilterQuery`], the persistence scheduler,
//! and the award catalog. Presentation layers call its operations and
//! subscribe to its [`StateChange`] events; nothing in this crate depends
//! on them in return.
//!
//! # Persistence policy
//!
//! Create and delete operations save immediately so they are durable before
//! returning. Field edits go through [`App::queue_save`], which debounces
//! bursts into one write. Failed writes are swallowed by design (the
//! journal favors an optimistic local-first experience over surfacing
//! errors) but observable via [`App::save_failure_count`] and a warning in
//! the log.

use crate::awards::{Award, AwardCatalog, Criterion};
use crate::config::QuillConfig;
use crate::domain::{
    Issue, IssueId, IssueUpdate, NewIssue, NewTag, Tag, TagId, DEFAULT_ISSUE_TITLE,
    DEFAULT_TAG_NAME,
};
use crate::error::Result;
use crate::filter::Filter;
use crate::query::{self, FilterQuery};
use crate::scheduler::{SaveScheduler, DEFAULT_SAVE_DELAY};
use crate::store::{create_store, IssuePredicate, RecordStore, StoreBackend};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notification that observable state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// A mutation made through this process.
    Local,

    /// An externally-originated change reported by the record store; the
    /// app re-signals it without writing anything itself.
    Remote,
}

/// The application context.
///
/// # Example
///
/// ```no_run
/// use quill::app::App;
/// use quill::store::StoreBackend;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> anyhow::Result<()> {
///     let mut app = App::new(StoreBackend::InMemory).await?;
///     let issue = app.new_issue().await?;
///     assert_eq!(issue.title(), "New Issue");
///     Ok(())
/// }
/// ```
pub struct App {
    store: Arc<dyn RecordStore>,
    query: FilterQuery,
    scheduler: SaveScheduler,
    catalog: AwardCatalog,
    events: broadcast::Sender<StateChange>,
    save_failures: Arc<AtomicU64>,
    remote_task: JoinHandle<()>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("query", &self.query)
            .field("awards", &self.catalog.len())
            .field("store", &"<dyn RecordStore>")
            .finish()
    }
}

/// Save if anything is pending, swallowing (but counting) failures.
async fn best_effort_save(store: Arc<dyn RecordStore>, failures: Arc<AtomicU64>) {
    if !store.has_pending_changes().await {
        return;
    }

    if let Err(error) = store.save().await {
        failures.fetch_add(1, Ordering::SeqCst);
        warn!(%error, "store save failed, changes remain pending");
    }
}

impl App {
    /// Create an app over the given backend with the bundled award catalog.
    ///
    /// # Errors
    ///
    /// Fails fast if the catalog cannot be decoded or the backend cannot be
    /// opened; the process must not start partially initialized.
    pub async fn new(backend: StoreBackend) -> Result<Self> {
        Self::with_catalog(backend, AwardCatalog::bundled()?).await
    }

    /// Create an app over the given backend with an explicit catalog.
    pub async fn with_catalog(backend: StoreBackend, catalog: AwardCatalog) -> Result<Self> {
        let store = create_store(backend).await?;
        Ok(Self::with_store(store, catalog, DEFAULT_SAVE_DELAY))
    }

    /// Create an app from a loaded configuration.
    pub async fn from_config(config: &QuillConfig) -> Result<Self> {
        let catalog = match &config.awards_file {
            Some(path) => AwardCatalog::load(path).await?,
            None => AwardCatalog::bundled()?,
        };
        let store = create_store(config.to_backend()?).await?;
        Ok(Self::with_store(store, catalog, config.save_delay()))
    }

    /// Create an app around an existing store handle.
    ///
    /// Useful for tests and for embedders that construct their own store.
    /// Must be called from within a tokio runtime: the app spawns a task
    /// forwarding the store's remote-change events to its own subscribers.
    pub fn with_store(
        store: Arc<dyn RecordStore>,
        catalog: AwardCatalog,
        save_delay: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let mut remote_rx = store.subscribe_remote();
        let remote_events = events.clone();
        let remote_task = tokio::spawn(async move {
            loop {
                match remote_rx.recv().await {
                    // Re-signal observers; never write in response to a
                    // remote change, or two peers would amplify each other.
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        let _ = remote_events.send(StateChange::Remote);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            store,
            query: FilterQuery::default(),
            scheduler: SaveScheduler::with_delay(save_delay),
            catalog,
            events,
            save_failures: Arc::new(AtomicU64::new(0)),
            remote_task,
        }
    }

    /// Subscribe to state-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// The underlying record store.
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    fn changed(&self) {
        let _ = self.events.send(StateChange::Local);
    }

    // ========== Query State ==========

    /// The current filter/sort state.
    pub fn query(&self) -> &FilterQuery {
        &self.query
    }

    /// Mutate the filter/sort state and notify observers once.
    pub fn update_query(&mut self, update: impl FnOnce(&mut FilterQuery)) {
        update(&mut self.query);
        self.changed();
    }

    /// Select a different filter, resetting nothing else.
    pub fn select_filter(&mut self, filter: Filter) {
        self.update_query(|query| query.selected_filter = filter);
    }

    // ========== Query Engine ==========

    /// The ordered, fully-filtered issues for the current query state.
    pub async fn issues_for_selected_filter(&self) -> Vec<Issue> {
        query::issues_for_query(self.store.as_ref(), &self.query).await
    }

    /// Tags to suggest as search tokens for the current filter text.
    pub async fn suggested_filter_tokens(&self) -> Vec<Tag> {
        query::suggested_filter_tokens(self.store.as_ref(), &self.query).await
    }

    /// Open-issue count for a filter's badge; 0 for smart filters.
    pub async fn active_issue_count(&self, filter: &Filter) -> usize {
        let Some(tag_id) = &filter.tag else {
            return 0;
        };

        match self.store.tag_active_issues(tag_id).await {
            Ok(issues) => issues.len(),
            Err(error) => {
                warn!(%error, "active issue count failed, treating as zero");
                0
            }
        }
    }

    // ========== Record Operations ==========

    /// Create a new issue with defaults, pre-attached to the selected
    /// filter's tag when there is one. Durable before returning.
    pub async fn new_issue(&mut self) -> Result<Issue> {
        let mut new_issue = NewIssue::titled(DEFAULT_ISSUE_TITLE);
        if let Some(tag_id) = &self.query.selected_filter.tag {
            new_issue.tags.push(tag_id.clone());
        }

        let issue = self.store.insert_issue(new_issue).await?;
        self.changed();
        self.save().await;

        Ok(issue)
    }

    /// Create a new tag with the default name. Durable before returning.
    pub async fn new_tag(&mut self) -> Result<Tag> {
        let tag = self.store.insert_tag(NewTag::named(DEFAULT_TAG_NAME)).await?;
        self.changed();
        self.save().await;

        Ok(tag)
    }

    /// Apply a partial update to an issue; the write is debounced.
    pub async fn update_issue(&mut self, id: &IssueId, update: IssueUpdate) -> Result<Issue> {
        let issue = self.store.update_issue(id, update).await?;
        self.changed();
        self.queue_save();

        Ok(issue)
    }

    /// Rename a tag; the write is debounced.
    pub async fn rename_tag(&mut self, id: &TagId, name: impl Into<String>) -> Result<Tag> {
        let tag = self.store.rename_tag(id, name.into()).await?;
        self.changed();
        self.queue_save();

        Ok(tag)
    }

    /// Relate an issue and a tag (both sides); the write is debounced.
    pub async fn add_tag_to_issue(&mut self, issue_id: &IssueId, tag_id: &TagId) -> Result<()> {
        self.store.attach_tag(issue_id, tag_id).await?;
        self.changed();
        self.queue_save();

        Ok(())
    }

    /// Unrelate an issue and a tag (both sides); the write is debounced.
    pub async fn remove_tag_from_issue(
        &mut self,
        issue_id: &IssueId,
        tag_id: &TagId,
    ) -> Result<()> {
        self.store.detach_tag(issue_id, tag_id).await?;
        self.changed();
        self.queue_save();

        Ok(())
    }

    /// Delete an issue. Durable before returning.
    pub async fn delete_issue(&mut self, id: &IssueId) -> Result<()> {
        // Observers hear about the deletion before it happens, matching the
        // will-change semantics presentation layers expect.
        self.changed();
        self.store.delete_issue(id).await?;
        self.save().await;

        Ok(())
    }

    /// Delete a tag, cascading to its related issues. Durable before
    /// returning; the cascaded issue IDs are returned.
    pub async fn delete_tag(&mut self, id: &TagId) -> Result<Vec<IssueId>> {
        self.changed();
        let cascaded = self.store.delete_tag(id).await?;
        self.save().await;

        Ok(cascaded)
    }

    /// Delete every record. Durable before returning.
    pub async fn delete_all(&mut self) -> Result<()> {
        self.changed();
        self.store.delete_all_tags().await?;
        self.store.delete_all_issues().await?;
        self.save().await;

        Ok(())
    }

    /// Every tag NOT related to the given issue, in natural tag order.
    pub async fn missing_tags(&self, id: &IssueId) -> Result<Vec<Tag>> {
        self.store.missing_tags(id).await
    }

    /// Seed 5 tags with 10 issues each, for demos and tests.
    pub async fn create_sample_data(&mut self) -> Result<()> {
        for tag_counter in 1u8..=5 {
            let tag = self
                .store
                .insert_tag(NewTag::named(format!("Tag {}", tag_counter)))
                .await?;

            for issue_counter in 1u8..=10 {
                let new_issue = NewIssue {
                    title: Some(format!("Issue {}-{}", tag_counter, issue_counter)),
                    content: Some("Description goes here".to_string()),
                    completed: issue_counter % 2 == 0,
                    priority: issue_counter % 3,
                    tags: vec![tag.id.clone()],
                };
                self.store.insert_issue(new_issue).await?;
            }
        }

        self.changed();
        self.save().await;

        Ok(())
    }

    // ========== Persistence ==========

    /// Save now, best-effort: a no-op when nothing is pending, and a
    /// swallowed-but-counted failure when the write errors.
    pub async fn save(&self) {
        best_effort_save(Arc::clone(&self.store), Arc::clone(&self.save_failures)).await;
    }

    /// Schedule a debounced save; repeated calls restart the clock.
    pub fn queue_save(&mut self) {
        let store = Arc::clone(&self.store);
        let failures = Arc::clone(&self.save_failures);
        self.scheduler.queue(best_effort_save(store, failures));
    }

    /// Number of save attempts that failed and were dropped.
    pub fn save_failure_count(&self) -> u64 {
        self.save_failures.load(Ordering::SeqCst)
    }

    // ========== Awards ==========

    /// The loaded award catalog.
    pub fn awards(&self) -> &[Award] {
        self.catalog.awards()
    }

    /// Whether the user has earned the given award.
    ///
    /// Thresholds are inclusive. Count failures and unknown criteria both
    /// evaluate as locked; the latter is additionally flagged as a
    /// catalog-integrity problem.
    pub async fn has_earned(&self, award: &Award) -> bool {
        match &award.criterion {
            Criterion::Issues => {
                self.count_issues_soft(&IssuePredicate::True).await >= award.value
            }
            Criterion::Closed => {
                self.count_issues_soft(&IssuePredicate::Completed(true)).await >= award.value
            }
            Criterion::Tags => match self.store.count_tags().await {
                Ok(count) => count >= award.value,
                Err(error) => {
                    warn!(%error, "tag count failed, treating award as locked");
                    false
                }
            },
            Criterion::Unknown(criterion) => {
                warn!(
                    award = %award.name,
                    %criterion,
                    "unknown award criterion, treating as locked"
                );
                false
            }
        }
    }

    async fn count_issues_soft(&self, predicate: &IssuePredicate) -> usize {
        match self.store.count_issues(predicate).await {
            Ok(count) => count,
            Err(error) => {
                warn!(%error, "issue count failed, treating as zero");
                0
            }
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.remote_task.abort();
    }
}
