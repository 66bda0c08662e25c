//! The query engine: composes the current [`FilterQuery`] state into one
//! compound predicate plus sort descriptors and executes it against the
//! record store.
//!
//! Queries are pure reads: re-running the same state against an unchanged
//! store yields an identical ordered result. Store failures degrade to an
//! empty result by policy - availability is preferred over error visibility
//! here, and the drop is logged rather than surfaced.

use crate::domain::{Issue, Tag, TagId};
use crate::filter::Filter;
use crate::store::{IssuePredicate, RecordStore, SortDescriptor, SortKey, TagPredicate};
use tracing::warn;

/// Completion-status constraint applied by the advanced filter controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    /// No status constraint.
    #[default]
    All,
    /// Only issues with `completed == false`.
    Open,
    /// Only issues with `completed == true`.
    Closed,
}

/// Which issue attribute drives the primary sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortType {
    /// Sort by creation date.
    #[default]
    DateCreated,
    /// Sort by last modification date.
    DateModified,
    /// Sort by title, case-insensitively.
    Title,
}

impl SortType {
    fn key(self) -> SortKey {
        match self {
            SortType::DateCreated => SortKey::CreationDate,
            SortType::DateModified => SortKey::ModificationDate,
            SortType::Title => SortKey::Title,
        }
    }
}

/// The full current set of filtering and sorting parameters.
///
/// One logical instance exists per application ([`crate::app::App`] owns
/// it); the engine reads it on every query. All fields are plain data so
/// presentation layers can bind to them directly.
#[derive(Debug, Clone)]
pub struct FilterQuery {
    /// The selected view of the record set.
    pub selected_filter: Filter,

    /// Free-text search over title and content; ignored when blank.
    pub filter_text: String,

    /// Explicit tag tokens; an issue must carry every one of them.
    pub filter_tokens: Vec<TagId>,

    /// Master switch for the advanced (priority/status) constraints.
    pub filter_enabled: bool,

    /// Priority constraint; `None` means any priority.
    pub filter_priority: Option<u8>,

    /// Completion-status constraint.
    pub filter_status: StatusFilter,

    /// Primary sort attribute.
    pub sort_type: SortType,

    /// When true, newest first (or reverse-alphabetical for title sort).
    pub sort_newest_first: bool,

    /// When true, equal primary keys fall back to case-insensitive title
    /// before creation date.
    pub sort_title_tiebreak: bool,
}

impl Default for FilterQuery {
    fn default() -> Self {
        Self {
            selected_filter: Filter::all(),
            filter_text: String::new(),
            filter_tokens: Vec::new(),
            filter_enabled: false,
            filter_priority: None,
            filter_status: StatusFilter::All,
            sort_type: SortType::default(),
            sort_newest_first: true,
            sort_title_tiebreak: true,
        }
    }
}

/// Compose the compound predicate for the given query state.
///
/// Sub-predicates are ANDed together:
///
/// 1. Scope: tag membership when the selected filter carries a tag,
///    otherwise a strict lower bound on the modification date.
/// 2. Free text (when non-blank after trimming): case-insensitive substring
///    match on title OR content.
/// 3. One tag-membership predicate per selected token (conjunctive).
/// 4. Priority and status constraints, only while `filter_enabled` is true.
pub fn predicate(query: &FilterQuery) -> IssuePredicate {
    let mut parts = Vec::new();

    if let Some(tag_id) = &query.selected_filter.tag {
        parts.push(IssuePredicate::HasTag(tag_id.clone()));
    } else {
        parts.push(IssuePredicate::ModifiedAfter(
            query.selected_filter.min_modification_date,
        ));
    }

    let trimmed = query.filter_text.trim();
    if !trimmed.is_empty() {
        parts.push(IssuePredicate::TextContains(trimmed.to_string()));
    }

    for token in &query.filter_tokens {
        parts.push(IssuePredicate::HasTag(token.clone()));
    }

    if query.filter_enabled {
        if let Some(priority) = query.filter_priority {
            parts.push(IssuePredicate::Priority(priority));
        }

        match query.filter_status {
            StatusFilter::All => {}
            StatusFilter::Open => parts.push(IssuePredicate::Completed(false)),
            StatusFilter::Closed => parts.push(IssuePredicate::Completed(true)),
        }
    }

    IssuePredicate::And(parts)
}

/// Sort descriptors for the given query state: the selected key in the
/// configured direction, then the tie-breaks guaranteeing a deterministic
/// total order (title ascending unless disabled, then creation date).
pub fn sort_descriptors(query: &FilterQuery) -> Vec<SortDescriptor> {
    let mut descriptors = vec![SortDescriptor {
        key: query.sort_type.key(),
        ascending: !query.sort_newest_first,
    }];

    if query.sort_title_tiebreak {
        descriptors.push(SortDescriptor {
            key: SortKey::Title,
            ascending: true,
        });
    }

    descriptors.push(SortDescriptor {
        key: SortKey::CreationDate,
        ascending: true,
    });

    descriptors
}

/// Return the ordered, fully-filtered sequence of issues for the given
/// query state.
///
/// The predicate is pushed to the store in a single fetch. Any store read
/// failure degrades to an empty result; this is deliberate policy, not an
/// oversight - see the module docs.
pub async fn issues_for_query(store: &dyn RecordStore, query: &FilterQuery) -> Vec<Issue> {
    match store
        .fetch_issues(&predicate(query), &sort_descriptors(query))
        .await
    {
        Ok(issues) => issues,
        Err(error) => {
            warn!(%error, "issue query failed, returning no results");
            Vec::new()
        }
    }
}

/// Tags to suggest as search tokens for the current filter text.
///
/// Blank text suggests every tag; otherwise tags whose name contains the
/// trimmed text case-insensitively. Results come back in natural tag order
/// and degrade to empty on store failure.
pub async fn suggested_filter_tokens(store: &dyn RecordStore, query: &FilterQuery) -> Vec<Tag> {
    let trimmed = query.filter_text.trim();

    let predicate = if trimmed.is_empty() {
        TagPredicate::All
    } else {
        TagPredicate::NameContains(trimmed.to_string())
    };

    match store.fetch_tags(&predicate).await {
        Ok(tags) => tags,
        Err(error) => {
            warn!(%error, "tag suggestion query failed, returning no results");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IssueId, DEFAULT_PRIORITY};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn issue(title: &str, content: &str, tags: &[&str]) -> Issue {
        Issue {
            id: IssueId::new("issue-t1"),
            title: Some(title.to_string()),
            content: Some(content.to_string()),
            creation_date: Some(Utc.timestamp_opt(1_000, 0).unwrap()),
            modification_date: Some(Utc.timestamp_opt(2_000, 0).unwrap()),
            completed: false,
            priority: DEFAULT_PRIORITY,
            tags: tags.iter().map(|t| TagId::new(*t)).collect(),
        }
    }

    #[test]
    fn test_scope_uses_tag_when_filter_carries_one() {
        let mut query = FilterQuery::default();
        query.selected_filter.tag = Some(TagId::new("tag-work"));

        let p = predicate(&query);

        assert!(p.matches(&issue("a", "", &["tag-work"])));
        assert!(!p.matches(&issue("a", "", &["tag-home"])));
    }

    #[test]
    fn test_scope_uses_modification_date_otherwise() {
        let mut query = FilterQuery::default();
        query.selected_filter.min_modification_date = Utc.timestamp_opt(5_000, 0).unwrap();

        // Modified at t=2000, bound at t=5000: excluded.
        assert!(!predicate(&query).matches(&issue("a", "", &[])));

        query.selected_filter.min_modification_date = Utc.timestamp_opt(0, 0).unwrap();
        assert!(predicate(&query).matches(&issue("a", "", &[])));
    }

    #[test]
    fn test_text_matches_title_or_content_case_insensitively() {
        let query = FilterQuery {
            filter_text: "  NEEDLE ".to_string(),
            ..FilterQuery::default()
        };
        let p = predicate(&query);

        assert!(p.matches(&issue("has a needle here", "", &[])));
        assert!(p.matches(&issue("nothing", "Needle in content", &[])));
        assert!(!p.matches(&issue("nothing", "nothing", &[])));
    }

    #[test]
    fn test_blank_text_adds_no_constraint() {
        let query = FilterQuery {
            filter_text: "   ".to_string(),
            ..FilterQuery::default()
        };

        assert!(predicate(&query).matches(&issue("anything", "", &[])));
    }

    #[test]
    fn test_tokens_are_conjunctive() {
        let query = FilterQuery {
            filter_tokens: vec![TagId::new("tag-a"), TagId::new("tag-c")],
            ..FilterQuery::default()
        };
        let p = predicate(&query);

        // Carries A and B but not C: excluded.
        assert!(!p.matches(&issue("x", "", &["tag-a", "tag-b"])));
        assert!(p.matches(&issue("x", "", &["tag-a", "tag-b", "tag-c"])));
    }

    #[test]
    fn test_advanced_constraints_inert_when_disabled() {
        let query = FilterQuery {
            filter_enabled: false,
            filter_priority: Some(2),
            filter_status: StatusFilter::Closed,
            ..FilterQuery::default()
        };

        let mut low_priority_open = issue("x", "", &[]);
        low_priority_open.priority = 0;

        assert!(predicate(&query).matches(&low_priority_open));
    }

    #[rstest]
    #[case(StatusFilter::All, true, true)]
    #[case(StatusFilter::Open, true, false)]
    #[case(StatusFilter::Closed, false, true)]
    fn test_status_filter_selects_matching_state(
        #[case] status: StatusFilter,
        #[case] open_matches: bool,
        #[case] closed_matches: bool,
    ) {
        let query = FilterQuery {
            filter_enabled: true,
            filter_status: status,
            ..FilterQuery::default()
        };
        let p = predicate(&query);

        let open = issue("x", "", &[]);
        let mut closed = issue("x", "", &[]);
        closed.completed = true;

        assert_eq!(p.matches(&open), open_matches);
        assert_eq!(p.matches(&closed), closed_matches);
    }

    #[test]
    fn test_advanced_constraints_apply_when_enabled() {
        let query = FilterQuery {
            filter_enabled: true,
            filter_priority: Some(2),
            filter_status: StatusFilter::Closed,
            ..FilterQuery::default()
        };
        let p = predicate(&query);

        let mut matching = issue("x", "", &[]);
        matching.priority = 2;
        matching.completed = true;
        assert!(p.matches(&matching));

        let mut wrong_priority = issue("x", "", &[]);
        wrong_priority.priority = 0;
        wrong_priority.completed = true;
        assert!(!p.matches(&wrong_priority));

        let mut still_open = issue("x", "", &[]);
        still_open.priority = 2;
        assert!(!p.matches(&still_open));
    }

    #[test]
    fn test_sort_descriptors_shape() {
        let query = FilterQuery::default();
        let descriptors = sort_descriptors(&query);

        assert_eq!(descriptors.len(), 3);
        assert_eq!(descriptors[0].key, SortKey::CreationDate);
        assert!(!descriptors[0].ascending);
        assert_eq!(descriptors[1].key, SortKey::Title);
        assert!(descriptors[1].ascending);
        assert_eq!(descriptors[2].key, SortKey::CreationDate);
        assert!(descriptors[2].ascending);
    }

    #[test]
    fn test_sort_descriptors_without_title_tiebreak() {
        let query = FilterQuery {
            sort_title_tiebreak: false,
            sort_type: SortType::Title,
            sort_newest_first: false,
            ..FilterQuery::default()
        };
        let descriptors = sort_descriptors(&query);

        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].key, SortKey::Title);
        assert!(descriptors[0].ascending);
        assert_eq!(descriptors[1].key, SortKey::CreationDate);
    }
}
