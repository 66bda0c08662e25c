//! Domain types for the journal.
//!
//! This module contains the two record kinds, [`Issue`] and [`Tag`], and the
//! value types used to create and update them. Several persisted fields are
//! stored as optionals (a record synced from another device may predate a
//! field); consumers never see that optionality - every such field is read
//! through a coalescing accessor that supplies the documented default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// Title given to issues created without one.
pub const DEFAULT_ISSUE_TITLE: &str = "New Issue";

/// Name given to tags created without one.
pub const DEFAULT_TAG_NAME: &str = "New tag";

/// Default priority for new issues (medium).
pub const DEFAULT_PRIORITY: u8 = 1;

/// Highest allowed priority value.
pub const MAX_PRIORITY: u8 = 2;

/// Unique identifier for an issue
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IssueId(pub String);

impl IssueId {
    /// Create a new issue ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IssueId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IssueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a tag
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TagId(pub String);

impl TagId {
    /// Create a new tag ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TagId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TagId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single trackable journal record.
///
/// Title, content, and both dates are stored as optionals and must be read
/// through the coalescing accessors ([`Issue::title`], [`Issue::content`],
/// [`Issue::creation_date`], [`Issue::modification_date`]). The `tags` set is
/// the issue side of the many-to-many relationship with [`Tag`] and is
/// maintained exclusively by the record store so the inverse side always
/// stays consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Unique identifier for the issue
    pub id: IssueId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) creation_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) modification_date: Option<DateTime<Utc>>,

    /// Whether the issue has been closed
    #[serde(default)]
    pub completed: bool,

    /// Priority level (0 = low, 1 = medium, 2 = high)
    #[serde(default = "default_priority")]
    pub priority: u8,

    #[serde(default)]
    pub(crate) tags: BTreeSet<TagId>,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl Issue {
    /// The issue title, coalesced to the empty string when absent.
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    /// The issue content, coalesced to the empty string when absent.
    pub fn content(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// The creation date, coalesced to "now" when absent.
    ///
    /// The store stamps this once at insert time, so the coalescing path is
    /// only reachable for records written by older or foreign peers.
    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date.unwrap_or_else(Utc::now)
    }

    /// The last modification date, coalesced to "now" when absent.
    pub fn modification_date(&self) -> DateTime<Utc> {
        self.modification_date.unwrap_or_else(Utc::now)
    }

    /// IDs of the tags related to this issue.
    pub fn tag_ids(&self) -> &BTreeSet<TagId> {
        &self.tags
    }

    /// Whether this issue carries the given tag.
    pub fn has_tag(&self, tag_id: &TagId) -> bool {
        self.tags.contains(tag_id)
    }

    /// Human-readable status derived from `completed`.
    pub fn status_label(&self) -> &'static str {
        if self.completed { "Closed" } else { "Open" }
    }
}

impl Eq for Issue {}

/// Natural issue ordering: case-insensitive title ascending, ties broken by
/// creation date ascending, then by ID so the order is total even for
/// records with identical titles and timestamps.
impl Ord for Issue {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.title().to_lowercase();
        let right = other.title().to_lowercase();

        left.cmp(&right)
            .then_with(|| self.creation_date().cmp(&other.creation_date()))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Issue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A named label, related many-to-many with [`Issue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Unique identifier for the tag
    pub id: TagId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,

    #[serde(default)]
    pub(crate) issues: BTreeSet<IssueId>,
}

impl Tag {
    /// The tag name, coalesced to the empty string when absent.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// IDs of the issues related to this tag.
    pub fn issue_ids(&self) -> &BTreeSet<IssueId> {
        &self.issues
    }
}

impl Eq for Tag {}

/// Natural tag ordering: case-insensitive name ascending, ties broken by ID
/// string so two same-named tags still order deterministically.
impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.name().to_lowercase();
        let right = other.name().to_lowercase();

        left.cmp(&right)
            .then_with(|| self.id.as_str().cmp(other.id.as_str()))
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Data for creating a new issue.
#[derive(Debug, Clone)]
pub struct NewIssue {
    /// Issue title (None is stored as-is and read back as "")
    pub title: Option<String>,

    /// Issue content
    pub content: Option<String>,

    /// Whether the issue starts out closed
    pub completed: bool,

    /// Priority level (0-2)
    pub priority: u8,

    /// Tags to attach at creation time
    pub tags: Vec<TagId>,
}

impl Default for NewIssue {
    fn default() -> Self {
        Self {
            title: None,
            content: None,
            completed: false,
            priority: DEFAULT_PRIORITY,
            tags: Vec::new(),
        }
    }
}

impl NewIssue {
    /// Convenience constructor for an issue with just a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// Data for creating a new tag.
#[derive(Debug, Clone, Default)]
pub struct NewTag {
    /// Tag name (None is stored as-is and read back as "")
    pub name: Option<String>,
}

impl NewTag {
    /// Convenience constructor for a named tag.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// Data for updating an existing issue.
///
/// Only fields present are modified; the store restamps the modification
/// date on every applied update.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    /// New title (if updating)
    pub title: Option<String>,

    /// New content (if updating)
    pub content: Option<String>,

    /// New completion state (if updating)
    pub completed: Option<bool>,

    /// New priority (if updating)
    pub priority: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn issue(id: &str, title: Option<&str>, created_secs: i64) -> Issue {
        Issue {
            id: IssueId::new(id),
            title: title.map(str::to_string),
            content: None,
            creation_date: Some(Utc.timestamp_opt(created_secs, 0).unwrap()),
            modification_date: Some(Utc.timestamp_opt(created_secs, 0).unwrap()),
            completed: false,
            priority: DEFAULT_PRIORITY,
            tags: BTreeSet::new(),
        }
    }

    fn tag(id: &str, name: Option<&str>) -> Tag {
        Tag {
            id: TagId::new(id),
            name: name.map(str::to_string),
            issues: BTreeSet::new(),
        }
    }

    #[test]
    fn test_accessors_coalesce_missing_values() {
        let issue = Issue {
            id: IssueId::new("issue-1"),
            title: None,
            content: None,
            creation_date: None,
            modification_date: None,
            completed: false,
            priority: DEFAULT_PRIORITY,
            tags: BTreeSet::new(),
        };

        assert_eq!(issue.title(), "");
        assert_eq!(issue.content(), "");
        // Coalesced dates land at "now", i.e. after any real timestamp.
        assert!(issue.creation_date() > Utc.timestamp_opt(0, 0).unwrap());
        assert!(issue.modification_date() > Utc.timestamp_opt(0, 0).unwrap());

        assert_eq!(tag("tag-1", None).name(), "");
    }

    #[test]
    fn test_issue_ordering_is_case_insensitive() {
        let a = issue("issue-1", Some("apple"), 100);
        let b = issue("issue-2", Some("Banana"), 50);

        assert!(a < b);
    }

    #[test]
    fn test_issue_ordering_ties_break_on_creation_date() {
        let older = issue("issue-1", Some("Same"), 100);
        let newer = issue("issue-2", Some("same"), 200);

        assert!(older < newer);
    }

    #[test]
    fn test_tag_ordering_ties_break_on_id() {
        let a = tag("tag-aaaa", Some("Work"));
        let b = tag("tag-bbbb", Some("work"));

        assert!(a < b);
        assert!(tag("tag-x", Some("Errands")) < a);
    }

    #[test]
    fn test_status_label() {
        let mut i = issue("issue-1", Some("x"), 0);
        assert_eq!(i.status_label(), "Open");
        i.completed = true;
        assert_eq!(i.status_label(), "Closed");
    }

    prop_compose! {
        fn arb_issue()(
            id in "[a-z0-9]{6}",
            title in proptest::option::of("[ A-Za-z]{0,8}"),
            created in 0i64..1_000_000,
        ) -> Issue {
            issue(&format!("issue-{}", id), title.as_deref(), created)
        }
    }

    prop_compose! {
        fn arb_tag()(
            id in "[a-z0-9]{6}",
            name in proptest::option::of("[ A-Za-z]{0,8}"),
        ) -> Tag {
            tag(&format!("tag-{}", id), name.as_deref())
        }
    }

    proptest! {
        #[test]
        fn issue_ordering_is_antisymmetric(a in arb_issue(), b in arb_issue()) {
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        }

        #[test]
        fn issue_ordering_is_transitive(a in arb_issue(), b in arb_issue(), c in arb_issue()) {
            if a <= b && b <= c {
                prop_assert!(a <= c);
            }
        }

        #[test]
        fn tag_ordering_is_antisymmetric(a in arb_tag(), b in arb_tag()) {
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        }

        #[test]
        fn tag_ordering_is_transitive(a in arb_tag(), b in arb_tag(), c in arb_tag()) {
            if a <= b && b <= c {
                prop_assert!(a <= c);
            }
        }
    }
}
