//! Filter values describing one view of the record set.
//!
//! A [`Filter`] is a pure value, never persisted: either one of the two
//! smart filters ([`Filter::all`], [`Filter::recent`]) or a view derived
//! from a single tag ([`Filter::for_tag`]). Equality and hashing go by
//! identifier only, so a tag-derived filter stays "the same filter" across
//! tag renames.

use crate::domain::{Tag, TagId};
use chrono::{DateTime, Duration, Utc};
use std::hash::{Hash, Hasher};

/// Number of days the "Recent" smart filter looks back.
pub const RECENT_WINDOW_DAYS: i64 = 7;

/// A named, reusable view specification over the issue set.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Stable identifier; the sole input to equality and hashing.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Icon token for presentation layers.
    pub icon: String,

    /// Lower bound (exclusive) on the modification date of matching issues.
    ///
    /// Defaults to the distant past, meaning "no time bound".
    pub min_modification_date: DateTime<Utc>,

    /// Tag this filter is derived from, if any.
    pub tag: Option<TagId>,
}

impl Filter {
    /// The "All Issues" smart filter: no tag, no time bound.
    pub fn all() -> Self {
        Self {
            id: "all".to_string(),
            name: "All Issues".to_string(),
            icon: "tray".to_string(),
            min_modification_date: DateTime::<Utc>::MIN_UTC,
            tag: None,
        }
    }

    /// The "Recent Issues" smart filter: issues modified in the last
    /// [`RECENT_WINDOW_DAYS`] days.
    pub fn recent() -> Self {
        Self {
            id: "recent".to_string(),
            name: "Recent Issues".to_string(),
            icon: "clock".to_string(),
            min_modification_date: Utc::now() - Duration::days(RECENT_WINDOW_DAYS),
            tag: None,
        }
    }

    /// A filter showing exactly the issues related to `tag`.
    pub fn for_tag(tag: &Tag) -> Self {
        Self {
            id: tag.id.as_str().to_string(),
            name: tag.name().to_string(),
            icon: "tag".to_string(),
            min_modification_date: DateTime::<Utc>::MIN_UTC,
            tag: Some(tag.id.clone()),
        }
    }
}

/// Two filters are equal iff their identifiers match.
impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Filter {}

impl Hash for Filter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn work_tag() -> Tag {
        Tag {
            id: TagId::new("tag-work"),
            name: Some("Work".to_string()),
            issues: BTreeSet::new(),
        }
    }

    #[test]
    fn test_equality_goes_by_id_only() {
        let mut renamed = Filter::for_tag(&work_tag());
        renamed.name = "Renamed".to_string();
        renamed.icon = "star".to_string();

        assert_eq!(Filter::for_tag(&work_tag()), renamed);
        assert_ne!(Filter::all(), Filter::recent());
    }

    #[test]
    fn test_all_has_no_time_bound() {
        let all = Filter::all();
        assert!(all.tag.is_none());
        assert_eq!(all.min_modification_date, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_recent_looks_back_seven_days() {
        let recent = Filter::recent();
        let age = Utc::now() - recent.min_modification_date;

        assert!(recent.tag.is_none());
        assert!(age >= Duration::days(RECENT_WINDOW_DAYS));
        assert!(age < Duration::days(RECENT_WINDOW_DAYS) + Duration::minutes(1));
    }

    #[test]
    fn test_tag_filter_carries_the_tag() {
        let filter = Filter::for_tag(&work_tag());
        assert_eq!(filter.tag, Some(TagId::new("tag-work")));
        assert_eq!(filter.name, "Work");
    }
}
