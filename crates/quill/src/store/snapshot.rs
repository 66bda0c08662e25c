//! JSONL snapshot persistence for the in-memory store.
//!
//! A snapshot is one JSON object per line, tagged with the record kind, so
//! the whole journal lives in a single mergeable file. Writes go through a
//! temp-file-then-rename so a crash mid-write never corrupts the previous
//! snapshot; on POSIX systems the rename is atomic within one filesystem.
//!
//! Loading is resilient: a malformed line or a relationship edge pointing
//! at a record that never made it into the file is skipped and reported as
//! a [`LoadWarning`], never a hard failure.

use crate::domain::{Issue, IssueId, Tag, TagId};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::fs;

/// One line of a snapshot file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum RecordLine {
    Issue(Issue),
    Tag(Tag),
}

/// Non-fatal problems encountered while loading a snapshot.
///
/// The load continues past each of these; the problematic line or
/// relationship edge is dropped. Callers should log them - they indicate
/// data-quality issues in the snapshot file that may need attention.
#[derive(Debug, Clone)]
pub enum LoadWarning {
    /// A line that couldn't be parsed as any record kind.
    ///
    /// Common causes: file corruption, manual editing, incomplete writes.
    MalformedLine {
        /// 1-based line number in the snapshot file
        line_number: usize,
        /// Parser error text
        error: String,
    },

    /// An issue referenced a tag that isn't in the snapshot; the edge was
    /// dropped from the issue.
    OrphanedTagRef {
        /// Issue carrying the dangling reference
        issue: IssueId,
        /// The missing tag
        tag: TagId,
    },

    /// A tag referenced an issue that isn't in the snapshot; the edge was
    /// dropped from the tag.
    OrphanedIssueRef {
        /// Tag carrying the dangling reference
        tag: TagId,
        /// The missing issue
        issue: IssueId,
    },
}

/// Load a snapshot file, returning both record maps and any warnings.
///
/// After loading, the two relationship sides are reconciled: dangling
/// references are dropped (with warnings) and a reference present on one
/// side only is repaired onto the other, so the returned maps always agree.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be read at all.
pub(crate) async fn load_snapshot(
    path: &Path,
) -> Result<(HashMap<IssueId, Issue>, HashMap<TagId, Tag>, Vec<LoadWarning>)> {
    let content = fs::read_to_string(path).await?;

    let mut issues: HashMap<IssueId, Issue> = HashMap::new();
    let mut tags: HashMap<TagId, Tag> = HashMap::new();
    let mut warnings = Vec::new();

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<RecordLine>(line) {
            Ok(RecordLine::Issue(issue)) => {
                issues.insert(issue.id.clone(), issue);
            }
            Ok(RecordLine::Tag(tag)) => {
                tags.insert(tag.id.clone(), tag);
            }
            Err(error) => warnings.push(LoadWarning::MalformedLine {
                line_number: index + 1,
                error: error.to_string(),
            }),
        }
    }

    // Drop relationship edges that point at records missing from the file.
    let known_tags: HashSet<TagId> = tags.keys().cloned().collect();
    for issue in issues.values_mut() {
        let orphaned: Vec<TagId> = issue
            .tags
            .iter()
            .filter(|tag_id| !known_tags.contains(*tag_id))
            .cloned()
            .collect();
        for tag_id in orphaned {
            issue.tags.remove(&tag_id);
            warnings.push(LoadWarning::OrphanedTagRef {
                issue: issue.id.clone(),
                tag: tag_id,
            });
        }
    }

    let known_issues: HashSet<IssueId> = issues.keys().cloned().collect();
    for tag in tags.values_mut() {
        let orphaned: Vec<IssueId> = tag
            .issues
            .iter()
            .filter(|issue_id| !known_issues.contains(*issue_id))
            .cloned()
            .collect();
        for issue_id in orphaned {
            tag.issues.remove(&issue_id);
            warnings.push(LoadWarning::OrphanedIssueRef {
                tag: tag.id.clone(),
                issue: issue_id,
            });
        }
    }

    // Repair one-sided edges so both directions agree.
    for issue in issues.values() {
        for tag_id in &issue.tags {
            if let Some(tag) = tags.get_mut(tag_id) {
                tag.issues.insert(issue.id.clone());
            }
        }
    }
    for (tag_id, tag) in &tags {
        for issue_id in &tag.issues {
            if let Some(issue) = issues.get_mut(issue_id) {
                issue.tags.insert(tag_id.clone());
            }
        }
    }

    Ok((issues, tags, warnings))
}

/// Atomically write a snapshot of both record maps to `path`.
///
/// Records are written in natural order (tags first) so snapshots of equal
/// state are byte-identical, which keeps them friendly to file-level sync.
pub(crate) async fn write_snapshot(
    issues: &HashMap<IssueId, Issue>,
    tags: &HashMap<TagId, Tag>,
    path: &Path,
) -> Result<()> {
    let mut lines = String::new();

    let mut sorted_tags: Vec<&Tag> = tags.values().collect();
    sorted_tags.sort();
    for tag in sorted_tags {
        let line = serde_json::to_string(&RecordLine::Tag(tag.clone()))
            .map_err(|e| Error::Store(format!("snapshot encoding failed: {}", e)))?;
        lines.push_str(&line);
        lines.push('\n');
    }

    let mut sorted_issues: Vec<&Issue> = issues.values().collect();
    sorted_issues.sort();
    for issue in sorted_issues {
        let line = serde_json::to_string(&RecordLine::Issue(issue.clone()))
            .map_err(|e| Error::Store(format!("snapshot encoding failed: {}", e)))?;
        lines.push_str(&line);
        lines.push('\n');
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, lines).await?;
    fs::rename(&tmp_path, path).await?;

    Ok(())
}
