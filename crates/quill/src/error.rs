//! Error types for quill operations.

use crate::domain::{IssueId, TagId};
use std::io;
use thiserror::Error;

/// The error type for quill operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record store error.
    #[error("Store error: {0}")]
    Store(String),

    /// Award catalog could not be loaded or decoded.
    #[error("Award catalog error: {0}")]
    Catalog(String),

    /// Issue not found.
    #[error("Issue not found: {0}")]
    IssueNotFound(IssueId),

    /// Tag not found.
    #[error("Tag not found: {0}")]
    TagNotFound(TagId),

    /// Priority outside the allowed 0-2 range.
    #[error("Invalid priority: {0} (must be 0-2)")]
    InvalidPriority(u8),
}

/// A specialized Result type for quill operations.
pub type Result<T> = std::result::Result<T, Error>;
