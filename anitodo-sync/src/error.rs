//! Error types for the aggregation pipeline and state synchronizer

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Result type for synchronizer and pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// One source's fetch failed
///
/// Never escapes the fan-out as an error; it is recorded per source and
/// reported as part of a partial-failure summary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("source '{source_name}' failed: {cause}")]
pub struct SourceFailure {
    pub source_name: String,
    pub cause: String,
}

impl SourceFailure {
    pub fn new(source_name: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            cause: cause.into(),
        }
    }
}

/// Which store write failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Watch,
    Collect,
    Uncollect,
    Save,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MutationKind::Watch => "watch",
            MutationKind::Collect => "collect",
            MutationKind::Uncollect => "uncollect",
            MutationKind::Save => "save",
        };
        f.write_str(s)
    }
}

/// Caller-visible failures
#[derive(Debug, Error)]
pub enum Error {
    /// Every configured source failed; nothing to merge or persist
    #[error("all {} sources failed: {}", .errors.len(), summarize(.errors))]
    AllSourcesFailed {
        errors: BTreeMap<String, SourceFailure>,
    },

    /// A store write failed and the optimistic change was rolled back
    #[error("{kind} failed for {key}: {cause}")]
    Mutation {
        kind: MutationKind,
        /// Entity key: ani id for watch, title for collect/uncollect
        key: String,
        cause: String,
    },

    /// A store read failed; local state was left untouched
    #[error("query {query} failed: {cause}")]
    Query { query: &'static str, cause: String },
}

impl Error {
    /// True for failures the user can simply retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Mutation { .. } | Error::Query { .. })
    }
}

fn summarize(errors: &BTreeMap<String, SourceFailure>) -> String {
    errors
        .values()
        .map(|e| format!("{} ({})", e.source_name, e.cause))
        .collect::<Vec<_>>()
        .join(", ")
}
