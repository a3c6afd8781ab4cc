use crate::question::{QuestionDraft, QuestionId};

use thiserror::Error;

/// Result type alias for qagallery-core
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the question gallery
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error for file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Parse/serialization errors
    #[error("parse error: {0}")]
    Parse(String),

    /// Validation errors (drafts, patches, user input)
    #[error("validation error: {0}")]
    Validation(String),

    /// A single read of the question list failed
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A create/update/delete was rejected by the backing store
    #[error("write failed: {0}")]
    Write(#[from] WriteFailure),

    /// Moving local cache drafts into the store stopped early
    #[error("migration failed: {0}")]
    Migration(Box<MigrationFailure>),
}

impl Error {
    /// Create a fetch error with a message
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a write error for the given operation
    pub fn write(op: WriteOp, id: Option<QuestionId>, cause: impl Into<String>) -> Self {
        Self::Write(WriteFailure { op, id, cause: cause.into() })
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True when the error came from a rejected write
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Self::Write(_))
    }

    /// The migration failure carried by this error, if any
    pub fn as_migration_failure(&self) -> Option<&MigrationFailure> {
        match self {
            Self::Migration(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<MigrationFailure> for Error {
    fn from(failure: MigrationFailure) -> Self {
        Self::Migration(Box::new(failure))
    }
}

/// Write operations against a question store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

impl WriteOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOp::Create => "create",
            WriteOp::Update => "update",
            WriteOp::Delete => "delete",
        }
    }
}

impl std::fmt::Display for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A rejected create/update/delete, with the underlying cause
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot {op} {}: {cause}", target_label(.id))]
pub struct WriteFailure {
    pub op: WriteOp,
    pub id: Option<QuestionId>,
    pub cause: String,
}

fn target_label(id: &Option<QuestionId>) -> String {
    match id {
        Some(id) => format!("question {id}"),
        None => "question".to_string(),
    }
}

/// The list could not be loaded after every retry was spent
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("could not load questions after {attempts} attempt(s): {message}")]
pub struct FetchFailure {
    pub attempts: u32,
    pub message: String,
}

/// Migration stopped before every cached draft reached the store
///
/// `pending` starts with the draft whose insert failed (or that failed
/// validation) and keeps cache order, so a later session can pick up there.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("stopped after migrating {migrated} question(s), {} still pending: {cause}", .pending.len())]
pub struct MigrationFailure {
    pub migrated: usize,
    pub pending: Vec<QuestionDraft>,
    pub cause: String,
}
