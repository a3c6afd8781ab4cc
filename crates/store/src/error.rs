//! Error types for the question stores

use qagallery_core::{QuestionId, WriteOp};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the SQLite store and the local cache
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite database error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database corruption or schema mismatch
    #[error("Database error: {0}")]
    Database(String),

    /// The local cache file exists but is not a JSON object of string slots
    #[error("Corrupt local cache at {path}: {reason}")]
    CorruptCache { path: PathBuf, reason: String },

    /// A slot held data that does not decode into question records
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Connection error: {0}")]
    ConnectionError(#[from] tokio_rusqlite::Error),
}

impl Error {
    /// Create a database error with a message
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a corrupt cache error
    pub fn corrupt_cache(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptCache { path: path.into(), reason: reason.into() }
    }

    /// Create an invalid record error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Report this error as a failed list read
    pub fn into_fetch(self) -> qagallery_core::Error {
        qagallery_core::Error::fetch(self.to_string())
    }

    /// Report this error as a rejected write
    pub fn into_write(self, op: WriteOp, id: Option<QuestionId>) -> qagallery_core::Error {
        qagallery_core::Error::write(op, id, self.to_string())
    }
}
