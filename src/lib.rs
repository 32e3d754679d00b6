//! findex - persistent local filesystem index with instant name search.
//!
//! This library maintains a SQLite-backed index of every file and directory
//! under a set of monitored roots and answers case-insensitive substring
//! queries over names and paths in milliseconds. Substring lookup uses a
//! three-tier plan: a LIKE scan for single-character queries, a bigram
//! posting table for two-character queries, and an FTS5 trigram index for
//! everything longer.
//!
//! The crate is organized around four components:
//! - [`store`] - the persistent index and its query planner
//! - [`scanner`] - parallel bulk traversal that populates the store
//! - [`watcher`] - filesystem-event driven incremental updates
//! - [`coordinator`] - root lifecycle, rebuilds, status, and search routing

pub mod config;
pub mod coordinator;
pub mod fold;
pub mod ignore;
pub mod scanner;
pub mod store;
pub mod watcher;

use thiserror::Error;

pub use coordinator::Coordinator;
pub use store::{FileKind, FileRecord, Store};

/// Error taxonomy for the indexing core.
#[derive(Error, Debug)]
pub enum FindexError {
    /// Database-level failure (statement, transaction, open).
    #[error("store error: {0}")]
    Store(String),

    /// The index file is corrupt or not a database. Fatal: no further
    /// writes are attempted until a rebuild or restart.
    #[error("index corruption: {0}")]
    Corrupt(String),

    /// Bulk scan failure that aborts the scan of a root.
    #[error("scan error: {0}")]
    Scan(String),

    /// Filesystem notification subsystem failure.
    #[error("watch error: {0}")]
    Watch(String),

    /// Rejected at the admin boundary (nested root, missing path,
    /// malformed pattern). No state was mutated.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors from filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for FindexError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, _) = &e {
            if matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase
            ) {
                return FindexError::Corrupt(e.to_string());
            }
        }
        FindexError::Store(e.to_string())
    }
}

impl From<notify::Error> for FindexError {
    fn from(e: notify::Error) -> Self {
        FindexError::Watch(e.to_string())
    }
}

/// Result type alias using FindexError.
pub type Result<T> = std::result::Result<T, FindexError>;
