//! Persistent index store - SQLite with WAL mode for crash-safe persistence.
//!
//! The [`Store`] is the single source of truth: all scanner and watcher
//! mutations go through its transactional API, and searches read directly
//! from it. Writes are serialized through one connection behind a mutex;
//! a second connection serves queries, which WAL mode lets run
//! concurrently with commits.

mod ops;
mod schema;
pub mod search;

pub use search::{KindFilter, SearchHit, SearchQuery, SearchResults, SortKey, MAX_LIMIT};

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;
use serde::Serialize;

use crate::{FindexError, Result};

/// Kind of an indexed filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::File => "file",
            FileKind::Directory => "directory",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "directory" => FileKind::Directory,
            _ => FileKind::File,
        }
    }
}

/// One filesystem object as fed to [`Store::upsert_many`].
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Absolute normalized path. Unique across the index.
    pub path: String,
    /// Leaf component of the path.
    pub name: String,
    /// Containing directory; `None` for a root entry.
    pub parent_path: Option<String>,
    pub kind: FileKind,
    /// Bytes; 0 for directories.
    pub size: i64,
    /// Seconds since epoch, fractional.
    pub mtime: f64,
}

/// Lifecycle status of a watch root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RootStatus {
    Idle,
    Scanning,
    Watching,
    Error,
}

impl RootStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RootStatus::Idle => "idle",
            RootStatus::Scanning => "scanning",
            RootStatus::Watching => "watching",
            RootStatus::Error => "error",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "scanning" => RootStatus::Scanning,
            "watching" => RootStatus::Watching,
            "error" => RootStatus::Error,
            _ => RootStatus::Idle,
        }
    }
}

/// A persisted watch root row.
#[derive(Debug, Clone, Serialize)]
pub struct WatchRoot {
    pub id: i64,
    pub path: String,
    pub enabled: bool,
    pub status: RootStatus,
    pub total_files: i64,
    pub indexed_files: i64,
    pub last_full_scan: Option<f64>,
    pub last_updated: Option<f64>,
    pub error_message: Option<String>,
}

/// The persistent index.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the index file at `path`.
    ///
    /// Creates parent directories, applies the WAL/performance pragmas to
    /// both connections, and initializes the schema. A file that is not a
    /// database surfaces as a fatal [`FindexError::Corrupt`].
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = open_connection(path)?;
        schema::init(&writer)?;
        let reader = open_connection(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    /// Path of the index file this store was opened on.
    pub fn db_path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn with_writer<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .writer
            .lock()
            .map_err(|_| FindexError::Store("writer lock poisoned".into()))?;
        f(&mut conn)
    }

    pub(crate) fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .reader
            .lock()
            .map_err(|_| FindexError::Store("reader lock poisoned".into()))?;
        f(&conn)
    }
}

/// Open one connection with the standard pragma set.
fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;

    // WAL persists to the database file and lets readers run during commits
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // NORMAL synchronous is safe in WAL mode, faster than FULL
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    // Store temp tables in memory
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    // Memory-mapped I/O (256MB)
    conn.pragma_update(None, "mmap_size", 268_435_456_i64)?;

    // 64MB page cache (negative value = KB)
    conn.pragma_update(None, "cache_size", -64_000_i32)?;

    // Busy timeout for concurrent access
    conn.pragma_update(None, "busy_timeout", 5000_i32)?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("subdir").join("index.db");

        let store = Store::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.db_path(), db_path);
    }

    #[test]
    fn test_wal_mode_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("index.db")).unwrap();

        store
            .with_reader(|conn| {
                let mode: String = conn
                    .pragma_query_value(None, "journal_mode", |row| row.get(0))
                    .unwrap();
                assert_eq!(mode.to_lowercase(), "wal");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_open_not_a_database_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("index.db");
        std::fs::write(&db_path, "this is not a sqlite file, not even close.....").unwrap();

        match Store::open(&db_path) {
            Err(FindexError::Corrupt(_)) => {}
            other => panic!("expected Corrupt error, got {other:?}"),
        }
    }

    #[test]
    fn test_kind_roundtrip() {
        assert_eq!(FileKind::from_db("file"), FileKind::File);
        assert_eq!(FileKind::from_db("directory"), FileKind::Directory);
        assert_eq!(FileKind::Directory.as_str(), "directory");
    }

    #[test]
    fn test_root_status_roundtrip() {
        for status in [
            RootStatus::Idle,
            RootStatus::Scanning,
            RootStatus::Watching,
            RootStatus::Error,
        ] {
            assert_eq!(RootStatus::from_db(status.as_str()), status);
        }
        assert_eq!(RootStatus::from_db("bogus"), RootStatus::Idle);
    }
}
