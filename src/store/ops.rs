//! Store mutations: upserts, deletes, renames, and the persisted
//! watch-root and ignore-pattern tables.
//!
//! Every mutation runs in a single transaction covering the base row, the
//! FTS document (via the schema triggers), and the bigram postings, so the
//! index never exposes a partially-applied write.

use std::path::{Path, MAIN_SEPARATOR};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};

use crate::fold::{bigrams, escape_like, fold};
use crate::Result;

use super::{FileKind, FileRecord, RootStatus, Store, WatchRoot};

const UPSERT_ENTRY_SQL: &str = r#"
    INSERT INTO file_entries (path, name, parent_path, kind, size, mtime, name_fold, path_fold)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(path) DO UPDATE SET
        name        = excluded.name,
        parent_path = excluded.parent_path,
        kind        = excluded.kind,
        size        = excluded.size,
        mtime       = excluded.mtime,
        name_fold   = excluded.name_fold,
        path_fold   = excluded.path_fold
    RETURNING id
"#;

/// LIKE pattern matching strict descendants of `prefix`.
fn subtree_like(prefix: &str) -> String {
    format!("{}{}%", escape_like(prefix), MAIN_SEPARATOR)
}

/// Current time as fractional seconds since epoch.
pub(crate) fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Replace the bigram postings for one entry: delete whatever exists, then
/// emit one `(id, bigram, pos)` row per window when the folded name has at
/// least 2 characters.
fn rewrite_bigrams(conn: &Connection, id: i64, name_fold: &str) -> Result<()> {
    conn.prepare_cached("DELETE FROM name_bigrams WHERE file_id = ?1")?
        .execute(params![id])?;

    let mut insert =
        conn.prepare_cached("INSERT INTO name_bigrams (file_id, bigram, pos) VALUES (?1, ?2, ?3)")?;
    for (pos, gram) in bigrams(name_fold) {
        insert.execute(params![id, gram, pos as i64])?;
    }
    Ok(())
}

impl Store {
    /// Insert or update a batch of entries in one transaction.
    ///
    /// A record whose `path` already exists updates the row in place,
    /// which also resolves the scanner/watcher race on a freshly created
    /// file. Returns the number of records written.
    pub fn upsert_many(&self, records: &[FileRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        self.with_writer(|conn| {
            let tx = conn.transaction()?;
            {
                let mut upsert = tx.prepare_cached(UPSERT_ENTRY_SQL)?;
                for rec in records {
                    let name_fold = fold(&rec.name);
                    let path_fold = fold(&rec.path);
                    let id: i64 = upsert.query_row(
                        params![
                            rec.path,
                            rec.name,
                            rec.parent_path,
                            rec.kind.as_str(),
                            rec.size,
                            rec.mtime,
                            name_fold,
                            path_fold,
                        ],
                        |row| row.get(0),
                    )?;
                    rewrite_bigrams(&tx, id, &name_fold)?;
                }
            }
            tx.commit()?;
            Ok(records.len())
        })
    }

    /// Remove a single entry. Returns false when the path wasn't indexed.
    pub fn delete_path(&self, path: &str) -> Result<bool> {
        self.with_writer(|conn| {
            let tx = conn.transaction()?;
            let id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM file_entries WHERE path = ?1",
                    params![path],
                    |row| row.get(0),
                )
                .optional()?;

            let deleted = match id {
                Some(id) => {
                    tx.execute("DELETE FROM name_bigrams WHERE file_id = ?1", params![id])?;
                    tx.execute("DELETE FROM file_entries WHERE id = ?1", params![id])?;
                    true
                }
                None => false,
            };
            tx.commit()?;
            Ok(deleted)
        })
    }

    /// Remove `prefix` itself and every entry below it. Separator-aware:
    /// `/a` removes `/a` and `/a/...` but never `/ab`. Returns the number
    /// of entries removed.
    pub fn delete_subtree(&self, prefix: &str) -> Result<usize> {
        let like = subtree_like(prefix);
        self.with_writer(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                r#"DELETE FROM name_bigrams WHERE file_id IN
                   (SELECT id FROM file_entries WHERE path = ?1 OR path LIKE ?2 ESCAPE '\')"#,
                params![prefix, like],
            )?;
            let removed = tx.execute(
                r#"DELETE FROM file_entries WHERE path = ?1 OR path LIKE ?2 ESCAPE '\'"#,
                params![prefix, like],
            )?;
            tx.commit()?;
            Ok(removed)
        })
    }

    /// Atomically move an entry from `old_path` to `new_path`, updating
    /// name, parent linkage, folded forms, postings, and every descendant
    /// whose path starts with the old prefix. Returns false when
    /// `old_path` wasn't indexed.
    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<bool> {
        let new_name = leaf_name(new_path);
        let new_parent = parent_of(new_path);
        let new_name_fold = fold(&new_name);
        let new_path_fold = fold(new_path);
        let like = subtree_like(old_path);

        self.with_writer(|conn| {
            let tx = conn.transaction()?;
            let id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM file_entries WHERE path = ?1",
                    params![old_path],
                    |row| row.get(0),
                )
                .optional()?;
            let id = match id {
                Some(id) => id,
                None => return Ok(false),
            };

            // An overwriting rename replaces whatever sat at the destination
            let displaced: Option<i64> = tx
                .query_row(
                    "SELECT id FROM file_entries WHERE path = ?1",
                    params![new_path],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(displaced) = displaced {
                tx.execute("DELETE FROM name_bigrams WHERE file_id = ?1", params![displaced])?;
                tx.execute("DELETE FROM file_entries WHERE id = ?1", params![displaced])?;
            }

            tx.execute(
                "UPDATE file_entries SET path = ?1, name = ?2, parent_path = ?3,
                 name_fold = ?4, path_fold = ?5 WHERE id = ?6",
                params![new_path, new_name, new_parent, new_name_fold, new_path_fold, id],
            )?;
            rewrite_bigrams(&tx, id, &new_name_fold)?;

            // Cascade: re-path descendants. Names are unchanged, so their
            // bigram postings stay valid; the update trigger rewrites FTS.
            let descendants: Vec<(i64, String)> = {
                let mut stmt = tx.prepare(
                    r#"SELECT id, path FROM file_entries WHERE path LIKE ?1 ESCAPE '\'"#,
                )?;
                let rows = stmt.query_map(params![like], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })?;
                rows.collect::<std::result::Result<_, _>>()?
            };

            let mut update = tx.prepare_cached(
                "UPDATE file_entries SET path = ?1, parent_path = ?2, path_fold = ?3 WHERE id = ?4",
            )?;
            for (desc_id, desc_path) in descendants {
                let suffix = &desc_path[old_path.len()..];
                let moved = format!("{new_path}{suffix}");
                let parent = parent_of(&moved);
                let moved_fold = fold(&moved);
                update.execute(params![moved, parent, moved_fold, desc_id])?;
            }
            drop(update);

            tx.commit()?;
            Ok(true)
        })
    }

    /// Total number of indexed entries.
    pub fn count(&self) -> Result<u64> {
        self.with_reader(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM file_entries", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }

    /// Kind of an indexed entry, or `None` when the path isn't indexed.
    pub fn entry_kind(&self, path: &str) -> Result<Option<FileKind>> {
        self.with_reader(|conn| {
            let kind: Option<String> = conn
                .query_row(
                    "SELECT kind FROM file_entries WHERE path = ?1",
                    params![path],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(kind.map(|k| FileKind::from_db(&k)))
        })
    }

    /// Drop every entry under a root and reset its progress counters.
    pub fn clear_root(&self, root: &str) -> Result<usize> {
        let removed = self.delete_subtree(root)?;
        self.with_writer(|conn| {
            conn.execute(
                "UPDATE watch_roots SET total_files = 0, indexed_files = 0, last_updated = ?1
                 WHERE path = ?2",
                params![now_epoch(), root],
            )?;
            Ok(())
        })?;
        Ok(removed)
    }

    // ---- watch root persistence ----

    /// Insert a root row (or revive an existing one) with the given status.
    pub fn insert_root(&self, path: &str, status: RootStatus) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO watch_roots (path, status, last_updated) VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET
                     status = excluded.status,
                     enabled = 1,
                     last_updated = excluded.last_updated,
                     error_message = NULL",
                params![path, status.as_str(), now_epoch()],
            )?;
            Ok(())
        })
    }

    /// Drop a root row entirely.
    pub fn remove_root_row(&self, path: &str) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute("DELETE FROM watch_roots WHERE path = ?1", params![path])?;
            Ok(())
        })
    }

    /// All persisted roots, ordered by path.
    pub fn list_roots(&self) -> Result<Vec<WatchRoot>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, path, enabled, status, total_files, indexed_files,
                        last_full_scan, last_updated, error_message
                 FROM watch_roots ORDER BY path",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(WatchRoot {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    enabled: row.get::<_, i64>(2)? != 0,
                    status: RootStatus::from_db(&row.get::<_, String>(3)?),
                    total_files: row.get(4)?,
                    indexed_files: row.get(5)?,
                    last_full_scan: row.get(6)?,
                    last_updated: row.get(7)?,
                    error_message: row.get(8)?,
                })
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }

    pub fn get_root(&self, path: &str) -> Result<Option<WatchRoot>> {
        Ok(self.list_roots()?.into_iter().find(|r| r.path == path))
    }

    /// Set a root's status, clearing any recorded error.
    pub fn set_root_status(&self, path: &str, status: RootStatus) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "UPDATE watch_roots SET status = ?1, last_updated = ?2, error_message = NULL
                 WHERE path = ?3",
                params![status.as_str(), now_epoch(), path],
            )?;
            Ok(())
        })
    }

    /// Transition a root to `error` and record the reason.
    pub fn set_root_error(&self, path: &str, message: &str) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "UPDATE watch_roots SET status = 'error', error_message = ?1, last_updated = ?2
                 WHERE path = ?3",
                params![message, now_epoch(), path],
            )?;
            Ok(())
        })
    }

    /// Record a completed full scan: counters, watching status, timestamps.
    pub fn mark_scan_complete(&self, path: &str, total: u64, indexed: u64) -> Result<()> {
        self.with_writer(|conn| {
            let now = now_epoch();
            conn.execute(
                "UPDATE watch_roots SET total_files = ?1, indexed_files = ?2,
                        status = 'watching', last_full_scan = ?3, last_updated = ?3,
                        error_message = NULL
                 WHERE path = ?4",
                params![total as i64, indexed as i64, now, path],
            )?;
            Ok(())
        })
    }

    // ---- ignore pattern persistence ----

    pub fn add_ignore(&self, pattern: &str) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO ignore_patterns (pattern) VALUES (?1)",
                params![pattern],
            )?;
            Ok(())
        })
    }

    /// Remove a pattern; returns false when it wasn't present.
    pub fn remove_ignore(&self, pattern: &str) -> Result<bool> {
        self.with_writer(|conn| {
            let changed = conn.execute(
                "DELETE FROM ignore_patterns WHERE pattern = ?1",
                params![pattern],
            )?;
            Ok(changed > 0)
        })
    }

    /// Patterns in insertion order.
    pub fn list_ignores(&self) -> Result<Vec<String>> {
        self.with_reader(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT pattern FROM ignore_patterns ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }
}

/// Leaf component of a path string.
pub(crate) fn leaf_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Containing directory of a path string, `None` at a filesystem root.
pub(crate) fn parent_of(path: &str) -> Option<String> {
    Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_string_lossy().into_owned())
}
