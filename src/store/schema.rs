//! Database schema - table definitions for the index file.
//!
//! One SQLite file holds the whole index: the base entry table, the FTS5
//! trigram index over folded name and path, the bigram posting table, and
//! the persisted watch roots and ignore patterns.
//!
//! The FTS index is external-content, bound to `file_entries` by rowid,
//! and kept coherent by AFTER INSERT/DELETE/UPDATE triggers so an FTS
//! document can never outlive or lag its base row: whatever transaction
//! touches the base table also carries the trigger writes.

use rusqlite::Connection;

use crate::Result;

/// Initialize the database schema.
///
/// Creates all tables, indexes, and triggers if they don't already exist.
/// Called on every database open; safe to run repeatedly.
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS file_entries (
            id          INTEGER PRIMARY KEY,
            path        TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            parent_path TEXT,
            kind        TEXT NOT NULL CHECK (kind IN ('file', 'directory')),
            size        INTEGER NOT NULL DEFAULT 0,
            mtime       REAL NOT NULL DEFAULT 0,
            name_fold   TEXT NOT NULL,
            path_fold   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_entries_parent ON file_entries(parent_path);
        CREATE INDEX IF NOT EXISTS idx_entries_kind   ON file_entries(kind);
        CREATE INDEX IF NOT EXISTS idx_entries_name   ON file_entries(name);

        CREATE VIRTUAL TABLE IF NOT EXISTS entry_fts USING fts5(
            name_fold,
            path_fold,
            content='file_entries',
            content_rowid='id',
            tokenize='trigram'
        );

        CREATE TRIGGER IF NOT EXISTS file_entries_ai AFTER INSERT ON file_entries BEGIN
            INSERT INTO entry_fts(rowid, name_fold, path_fold)
            VALUES (new.id, new.name_fold, new.path_fold);
        END;

        CREATE TRIGGER IF NOT EXISTS file_entries_ad AFTER DELETE ON file_entries BEGIN
            INSERT INTO entry_fts(entry_fts, rowid, name_fold, path_fold)
            VALUES ('delete', old.id, old.name_fold, old.path_fold);
        END;

        CREATE TRIGGER IF NOT EXISTS file_entries_au AFTER UPDATE ON file_entries BEGIN
            INSERT INTO entry_fts(entry_fts, rowid, name_fold, path_fold)
            VALUES ('delete', old.id, old.name_fold, old.path_fold);
            INSERT INTO entry_fts(rowid, name_fold, path_fold)
            VALUES (new.id, new.name_fold, new.path_fold);
        END;

        CREATE TABLE IF NOT EXISTS name_bigrams (
            file_id INTEGER NOT NULL REFERENCES file_entries(id),
            bigram  TEXT NOT NULL,
            pos     INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_bigrams_bigram ON name_bigrams(bigram);
        CREATE INDEX IF NOT EXISTS idx_bigrams_file   ON name_bigrams(file_id);

        CREATE TABLE IF NOT EXISTS watch_roots (
            id             INTEGER PRIMARY KEY,
            path           TEXT NOT NULL UNIQUE,
            enabled        INTEGER NOT NULL DEFAULT 1,
            status         TEXT NOT NULL DEFAULT 'idle',
            total_files    INTEGER NOT NULL DEFAULT 0,
            indexed_files  INTEGER NOT NULL DEFAULT 0,
            last_full_scan REAL,
            last_updated   REAL,
            error_message  TEXT
        );

        CREATE TABLE IF NOT EXISTS ignore_patterns (
            id      INTEGER PRIMARY KEY,
            pattern TEXT NOT NULL UNIQUE
        );
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_schema_init_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();

        for table in [
            "file_entries",
            "entry_fts",
            "name_bigrams",
            "watch_roots",
            "ignore_patterns",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn test_schema_init_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();
    }

    #[test]
    fn test_fts_triggers_mirror_base_writes() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();

        conn.execute(
            "INSERT INTO file_entries (path, name, parent_path, kind, size, mtime, name_fold, path_fold)
             VALUES ('/tmp/Alpha.txt', 'Alpha.txt', '/tmp', 'file', 10, 1.5, 'alpha.txt', '/tmp/alpha.txt')",
            [],
        )
        .unwrap();

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entry_fts WHERE entry_fts MATCH '\"alpha\"'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);

        // Update rewrites the document
        conn.execute(
            "UPDATE file_entries SET name = 'Beta.txt', name_fold = 'beta.txt',
             path = '/tmp/Beta.txt', path_fold = '/tmp/beta.txt' WHERE path = '/tmp/Alpha.txt'",
            [],
        )
        .unwrap();

        let old_hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entry_fts WHERE entry_fts MATCH '\"alpha\"'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(old_hits, 0);

        let new_hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entry_fts WHERE entry_fts MATCH '\"beta\"'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(new_hits, 1);

        // Delete removes the document
        conn.execute("DELETE FROM file_entries WHERE path = '/tmp/Beta.txt'", [])
            .unwrap();
        let after_delete: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entry_fts WHERE entry_fts MATCH '\"beta\"'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(after_delete, 0);
    }

    #[test]
    fn test_kind_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO file_entries (path, name, kind, name_fold, path_fold)
             VALUES ('/x', 'x', 'symlink', 'x', '/x')",
            [],
        );
        assert!(result.is_err());
    }
}
