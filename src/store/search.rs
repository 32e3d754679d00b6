//! Search query planner: three-tier substring lookup over the index.
//!
//! The folded query is split on whitespace and each token independently
//! picks a plan by its character length:
//!
//! | len | plan |
//! |-----|------|
//! | 1   | LIKE scan over the folded path |
//! | 2   | bigram posting lookup |
//! | >=3 | FTS5 trigram MATCH over folded name and path |
//!
//! Tokens are ANDed together, filters and sorting are applied to the
//! candidate set, and results are paginated. The planner never reads the
//! filesystem.

use std::path::MAIN_SEPARATOR;

use rusqlite::types::Value;
use serde::Serialize;

use crate::fold::{escape_like, fold, fts_phrase};
use crate::Result;

use super::{FileKind, Store};

/// Hard cap on requested result counts.
pub const MAX_LIMIT: usize = 10_000;

/// Sort key for search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Path,
    Size,
    DateModified,
}

impl SortKey {
    /// Parse the wire names (`date_modified` is the Everything-compatible
    /// alias for the mtime column).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(SortKey::Name),
            "path" => Some(SortKey::Path),
            "size" => Some(SortKey::Size),
            "date_modified" | "mtime" => Some(SortKey::DateModified),
            _ => None,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Path => "path",
            SortKey::Size => "size",
            SortKey::DateModified => "mtime",
        }
    }
}

/// Kind filter for search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    All,
    File,
    Directory,
}

impl KindFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(KindFilter::All),
            "file" => Some(KindFilter::File),
            "directory" => Some(KindFilter::Directory),
            _ => None,
        }
    }
}

/// A search request against the store.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Raw query string; may contain whitespace-separated tokens.
    pub query: String,
    /// Restrict results to this path prefix.
    pub root_prefix: Option<String>,
    pub kind: KindFilter,
    pub sort: SortKey,
    pub ascending: bool,
    pub offset: usize,
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            root_prefix: None,
            kind: KindFilter::All,
            sort: SortKey::Name,
            ascending: true,
            offset: 0,
            limit: 100,
        }
    }
}

/// One search result row.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub size: i64,
    #[serde(rename = "date_modified")]
    pub mtime: f64,
}

/// A page of results plus the full match count.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    /// Count of all matches, not just this page.
    #[serde(rename = "totalResults")]
    pub total: u64,
    #[serde(rename = "results")]
    pub hits: Vec<SearchHit>,
}

/// WHERE conditions and their bound values for one query.
struct Plan {
    conditions: Vec<String>,
    values: Vec<Value>,
}

fn build_plan(q: &SearchQuery) -> Plan {
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    // Implicit AND across whitespace-separated tokens; each token picks
    // its tier by folded character length.
    for token in fold(&q.query).split_whitespace() {
        match token.chars().count() {
            1 => {
                conditions.push(r"path_fold LIKE ? ESCAPE '\'".to_string());
                values.push(Value::Text(format!("%{}%", escape_like(token))));
            }
            2 => {
                conditions.push(
                    "id IN (SELECT file_id FROM name_bigrams WHERE bigram = ?)".to_string(),
                );
                values.push(Value::Text(token.to_string()));
            }
            _ => {
                conditions.push(
                    "id IN (SELECT rowid FROM entry_fts WHERE entry_fts MATCH ?)".to_string(),
                );
                values.push(Value::Text(fts_phrase(token)));
            }
        }
    }

    if let Some(prefix) = &q.root_prefix {
        conditions.push(r"(path = ? OR path LIKE ? ESCAPE '\')".to_string());
        values.push(Value::Text(prefix.clone()));
        values.push(Value::Text(format!(
            "{}{}%",
            escape_like(prefix),
            MAIN_SEPARATOR
        )));
    }

    match q.kind {
        KindFilter::All => {}
        KindFilter::File => {
            conditions.push("kind = 'file'".to_string());
        }
        KindFilter::Directory => {
            conditions.push("kind = 'directory'".to_string());
        }
    }

    Plan { conditions, values }
}

fn where_clause(plan: &Plan) -> String {
    if plan.conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", plan.conditions.join(" AND "))
    }
}

impl Store {
    /// Run a search against the index.
    pub fn search(&self, q: &SearchQuery) -> Result<SearchResults> {
        let plan = build_plan(q);
        let where_sql = where_clause(&plan);
        let limit = q.limit.min(MAX_LIMIT);

        self.with_reader(|conn| {
            let count_sql = format!("SELECT COUNT(*) FROM file_entries{where_sql}");
            let total: i64 = conn.query_row(
                &count_sql,
                rusqlite::params_from_iter(plan.values.iter()),
                |row| row.get(0),
            )?;

            let direction = if q.ascending { "ASC" } else { "DESC" };
            let page_sql = format!(
                "SELECT name, path, kind, size, mtime FROM file_entries{where_sql}
                 ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
                q.sort.column(),
                direction,
            );

            let mut page_values = plan.values.clone();
            page_values.push(Value::Integer(limit as i64));
            page_values.push(Value::Integer(q.offset as i64));

            let mut stmt = conn.prepare_cached(&page_sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(page_values.iter()), |row| {
                Ok(SearchHit {
                    name: row.get(0)?,
                    path: row.get(1)?,
                    kind: FileKind::from_db(&row.get::<_, String>(2)?),
                    size: row.get(3)?,
                    mtime: row.get(4)?,
                })
            })?;
            let hits = rows.collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(SearchResults {
                total: total as u64,
                hits,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ops::{leaf_name, parent_of};
    use crate::store::FileRecord;

    fn seeded_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("index.db")).unwrap();

        let entries = [
            ("/data", FileKind::Directory, 0, 10.0),
            ("/data/alpha.txt", FileKind::File, 100, 20.0),
            ("/data/Beta.md", FileKind::File, 200, 30.0),
            ("/data/gamma", FileKind::Directory, 0, 40.0),
            ("/data/gamma/notes.txt", FileKind::File, 50, 50.0),
            ("/data/申告書.pdf", FileKind::File, 300, 60.0),
            ("/other", FileKind::Directory, 0, 70.0),
            ("/other/alphabet.rs", FileKind::File, 400, 80.0),
        ];
        let records: Vec<FileRecord> = entries
            .iter()
            .map(|(path, kind, size, mtime)| FileRecord {
                path: path.to_string(),
                name: leaf_name(path),
                parent_path: parent_of(path),
                kind: *kind,
                size: *size,
                mtime: *mtime,
            })
            .collect();
        store.upsert_many(&records).unwrap();
        (dir, store)
    }

    fn query(q: &str) -> SearchQuery {
        SearchQuery {
            query: q.to_string(),
            ..SearchQuery::default()
        }
    }

    fn paths(results: &SearchResults) -> Vec<&str> {
        results.hits.iter().map(|h| h.path.as_str()).collect()
    }

    #[test]
    fn test_empty_query_returns_everything() {
        let (_dir, store) = seeded_store();
        let results = store.search(&SearchQuery::default()).unwrap();
        assert_eq!(results.total, 8);
        assert_eq!(results.hits.len(), 8);
    }

    #[test]
    fn test_single_char_like_tier() {
        let (_dir, store) = seeded_store();
        // "q" appears nowhere
        assert_eq!(store.search(&query("q")).unwrap().total, 0);
        // "g" matches gamma and its child (path substring)
        let results = store.search(&query("g")).unwrap();
        assert_eq!(
            paths(&results),
            vec!["/data/gamma", "/data/gamma/notes.txt"]
        );
    }

    #[test]
    fn test_two_char_bigram_tier() {
        let (_dir, store) = seeded_store();
        let results = store.search(&query("al")).unwrap();
        assert_eq!(
            paths(&results),
            vec!["/data/alpha.txt", "/other/alphabet.rs"]
        );
    }

    #[test]
    fn test_three_char_fts_tier() {
        let (_dir, store) = seeded_store();
        let results = store.search(&query("alpha")).unwrap();
        assert_eq!(
            paths(&results),
            vec!["/data/alpha.txt", "/other/alphabet.rs"]
        );
    }

    #[test]
    fn test_fts_matches_path_component() {
        let (_dir, store) = seeded_store();
        // "gamma" is a directory name; its child matches via path_fold
        let results = store.search(&query("gamma")).unwrap();
        assert_eq!(
            paths(&results),
            vec!["/data/gamma", "/data/gamma/notes.txt"]
        );
    }

    #[test]
    fn test_case_insensitive_matching() {
        let (_dir, store) = seeded_store();
        let results = store.search(&query("BETA")).unwrap();
        assert_eq!(paths(&results), vec!["/data/Beta.md"]);
        let results = store.search(&query("bEtA")).unwrap();
        assert_eq!(paths(&results), vec!["/data/Beta.md"]);
    }

    #[test]
    fn test_unicode_three_tiers_find_same_entry() {
        let (_dir, store) = seeded_store();
        for q in ["申", "申告", "申告書"] {
            let results = store.search(&query(q)).unwrap();
            assert_eq!(paths(&results), vec!["/data/申告書.pdf"], "query {q:?}");
        }
    }

    #[test]
    fn test_multi_token_and_semantics() {
        let (_dir, store) = seeded_store();
        // Both tokens must match; "alpha" alone matches two entries,
        // "txt" narrows to one.
        let results = store.search(&query("alpha txt")).unwrap();
        assert_eq!(paths(&results), vec!["/data/alpha.txt"]);

        // Mixed tier lengths: both 2-char tokens must hit the same name
        let results = store.search(&query("al md")).unwrap();
        assert_eq!(paths(&results), vec![] as Vec<&str>);
        let results = store.search(&query("al tx")).unwrap();
        assert_eq!(paths(&results), vec!["/data/alpha.txt"]);
        // 2-char + >=3-char
        let results = store.search(&query("al alphabet")).unwrap();
        assert_eq!(paths(&results), vec!["/other/alphabet.rs"]);
    }

    #[test]
    fn test_kind_filter() {
        let (_dir, store) = seeded_store();
        let mut q = query("");
        q.kind = KindFilter::Directory;
        let results = store.search(&q).unwrap();
        assert_eq!(results.total, 3);
        assert!(results.hits.iter().all(|h| h.kind == FileKind::Directory));
    }

    #[test]
    fn test_root_prefix_filter() {
        let (_dir, store) = seeded_store();
        let mut q = query("");
        q.root_prefix = Some("/data/gamma".to_string());
        let results = store.search(&q).unwrap();
        assert_eq!(
            paths(&results),
            vec!["/data/gamma", "/data/gamma/notes.txt"]
        );
    }

    #[test]
    fn test_sort_and_direction() {
        let (_dir, store) = seeded_store();
        let mut q = query("");
        q.kind = KindFilter::File;
        q.sort = SortKey::Size;
        q.ascending = false;
        let results = store.search(&q).unwrap();
        let sizes: Vec<i64> = results.hits.iter().map(|h| h.size).collect();
        assert_eq!(sizes, vec![400, 300, 200, 100, 50]);
    }

    #[test]
    fn test_pagination_and_total() {
        let (_dir, store) = seeded_store();
        let mut q = query("");
        q.limit = 3;
        let page1 = store.search(&q).unwrap();
        assert_eq!(page1.total, 8);
        assert_eq!(page1.hits.len(), 3);

        q.offset = 6;
        let page3 = store.search(&q).unwrap();
        assert_eq!(page3.total, 8);
        assert_eq!(page3.hits.len(), 2);
    }

    #[test]
    fn test_like_wildcards_are_literal() {
        let (_dir, store) = seeded_store();
        // "%" as a query must not act as a LIKE wildcard
        assert_eq!(store.search(&query("%")).unwrap().total, 0);
        assert_eq!(store.search(&query("_")).unwrap().total, 0);
    }

    #[test]
    fn test_search_soundness() {
        let (_dir, store) = seeded_store();
        for q in ["a", "al", "alpha", "notes", "txt"] {
            let results = store.search(&query(q)).unwrap();
            let folded_q = fold(q);
            for hit in &results.hits {
                let ok = fold(&hit.name).contains(&folded_q)
                    || fold(&hit.path).contains(&folded_q);
                assert!(ok, "hit {} does not contain {q:?}", hit.path);
            }
        }
    }

    #[test]
    fn test_sort_key_and_kind_parsing() {
        assert_eq!(SortKey::parse("date_modified"), Some(SortKey::DateModified));
        assert_eq!(SortKey::parse("name"), Some(SortKey::Name));
        assert_eq!(SortKey::parse("bogus"), None);
        assert_eq!(KindFilter::parse("directory"), Some(KindFilter::Directory));
        assert_eq!(KindFilter::parse("bogus"), None);
    }
}
