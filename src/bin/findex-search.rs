//! findex-search - ad-hoc queries against the index file.
//!
//! A thin client for inspecting the index the daemon maintains. It opens
//! the database directly (WAL mode allows this alongside the daemon) and
//! prints one result per line.
//!
//! # Usage
//!
//! ```text
//! findex-search [OPTIONS] <query...>
//!
//!   --count N          max results (default 100)
//!   --offset N         skip the first N results
//!   --sort KEY         name | path | size | date_modified
//!   --desc             sort descending
//!   --type KIND        all | file | directory
//!   --path PREFIX      restrict to a path prefix
//!   --db FILE          index file (default: the daemon's)
//! ```

use std::path::PathBuf;
use std::process::exit;

use findex::config::Config;
use findex::store::{KindFilter, SearchQuery, SortKey, Store};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()),
        ))
        .init();

    let (db_path, query) = match parse_args() {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("findex-search: {msg}");
            exit(2);
        }
    };

    let store = match Store::open(&db_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("findex-search: cannot open index {db_path:?}: {e}");
            exit(1);
        }
    };

    match store.search(&query) {
        Ok(results) => {
            println!("{} results (showing {})", results.total, results.hits.len());
            for hit in results.hits {
                println!("{}\t{}\t{}", hit.kind.as_str(), hit.size, hit.path);
            }
        }
        Err(e) => {
            eprintln!("findex-search: query failed: {e}");
            exit(1);
        }
    }
}

fn parse_args() -> Result<(PathBuf, SearchQuery), String> {
    let mut query = SearchQuery::default();
    let mut db_path: Option<PathBuf> = None;
    let mut terms: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--count" => {
                let value = args.next().ok_or("--count needs a value")?;
                query.limit = value.parse().map_err(|_| "bad --count value")?;
            }
            "--offset" => {
                let value = args.next().ok_or("--offset needs a value")?;
                query.offset = value.parse().map_err(|_| "bad --offset value")?;
            }
            "--sort" => {
                let value = args.next().ok_or("--sort needs a value")?;
                query.sort =
                    SortKey::parse(&value).ok_or_else(|| format!("unknown sort key {value:?}"))?;
            }
            "--desc" => query.ascending = false,
            "--type" => {
                let value = args.next().ok_or("--type needs a value")?;
                query.kind = KindFilter::parse(&value)
                    .ok_or_else(|| format!("unknown type {value:?}"))?;
            }
            "--path" => {
                query.root_prefix = Some(args.next().ok_or("--path needs a value")?);
            }
            "--db" => {
                db_path = Some(PathBuf::from(args.next().ok_or("--db needs a value")?));
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown option {other}"));
            }
            term => terms.push(term.to_string()),
        }
    }

    query.query = terms.join(" ");

    let db_path = match db_path {
        Some(path) => path,
        None => Config::load().map_err(|e| e.to_string())?.db_path(),
    };

    Ok((db_path, query))
}
