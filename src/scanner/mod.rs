//! Parallel bulk scanner that populates the store.
//!
//! A pool of worker threads drains a shared queue of directories. Each
//! worker reads one directory's immediate children, applies the ignore
//! test to leaf names (a matching directory prunes its whole subtree),
//! buffers records locally, and flushes them to the store in batches.
//! Termination is detected by an in-flight counter reaching zero with the
//! queue empty. Traversal order is unspecified; the index is
//! order-independent.
//!
//! Symbolic links are never followed, which is what breaks link cycles.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, UNIX_EPOCH};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::ignore::IgnoreSet;
use crate::store::{FileKind, FileRecord, Store};
use crate::{FindexError, Result};

/// How long an idle worker waits for new work before re-checking the
/// in-flight counter.
const IDLE_POLL: Duration = Duration::from_millis(25);

/// Scanner tuning knobs.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Worker threads in the pool.
    pub workers: usize,
    /// Records per store transaction.
    pub batch_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: 1000,
        }
    }
}

/// Live progress counters, readable lock-free by the coordinator.
#[derive(Debug, Default)]
pub struct ScanProgress {
    /// Records written to the store so far.
    pub indexed: AtomicU64,
    /// Directories entered so far.
    pub dirs: AtomicU64,
}

impl ScanProgress {
    pub fn indexed(&self) -> u64 {
        self.indexed.load(Ordering::Relaxed)
    }

    pub fn dirs(&self) -> u64 {
        self.dirs.load(Ordering::Relaxed)
    }
}

/// Scan a whole root: emits the root directory entry itself (with no
/// parent), then its subtree. Returns the number of records written.
pub fn scan_root(
    store: &Store,
    root: &Path,
    ignores: &IgnoreSet,
    opts: &ScanOptions,
    progress: &ScanProgress,
    cancel: &AtomicBool,
) -> Result<u64> {
    scan_tree(store, root, None, ignores, opts, progress, cancel)
}

/// Scan a directory subtree into the store.
///
/// `parent` is the containing directory recorded on the top entry; `None`
/// marks it as a root entry. Also used by the watcher to rescan a single
/// directory that appeared inside a watched root.
pub fn scan_tree(
    store: &Store,
    dir: &Path,
    parent: Option<&Path>,
    ignores: &IgnoreSet,
    opts: &ScanOptions,
    progress: &ScanProgress,
    cancel: &AtomicBool,
) -> Result<u64> {
    let meta = std::fs::metadata(dir)?;
    if !meta.is_dir() {
        return Err(FindexError::Scan(format!("not a directory: {}", dir.display())));
    }

    // The top entry itself
    let top = FileRecord {
        path: dir.to_string_lossy().into_owned(),
        name: leaf_of(dir),
        parent_path: parent.map(|p| p.to_string_lossy().into_owned()),
        kind: FileKind::Directory,
        size: 0,
        mtime: mtime_of(&meta),
    };
    store.upsert_many(&[top])?;
    progress.indexed.fetch_add(1, Ordering::Relaxed);

    let (tx, rx) = unbounded::<PathBuf>();
    // Counts queued directories not yet fully processed; workers exit when
    // it reaches zero and the queue is drained.
    let in_flight = AtomicUsize::new(1);
    tx.send(dir.to_path_buf())
        .map_err(|_| FindexError::Scan("work queue closed".into()))?;

    let written = AtomicU64::new(1);
    let first_error: Mutex<Option<FindexError>> = Mutex::new(None);

    let workers = opts.workers.max(1);
    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                run_worker(
                    store,
                    ignores,
                    opts,
                    progress,
                    cancel,
                    &tx,
                    &rx,
                    &in_flight,
                    &written,
                    &first_error,
                );
            });
        }
    });

    if let Some(err) = first_error
        .lock()
        .map_err(|_| FindexError::Scan("scanner error slot poisoned".into()))?
        .take()
    {
        return Err(err);
    }

    Ok(written.load(Ordering::Relaxed))
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    store: &Store,
    ignores: &IgnoreSet,
    opts: &ScanOptions,
    progress: &ScanProgress,
    cancel: &AtomicBool,
    tx: &Sender<PathBuf>,
    rx: &Receiver<PathBuf>,
    in_flight: &AtomicUsize,
    written: &AtomicU64,
    first_error: &Mutex<Option<FindexError>>,
) {
    let mut batch: Vec<FileRecord> = Vec::with_capacity(opts.batch_size);

    loop {
        if cancel.load(Ordering::Relaxed) {
            // Cancelled scans flush nothing further
            return;
        }

        let dir = match rx.recv_timeout(IDLE_POLL) {
            Ok(dir) => dir,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if in_flight.load(Ordering::Acquire) == 0 {
                    break;
                }
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        progress.dirs.fetch_add(1, Ordering::Relaxed);
        visit_directory(&dir, ignores, tx, in_flight, progress, &mut batch);

        if batch.len() >= opts.batch_size {
            flush(store, &mut batch, written, first_error, cancel);
        }

        in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    if !cancel.load(Ordering::Relaxed) && !batch.is_empty() {
        flush(store, &mut batch, written, first_error, cancel);
    }
}

/// Read one directory's children, apply the ignore test, queue child
/// directories, and append records to the worker's batch. Transient I/O
/// errors are logged and skipped; the scan continues.
fn visit_directory(
    dir: &Path,
    ignores: &IgnoreSet,
    tx: &Sender<PathBuf>,
    in_flight: &AtomicUsize,
    progress: &ScanProgress,
    batch: &mut Vec<FileRecord>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Skipping unreadable directory {}: {}", dir.display(), e);
            return;
        }
    };

    let parent_str = dir.to_string_lossy().into_owned();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping entry in {}: {}", dir.display(), e);
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        if ignores.matches(&name) {
            // A matching directory prunes its entire subtree
            continue;
        }

        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if file_type.is_symlink() {
            continue;
        }

        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };

        let is_dir = file_type.is_dir();
        let path = entry.path();

        batch.push(FileRecord {
            path: path.to_string_lossy().into_owned(),
            name,
            parent_path: Some(parent_str.clone()),
            kind: if is_dir { FileKind::Directory } else { FileKind::File },
            size: if is_dir { 0 } else { meta.len() as i64 },
            mtime: mtime_of(&meta),
        });
        progress.indexed.fetch_add(1, Ordering::Relaxed);

        if is_dir {
            in_flight.fetch_add(1, Ordering::AcqRel);
            if tx.send(path).is_err() {
                in_flight.fetch_sub(1, Ordering::AcqRel);
                return;
            }
        }
    }
}

/// Flush one worker's batch to the store. A store failure is fatal for the
/// scan: the first error is recorded and every worker observes the cancel
/// flag.
fn flush(
    store: &Store,
    batch: &mut Vec<FileRecord>,
    written: &AtomicU64,
    first_error: &Mutex<Option<FindexError>>,
    cancel: &AtomicBool,
) {
    match store.upsert_many(batch) {
        Ok(n) => {
            written.fetch_add(n as u64, Ordering::Relaxed);
        }
        Err(e) => {
            tracing::error!("Scan batch flush failed: {}", e);
            if let Ok(mut slot) = first_error.lock() {
                slot.get_or_insert(e);
            }
            cancel.store(true, Ordering::Relaxed);
        }
    }
    batch.clear();
}

fn leaf_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn mtime_of(meta: &std::fs::Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
