//! Incremental watcher: translates filesystem notifications into store
//! mutations.
//!
//! One watcher subscribes recursively to a single root. Raw notifications
//! land on a channel and are applied by a dedicated thread, which gives
//! per-path FIFO ordering for free. Duplicate modify events on the same
//! path coalesce inside a short window before the stat+upsert runs.
//! Events whose path has any segment matching an ignore pattern are
//! dropped.
//!
//! Work the watcher cannot do alone goes back to the coordinator as a
//! [`WatcherRequest`]: enumerating a directory that appeared inside the
//! root (the scanner pool handles that), and the full rescan demanded by
//! a notification overflow.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::ignore::IgnoreCell;
use crate::store::{FileKind, FileRecord, Store};
use crate::Result;

/// Idle wait when no debounced modify is pending.
const IDLE_POLL: Duration = Duration::from_millis(500);

/// Work the watcher hands back to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherRequest {
    /// The notification subsystem dropped events; the whole root must be
    /// rescanned.
    RescanRoot(PathBuf),
    /// A directory appeared inside the root; enumerate it via the
    /// scanner pool.
    ScanDir(PathBuf),
}

/// Watcher tuning knobs.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Coalescing window for duplicate modify events.
    pub debounce: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
        }
    }
}

/// Handle for a running watcher. Dropping it (or calling [`stop`]) tears
/// down the subscription and joins the apply thread.
///
/// [`stop`]: WatcherHandle::stop
pub struct WatcherHandle {
    watcher: Option<RecommendedWatcher>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Stop watching and wait for the apply thread to drain.
    pub fn stop(&mut self) {
        // Dropping the watcher drops the event sender, which disconnects
        // the apply thread's channel.
        self.watcher.take();
        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(()) => tracing::debug!("Watcher apply thread stopped"),
                Err(_) => tracing::error!("Watcher apply thread panicked"),
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Subscribe to change notifications for `root` and start applying them
/// to the store.
pub fn watch_root(
    store: Arc<Store>,
    root: PathBuf,
    ignores: IgnoreCell,
    requests: Sender<WatcherRequest>,
    opts: WatchOptions,
) -> Result<WatcherHandle> {
    let (tx, rx) = unbounded::<notify::Result<Event>>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.send(res);
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    tracing::info!("Watching {}", root.display());

    let thread = std::thread::spawn(move || {
        apply_loop(store, root, ignores, requests, rx, opts);
    });

    Ok(WatcherHandle {
        watcher: Some(watcher),
        thread: Some(thread),
    })
}

fn apply_loop(
    store: Arc<Store>,
    root: PathBuf,
    ignores: IgnoreCell,
    requests: Sender<WatcherRequest>,
    rx: Receiver<notify::Result<Event>>,
    opts: WatchOptions,
) {
    let mut ctx = ApplyCtx {
        store,
        root,
        ignores,
        requests,
        debounce: opts.debounce,
        pending: HashMap::new(),
    };

    loop {
        let timeout = ctx
            .pending
            .values()
            .min()
            .map(|due| due.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_POLL);

        match rx.recv_timeout(timeout) {
            Ok(Ok(event)) => ctx.handle_event(event),
            Ok(Err(e)) => {
                // A failing notification backend may have dropped events
                tracing::warn!("Watch error on {}: {}", ctx.root.display(), e);
                let _ = ctx.requests.send(WatcherRequest::RescanRoot(ctx.root.clone()));
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }

        ctx.apply_due_modifies();
    }
}

struct ApplyCtx {
    store: Arc<Store>,
    root: PathBuf,
    ignores: IgnoreCell,
    requests: Sender<WatcherRequest>,
    debounce: Duration,
    /// Paths with a coalescing modify window open, keyed to when the
    /// stat+upsert is due.
    pending: HashMap<PathBuf, Instant>,
}

impl ApplyCtx {
    fn handle_event(&mut self, event: Event) {
        if event.need_rescan() {
            tracing::warn!(
                "Notification overflow on {}, requesting full rescan",
                self.root.display()
            );
            let _ = self.requests.send(WatcherRequest::RescanRoot(self.root.clone()));
            return;
        }

        match event.kind {
            EventKind::Create(_) => {
                for path in &event.paths {
                    self.on_created(path);
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    self.on_removed(path);
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => self.on_name_change(mode, &event.paths),
            EventKind::Access(_) => {}
            // Plain modifies plus anything the backend couldn't classify:
            // the debounced stat decides what actually happened
            _ => {
                for path in &event.paths {
                    self.queue_modify(path);
                }
            }
        }
    }

    fn on_name_change(&mut self, mode: RenameMode, paths: &[PathBuf]) {
        match (mode, paths) {
            // Both endpoints inside this root: a true rename
            (RenameMode::Both, [src, dst]) => self.on_renamed(src, dst),
            // Source half only: moved out of every root
            (RenameMode::From, _) => {
                for path in paths {
                    self.on_removed(path);
                }
            }
            // Destination half only: moved in from outside
            (RenameMode::To, _) => {
                for path in paths {
                    self.on_created(path);
                }
            }
            // Backend couldn't say which half this is; existence decides
            _ => {
                for path in paths {
                    if path.exists() {
                        self.on_created(path);
                    } else {
                        self.on_removed(path);
                    }
                }
            }
        }
    }

    /// True when the leaf or any ancestor segment below the root matches
    /// an ignore pattern. Ignored subtrees were never indexed, so events
    /// from inside them must not be either.
    fn ignored(&self, path: &Path) -> bool {
        let snapshot = self.ignores.snapshot();
        if snapshot.is_empty() {
            return false;
        }
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components().any(|c| match c {
            std::path::Component::Normal(part) => snapshot.matches(&part.to_string_lossy()),
            _ => false,
        })
    }

    fn on_created(&mut self, path: &Path) {
        if self.ignored(path) {
            return;
        }
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                // Already gone again; a pending remove event will follow
                tracing::debug!("stat failed for created {}: {}", path.display(), e);
                return;
            }
        };
        if meta.file_type().is_symlink() {
            return;
        }

        if let Err(e) = self.store.upsert_many(&[record_from_meta(path, &meta)]) {
            tracing::warn!("Failed to index created {}: {}", path.display(), e);
            return;
        }

        if meta.is_dir() {
            // Contents are enumerated by the scanner pool, not here
            let _ = self.requests.send(WatcherRequest::ScanDir(path.to_path_buf()));
        }
    }

    fn queue_modify(&mut self, path: &Path) {
        if self.ignored(path) {
            return;
        }
        let due = Instant::now() + self.debounce;
        // Coalesce: an open window keeps its original deadline
        self.pending.entry(path.to_path_buf()).or_insert(due);
    }

    fn apply_due_modifies(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let now = Instant::now();
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(p, _)| p.clone())
            .collect();
        for path in due {
            self.pending.remove(&path);
            self.apply_modify(&path);
        }
    }

    fn apply_modify(&mut self, path: &Path) {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(_) => {
                // Vanished between event and debounce window
                if let Err(e) = self.store.delete_path(&path.to_string_lossy()) {
                    tracing::warn!("Failed to drop vanished {}: {}", path.display(), e);
                }
                return;
            }
        };
        // Directory mtime churn is not indexed state
        if meta.is_dir() || meta.file_type().is_symlink() {
            return;
        }
        if let Err(e) = self.store.upsert_many(&[record_from_meta(path, &meta)]) {
            tracing::warn!("Failed to refresh {}: {}", path.display(), e);
        }
    }

    fn on_removed(&mut self, path: &Path) {
        if self.ignored(path) {
            return;
        }
        self.pending.remove(path);
        let path_str = path.to_string_lossy().into_owned();

        // The object is gone from disk; the index remembers what it was
        let result = match self.store.entry_kind(&path_str) {
            Ok(Some(FileKind::Directory)) => self.store.delete_subtree(&path_str).map(|_| ()),
            Ok(Some(FileKind::File)) => self.store.delete_path(&path_str).map(|_| ()),
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }

    fn on_renamed(&mut self, src: &Path, dst: &Path) {
        let src_ignored = self.ignored(src);
        let dst_ignored = self.ignored(dst);

        if src_ignored && dst_ignored {
            return;
        }
        if dst_ignored {
            // Moved under an ignored name: gone as far as the index cares
            self.on_removed(src);
            return;
        }
        if src_ignored {
            self.on_created(dst);
            return;
        }

        self.pending.remove(src);
        match self
            .store
            .rename(&src.to_string_lossy(), &dst.to_string_lossy())
        {
            Ok(true) => {}
            Ok(false) => {
                // Source was never indexed; treat as an arrival
                self.on_created(dst);
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to rename {} -> {}: {}",
                    src.display(),
                    dst.display(),
                    e
                );
            }
        }
    }
}

fn record_from_meta(path: &Path, meta: &std::fs::Metadata) -> FileRecord {
    let is_dir = meta.is_dir();
    FileRecord {
        path: path.to_string_lossy().into_owned(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        parent_path: path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_string_lossy().into_owned()),
        kind: if is_dir { FileKind::Directory } else { FileKind::File },
        size: if is_dir { 0 } else { meta.len() as i64 },
        mtime: meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0),
    }
}
