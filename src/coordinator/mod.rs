//! Coordinator: owns the watch-root registry and drives everything else.
//!
//! Each monitored root moves through a small state machine:
//!
//! ```text
//! idle --add--> scanning --scan-done--> watching
//!                |                         |
//!                |                 overflow/rebuild
//!                v                         |
//!              error <------any error------+
//! remove: any state -> (detach watcher, clear entries, drop row)
//! ```
//!
//! The watcher for a root is subscribed before its bulk scan commits, so
//! no event can be lost in the gap between scan completion and watch
//! start; the store's upserts make the overlap harmless. Searches are a
//! pass-through to the store and never depend on scan or watch state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::config::Config;
use crate::ignore::{validate_pattern, IgnoreCell, IgnoreSet, DEFAULT_IGNORES};
use crate::scanner::{scan_root, scan_tree, ScanOptions, ScanProgress};
use crate::store::{RootStatus, SearchQuery, SearchResults, Store, WatchRoot, MAX_LIMIT};
use crate::watcher::{watch_root, WatchOptions, WatcherHandle, WatcherRequest};
use crate::{FindexError, Result};

/// Coordinator tuning, usually taken from the config file.
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub scan_workers: usize,
    pub batch_size: usize,
    pub debounce: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            scan_workers: 4,
            batch_size: 1000,
            debounce: Duration::from_millis(100),
        }
    }
}

impl From<&Config> for CoordinatorOptions {
    fn from(config: &Config) -> Self {
        Self {
            scan_workers: config.general.scan_workers,
            batch_size: config.general.batch_size,
            debounce: Duration::from_millis(config.general.debounce_ms),
        }
    }
}

/// Aggregated service health.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusProjection {
    /// True when at least one root exists and none is scanning.
    pub ready: bool,
    /// Entries currently in the index.
    pub total_indexed: u64,
    pub roots: Vec<WatchRoot>,
}

/// Live resources attached to one root.
struct RootHandle {
    cancel: Arc<AtomicBool>,
    progress: Arc<ScanProgress>,
    scan_thread: Option<JoinHandle<()>>,
    watcher: Option<WatcherHandle>,
}

impl RootHandle {
    /// Stop the watcher, cancel any in-flight scan, and join it.
    fn detach(mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.scan_thread.take() {
            if handle.join().is_err() {
                tracing::error!("Scan thread panicked");
            }
        }
    }
}

/// Process-wide owner of the store, the ignore snapshot, and all roots.
pub struct Coordinator {
    store: Arc<Store>,
    ignores: IgnoreCell,
    roots: Mutex<HashMap<String, RootHandle>>,
    requests_tx: Sender<WatcherRequest>,
    opts: CoordinatorOptions,
}

impl Coordinator {
    /// Initialize the coordinator over an open store.
    ///
    /// On a fresh database (no entries, roots, or patterns yet) the
    /// default ignore set is installed. Persisted roots are not resumed
    /// here; call [`resume_persisted_roots`] for that.
    ///
    /// [`resume_persisted_roots`]: Coordinator::resume_persisted_roots
    pub fn new(store: Arc<Store>, opts: CoordinatorOptions) -> Result<Arc<Self>> {
        let fresh = store.list_ignores()?.is_empty()
            && store.list_roots()?.is_empty()
            && store.count()? == 0;
        if fresh {
            tracing::info!("Fresh database, installing default ignore patterns");
            for pattern in DEFAULT_IGNORES {
                store.add_ignore(pattern)?;
            }
        }

        let (requests_tx, requests_rx) = unbounded();
        let coordinator = Arc::new(Self {
            ignores: IgnoreCell::new(compile_ignores(&store.list_ignores()?)),
            store,
            roots: Mutex::new(HashMap::new()),
            requests_tx,
            opts,
        });

        let weak = Arc::downgrade(&coordinator);
        std::thread::spawn(move || dispatcher_loop(weak, requests_rx));

        Ok(coordinator)
    }

    /// The underlying store, for collaborators that read it directly.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // ---- roots ----

    /// Register a new root and start its bulk scan.
    ///
    /// Rejected with `InvalidInput` when the path doesn't exist, isn't a
    /// directory, or equals/contains/is contained by an active root.
    pub fn add_root(&self, path: &Path) -> Result<()> {
        let canon = std::fs::canonicalize(path)
            .map_err(|_| FindexError::InvalidInput(format!("path not found: {}", path.display())))?;
        if !canon.is_dir() {
            return Err(FindexError::InvalidInput(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        for existing in self.store.list_roots()? {
            if !existing.enabled {
                continue;
            }
            let existing_path = Path::new(&existing.path);
            if canon == existing_path
                || canon.starts_with(existing_path)
                || existing_path.starts_with(&canon)
            {
                return Err(FindexError::InvalidInput(format!(
                    "root {} conflicts with active root {}",
                    canon.display(),
                    existing.path
                )));
            }
        }

        let key = canon.to_string_lossy().into_owned();
        self.store.insert_root(&key, RootStatus::Scanning)?;
        self.start_root(canon)
    }

    /// Detach a root entirely: stop watching, cancel its scan, drop every
    /// indexed entry under it, and forget the root row.
    pub fn remove_root(&self, path: &Path) -> Result<()> {
        let key = self.resolve_root_key(path)?;

        let handle = self
            .roots
            .lock()
            .map_err(|_| FindexError::Store("root registry poisoned".into()))?
            .remove(&key);
        if let Some(handle) = handle {
            handle.detach();
        }

        self.store.clear_root(&key)?;
        self.store.remove_root_row(&key)?;
        tracing::info!("Removed root {}", key);
        Ok(())
    }

    /// Rebuild one root, or all of them when `path` is `None`: clear the
    /// indexed subtree and run a fresh scan, then re-attach the watcher.
    pub fn rebuild(&self, path: Option<&Path>) -> Result<()> {
        let targets: Vec<String> = match path {
            Some(p) => vec![self.resolve_root_key(p)?],
            None => self.store.list_roots()?.into_iter().map(|r| r.path).collect(),
        };

        for key in targets {
            let handle = self
                .roots
                .lock()
                .map_err(|_| FindexError::Store("root registry poisoned".into()))?
                .remove(&key);
            if let Some(handle) = handle {
                handle.detach();
            }

            self.store.set_root_status(&key, RootStatus::Scanning)?;
            self.store.clear_root(&key)?;
            tracing::info!("Rebuilding root {}", key);
            self.start_root(PathBuf::from(&key))?;
        }
        Ok(())
    }

    /// Re-attach roots persisted by an earlier run: roots left `watching`
    /// get their watcher back, everything else gets a fresh scan.
    pub fn resume_persisted_roots(&self) -> Result<()> {
        for root in self.store.list_roots()? {
            if !root.enabled {
                continue;
            }
            let path = PathBuf::from(&root.path);
            if !path.is_dir() {
                tracing::warn!("Persisted root {} no longer exists", root.path);
                self.store.set_root_error(&root.path, "root directory missing")?;
                continue;
            }
            match root.status {
                RootStatus::Watching => self.attach_watcher_only(path)?,
                _ => {
                    self.store.set_root_status(&root.path, RootStatus::Scanning)?;
                    self.store.clear_root(&root.path)?;
                    self.start_root(path)?;
                }
            }
        }
        Ok(())
    }

    /// The persisted roots, as the admin surface lists them.
    pub fn list_roots(&self) -> Result<Vec<WatchRoot>> {
        self.store.list_roots()
    }

    // ---- search & status ----

    /// Pass a query through to the store, applying the §6 defaults.
    pub fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        let mut q = query.clone();
        if q.limit == 0 {
            q.limit = SearchQuery::default().limit;
        }
        q.limit = q.limit.min(MAX_LIMIT);
        self.store.search(&q)
    }

    /// Aggregate per-root counters and health into one projection.
    pub fn status(&self) -> Result<StatusProjection> {
        let mut roots = self.store.list_roots()?;

        // Scanning roots report live counters, not the persisted snapshot
        let handles = self
            .roots
            .lock()
            .map_err(|_| FindexError::Store("root registry poisoned".into()))?;
        for root in &mut roots {
            if root.status == RootStatus::Scanning {
                if let Some(handle) = handles.get(&root.path) {
                    let seen = handle.progress.indexed() as i64;
                    root.indexed_files = seen;
                    root.total_files = seen.max(root.total_files);
                }
            }
        }
        drop(handles);

        let ready = !roots.is_empty() && roots.iter().all(|r| r.status != RootStatus::Scanning);

        Ok(StatusProjection {
            ready,
            total_indexed: self.store.count()?,
            roots,
        })
    }

    // ---- ignore patterns ----

    pub fn list_ignores(&self) -> Result<Vec<String>> {
        self.store.list_ignores()
    }

    /// Add a pattern. Malformed globs are rejected before any state
    /// changes; future scans and events see the new snapshot.
    pub fn add_ignore(&self, pattern: &str) -> Result<()> {
        validate_pattern(pattern)?;
        self.store.add_ignore(pattern)?;
        self.republish_ignores()
    }

    /// Remove a pattern; returns false when it wasn't present.
    pub fn remove_ignore(&self, pattern: &str) -> Result<bool> {
        let removed = self.store.remove_ignore(pattern)?;
        self.republish_ignores()?;
        Ok(removed)
    }

    /// Install the stock ignore set on top of whatever is present.
    pub fn add_default_ignores(&self) -> Result<()> {
        for pattern in DEFAULT_IGNORES {
            self.store.add_ignore(pattern)?;
        }
        self.republish_ignores()
    }

    fn republish_ignores(&self) -> Result<()> {
        self.ignores.publish(compile_ignores(&self.store.list_ignores()?));
        Ok(())
    }

    // ---- internals ----

    fn resolve_root_key(&self, path: &Path) -> Result<String> {
        let roots = self.store.list_roots()?;
        let raw = path.to_string_lossy();
        if roots.iter().any(|r| r.path == raw) {
            return Ok(raw.into_owned());
        }
        if let Ok(canon) = std::fs::canonicalize(path) {
            let canon = canon.to_string_lossy().into_owned();
            if roots.iter().any(|r| r.path == canon) {
                return Ok(canon);
            }
        }
        Err(FindexError::InvalidInput(format!(
            "not a registered root: {}",
            path.display()
        )))
    }

    /// Subscribe the watcher, then kick off the bulk scan on a background
    /// thread. The subscription happening first is what guarantees no
    /// event is lost between the last scan commit and watch start.
    fn start_root(&self, root: PathBuf) -> Result<()> {
        let key = root.to_string_lossy().into_owned();

        let watcher = match watch_root(
            self.store.clone(),
            root.clone(),
            self.ignores.clone(),
            self.requests_tx.clone(),
            WatchOptions {
                debounce: self.opts.debounce,
            },
        ) {
            Ok(watcher) => watcher,
            Err(e) => {
                self.store.set_root_error(&key, &e.to_string())?;
                return Err(e);
            }
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let progress = Arc::new(ScanProgress::default());
        let store = self.store.clone();
        let snapshot = self.ignores.snapshot();
        let scan_opts = ScanOptions {
            workers: self.opts.scan_workers,
            batch_size: self.opts.batch_size,
        };

        let thread_cancel = cancel.clone();
        let thread_progress = progress.clone();
        let thread_key = key.clone();
        let scan_thread = std::thread::spawn(move || {
            tracing::info!("Scanning {}", thread_key);
            match scan_root(&store, &root, &snapshot, &scan_opts, &thread_progress, &thread_cancel)
            {
                Ok(written) => {
                    if thread_cancel.load(Ordering::Relaxed) {
                        // Root was removed or rebuilt mid-scan
                        return;
                    }
                    let seen = thread_progress.indexed();
                    if let Err(e) = store.mark_scan_complete(&thread_key, seen, written) {
                        tracing::warn!("Failed to record scan completion: {}", e);
                    }
                    tracing::info!("Scan of {} complete: {} entries", thread_key, written);
                }
                Err(e) => {
                    if thread_cancel.load(Ordering::Relaxed) {
                        return;
                    }
                    tracing::error!("Scan of {} failed: {}", thread_key, e);
                    let _ = store.set_root_error(&thread_key, &e.to_string());
                }
            }
        });

        self.roots
            .lock()
            .map_err(|_| FindexError::Store("root registry poisoned".into()))?
            .insert(
                key,
                RootHandle {
                    cancel,
                    progress,
                    scan_thread: Some(scan_thread),
                    watcher: Some(watcher),
                },
            );
        Ok(())
    }

    /// Re-attach only the watcher for a root whose index is already
    /// populated from an earlier run.
    fn attach_watcher_only(&self, root: PathBuf) -> Result<()> {
        let key = root.to_string_lossy().into_owned();
        let watcher = match watch_root(
            self.store.clone(),
            root,
            self.ignores.clone(),
            self.requests_tx.clone(),
            WatchOptions {
                debounce: self.opts.debounce,
            },
        ) {
            Ok(watcher) => watcher,
            Err(e) => {
                self.store.set_root_error(&key, &e.to_string())?;
                return Err(e);
            }
        };

        self.roots
            .lock()
            .map_err(|_| FindexError::Store("root registry poisoned".into()))?
            .insert(
                key,
                RootHandle {
                    cancel: Arc::new(AtomicBool::new(false)),
                    progress: Arc::new(ScanProgress::default()),
                    scan_thread: None,
                    watcher: Some(watcher),
                },
            );
        Ok(())
    }

    /// Run a scanner-pool pass over one directory that appeared inside a
    /// watched root.
    fn handle_scan_dir(&self, dir: PathBuf) {
        // Borrow the owning root's cancel flag and counters so a
        // concurrent remove/rebuild also cancels this pass.
        let (cancel, progress) = {
            let handles = match self.roots.lock() {
                Ok(handles) => handles,
                Err(_) => return,
            };
            handles
                .iter()
                .find(|(root, _)| dir.starts_with(Path::new(root.as_str())))
                .map(|(_, h)| (h.cancel.clone(), h.progress.clone()))
                .unwrap_or_else(|| {
                    (Arc::new(AtomicBool::new(false)), Arc::new(ScanProgress::default()))
                })
        };

        let store = self.store.clone();
        let snapshot = self.ignores.snapshot();
        let opts = ScanOptions {
            workers: 2.min(self.opts.scan_workers.max(1)),
            batch_size: self.opts.batch_size,
        };

        std::thread::spawn(move || {
            let parent = dir.parent().map(|p| p.to_path_buf());
            if let Err(e) = scan_tree(
                &store,
                &dir,
                parent.as_deref(),
                &snapshot,
                &opts,
                &progress,
                &cancel,
            ) {
                tracing::warn!("Rescan of {} failed: {}", dir.display(), e);
            }
        });
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        let handles: Vec<RootHandle> = match self.roots.lock() {
            Ok(mut map) => map.drain().map(|(_, h)| h).collect(),
            Err(_) => return,
        };
        for handle in handles {
            handle.detach();
        }
    }
}

/// Build a snapshot from persisted patterns, skipping any that no longer
/// compile rather than refusing to start.
fn compile_ignores(patterns: &[String]) -> IgnoreSet {
    match IgnoreSet::new(patterns.iter().cloned()) {
        Ok(set) => set,
        Err(e) => {
            tracing::warn!("Ignoring unusable persisted patterns: {}", e);
            let usable: Vec<String> = patterns
                .iter()
                .filter(|p| validate_pattern(p).is_ok())
                .cloned()
                .collect();
            IgnoreSet::new(usable).unwrap_or_default()
        }
    }
}

fn dispatcher_loop(coordinator: Weak<Coordinator>, requests: Receiver<WatcherRequest>) {
    while let Ok(request) = requests.recv() {
        let Some(coordinator) = coordinator.upgrade() else {
            break;
        };
        match request {
            WatcherRequest::RescanRoot(path) => {
                tracing::info!("Full rescan requested for {}", path.display());
                if let Err(e) = coordinator.rebuild(Some(&path)) {
                    tracing::warn!("Requested rescan of {} failed: {}", path.display(), e);
                }
            }
            WatcherRequest::ScanDir(dir) => coordinator.handle_scan_dir(dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KindFilter;
    use std::time::Instant;

    fn wait_for(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    }

    fn new_coordinator() -> (tempfile::TempDir, Arc<Coordinator>) {
        let db_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&db_dir.path().join("index.db")).unwrap());
        let coordinator = Coordinator::new(store, CoordinatorOptions::default()).unwrap();
        (db_dir, coordinator)
    }

    fn wait_until_watching(coordinator: &Coordinator, root: &Path) -> bool {
        let key = root.to_string_lossy().into_owned();
        wait_for(Duration::from_secs(15), || {
            matches!(
                coordinator.store().get_root(&key).unwrap(),
                Some(r) if r.status == RootStatus::Watching
            )
        })
    }

    #[test]
    fn test_fresh_database_gets_default_ignores() {
        let (_db, coordinator) = new_coordinator();
        let patterns = coordinator.list_ignores().unwrap();
        assert!(patterns.contains(&"node_modules".to_string()));
        assert!(patterns.contains(&".git".to_string()));
        assert!(patterns.contains(&"Thumbs.db".to_string()));
    }

    #[test]
    fn test_add_root_rejects_missing_path() {
        let (_db, coordinator) = new_coordinator();
        let err = coordinator
            .add_root(Path::new("/definitely/not/here"))
            .unwrap_err();
        assert!(matches!(err, FindexError::InvalidInput(_)));
    }

    #[test]
    fn test_add_root_rejects_file() {
        let (_db, coordinator) = new_coordinator();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        let err = coordinator.add_root(&file).unwrap_err();
        assert!(matches!(err, FindexError::InvalidInput(_)));
    }

    #[test]
    fn test_nested_roots_rejected_both_ways() {
        let (_db, coordinator) = new_coordinator();
        let tree = tempfile::tempdir().unwrap();
        std::fs::create_dir(tree.path().join("inner")).unwrap();

        coordinator.add_root(tree.path()).unwrap();

        // Child of an active root
        let err = coordinator.add_root(&tree.path().join("inner")).unwrap_err();
        assert!(matches!(err, FindexError::InvalidInput(_)));
        // Same root again
        let err = coordinator.add_root(tree.path()).unwrap_err();
        assert!(matches!(err, FindexError::InvalidInput(_)));

        // The original root is unchanged
        assert!(coordinator
            .store()
            .get_root(&tree.path().to_string_lossy())
            .unwrap()
            .is_some());
        assert_eq!(coordinator.store().list_roots().unwrap().len(), 1);
    }

    #[test]
    fn test_add_root_scans_and_transitions_to_watching() {
        let (_db, coordinator) = new_coordinator();
        let tree = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("alpha.txt"), b"a").unwrap();
        std::fs::write(tree.path().join("beta.md"), b"b").unwrap();
        std::fs::create_dir(tree.path().join("gamma")).unwrap();

        coordinator.add_root(tree.path()).unwrap();
        assert!(wait_until_watching(&coordinator, tree.path()));

        let results = coordinator
            .search(&SearchQuery {
                query: "al".to_string(),
                ..SearchQuery::default()
            })
            .unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.hits[0].name, "alpha.txt");

        let status = coordinator.status().unwrap();
        assert!(status.ready);
        // root + 3 children
        assert_eq!(status.total_indexed, 4);
        assert_eq!(status.roots.len(), 1);
        assert_eq!(status.roots[0].status, RootStatus::Watching);
    }

    #[test]
    fn test_remove_root_clears_entries_and_row() {
        let (_db, coordinator) = new_coordinator();
        let tree = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("one.txt"), b"1").unwrap();

        coordinator.add_root(tree.path()).unwrap();
        assert!(wait_until_watching(&coordinator, tree.path()));
        assert!(coordinator.store().count().unwrap() >= 2);

        coordinator.remove_root(tree.path()).unwrap();
        assert_eq!(coordinator.store().count().unwrap(), 0);
        assert!(coordinator.store().list_roots().unwrap().is_empty());

        let status = coordinator.status().unwrap();
        assert!(!status.ready);
    }

    #[test]
    fn test_rebuild_applies_new_ignores() {
        let (_db, coordinator) = new_coordinator();
        let tree = tempfile::tempdir().unwrap();
        std::fs::create_dir(tree.path().join("cache")).unwrap();
        std::fs::write(tree.path().join("cache/blob.bin"), b"x").unwrap();
        std::fs::write(tree.path().join("keep.txt"), b"x").unwrap();

        coordinator.add_root(tree.path()).unwrap();
        assert!(wait_until_watching(&coordinator, tree.path()));
        // root + cache + blob.bin + keep.txt
        assert_eq!(coordinator.store().count().unwrap(), 4);

        coordinator.add_ignore("cache").unwrap();
        coordinator.rebuild(Some(tree.path())).unwrap();
        assert!(wait_until_watching(&coordinator, tree.path()));

        // cache/ and its content are gone after the rebuild
        assert!(wait_for(Duration::from_secs(5), || {
            coordinator.store().count().unwrap() == 2
        }));
        let results = coordinator
            .search(&SearchQuery {
                query: "blob".to_string(),
                ..SearchQuery::default()
            })
            .unwrap();
        assert_eq!(results.total, 0);
    }

    #[test]
    fn test_rebuild_unknown_root_is_invalid_input() {
        let (_db, coordinator) = new_coordinator();
        let err = coordinator.rebuild(Some(Path::new("/nope"))).unwrap_err();
        assert!(matches!(err, FindexError::InvalidInput(_)));
    }

    #[test]
    fn test_ignore_admin_validates_patterns() {
        let (_db, coordinator) = new_coordinator();
        assert!(matches!(
            coordinator.add_ignore("[broken"),
            Err(FindexError::InvalidInput(_))
        ));
        coordinator.add_ignore("*.swp").unwrap();
        assert!(coordinator.list_ignores().unwrap().contains(&"*.swp".to_string()));
        assert!(coordinator.remove_ignore("*.swp").unwrap());
        assert!(!coordinator.remove_ignore("*.swp").unwrap());
    }

    #[test]
    fn test_search_applies_default_limit() {
        let (_db, coordinator) = new_coordinator();
        let q = SearchQuery {
            limit: 0,
            ..SearchQuery::default()
        };
        // No entries; just exercising the clamp path
        let results = coordinator.search(&q).unwrap();
        assert_eq!(results.total, 0);

        let q = SearchQuery {
            limit: usize::MAX,
            kind: KindFilter::File,
            ..SearchQuery::default()
        };
        let results = coordinator.search(&q).unwrap();
        assert_eq!(results.total, 0);
    }

    #[test]
    fn test_resume_watching_root_reattaches() {
        let db_dir = tempfile::tempdir().unwrap();
        let tree = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("seed.txt"), b"x").unwrap();

        {
            let store = Arc::new(Store::open(&db_dir.path().join("index.db")).unwrap());
            let coordinator = Coordinator::new(store, CoordinatorOptions::default()).unwrap();
            coordinator.add_root(tree.path()).unwrap();
            assert!(wait_until_watching(&coordinator, tree.path()));
        }

        // "Restart": new store and coordinator over the same file
        let store = Arc::new(Store::open(&db_dir.path().join("index.db")).unwrap());
        let coordinator = Coordinator::new(store, CoordinatorOptions::default()).unwrap();
        coordinator.resume_persisted_roots().unwrap();

        // Still watching, index intact, and events flow again
        assert!(wait_until_watching(&coordinator, tree.path()));
        assert!(coordinator.store().count().unwrap() >= 2);

        let fresh = tree.path().join("post-restart.txt");
        std::fs::write(&fresh, b"x").unwrap();
        assert!(wait_for(Duration::from_secs(10), || {
            coordinator
                .store()
                .entry_kind(&fresh.to_string_lossy())
                .unwrap()
                .is_some()
        }));
    }
}
