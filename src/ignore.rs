//! Ignore patterns: leaf-name globs that prune entries and subtrees.
//!
//! A pattern matches when it equals the leaf name literally or when it
//! matches as a shell-style glob (`*`, `?`, `[...]`). Matching is always
//! against the leaf name, never the full path; a matching directory prunes
//! its entire subtree.
//!
//! The active set is published copy-on-write: mutations build a new
//! immutable [`IgnoreSet`] and swap it into the shared [`IgnoreCell`], so
//! in-flight scanner and watcher operations keep reading the snapshot they
//! started with.

use std::sync::{Arc, Mutex};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::{FindexError, Result};

/// Patterns installed on a fresh database.
pub const DEFAULT_IGNORES: &[&str] = &[
    "node_modules",
    ".git",
    ".svn",
    "__pycache__",
    ".pytest_cache",
    ".venv",
    "venv",
    ".env",
    "dist",
    "build",
    ".next",
    ".DS_Store",
    "Thumbs.db",
];

/// An immutable, compiled set of ignore patterns.
#[derive(Debug)]
pub struct IgnoreSet {
    patterns: Vec<String>,
    globs: GlobSet,
}

impl Default for IgnoreSet {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            globs: GlobSet::empty(),
        }
    }
}

impl IgnoreSet {
    /// Compile a pattern list. Fails with `InvalidInput` on a malformed
    /// glob; no partial set is produced.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let mut builder = GlobSetBuilder::new();
        for p in &patterns {
            builder.add(compile_pattern(p)?);
        }
        let globs = builder
            .build()
            .map_err(|e| FindexError::InvalidInput(format!("bad ignore pattern set: {e}")))?;
        Ok(Self { patterns, globs })
    }

    /// True when the leaf name matches any pattern, literally or as a glob.
    pub fn matches(&self, leaf: &str) -> bool {
        self.patterns.iter().any(|p| p == leaf) || self.globs.is_match(leaf)
    }

    /// The raw patterns this set was built from.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Validate a single pattern the way the admin boundary requires:
/// a malformed glob is rejected before any state changes.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(FindexError::InvalidInput("empty ignore pattern".into()));
    }
    compile_pattern(pattern)?;
    Ok(())
}

fn compile_pattern(pattern: &str) -> Result<Glob> {
    Glob::new(pattern)
        .map_err(|e| FindexError::InvalidInput(format!("bad ignore pattern {pattern:?}: {e}")))
}

/// Shared copy-on-write holder for the active ignore snapshot.
#[derive(Clone, Default)]
pub struct IgnoreCell {
    inner: Arc<Mutex<Arc<IgnoreSet>>>,
}

impl IgnoreCell {
    pub fn new(set: IgnoreSet) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Arc::new(set))),
        }
    }

    /// The current snapshot. Cheap; callers hold it for the duration of
    /// one scan or one event application.
    pub fn snapshot(&self) -> Arc<IgnoreSet> {
        self.inner.lock().expect("ignore cell poisoned").clone()
    }

    /// Publish a new snapshot, replacing the old one for future readers.
    pub fn publish(&self, set: IgnoreSet) {
        *self.inner.lock().expect("ignore cell poisoned") = Arc::new(set);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match() {
        let set = IgnoreSet::new(["node_modules", ".git"]).unwrap();
        assert!(set.matches("node_modules"));
        assert!(set.matches(".git"));
        assert!(!set.matches("src"));
        assert!(!set.matches("node_modules2"));
    }

    #[test]
    fn test_glob_match() {
        let set = IgnoreSet::new(["*.pyc", "cache-?", "[Tt]humbs.db"]).unwrap();
        assert!(set.matches("module.pyc"));
        assert!(set.matches("cache-1"));
        assert!(!set.matches("cache-10"));
        assert!(set.matches("Thumbs.db"));
        assert!(set.matches("thumbs.db"));
    }

    #[test]
    fn test_matches_leaf_only_semantics() {
        // Patterns never see separators; a path-like leaf is just a name.
        let set = IgnoreSet::new(["build"]).unwrap();
        assert!(set.matches("build"));
        assert!(!set.matches("builder"));
    }

    #[test]
    fn test_empty_set() {
        let set = IgnoreSet::new(Vec::<String>::new()).unwrap();
        assert!(set.is_empty());
        assert!(!set.matches("anything"));
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("node_modules").is_ok());
        assert!(validate_pattern("*.tmp").is_ok());
        assert!(validate_pattern("").is_err());
        assert!(validate_pattern("[unclosed").is_err());
    }

    #[test]
    fn test_default_ignores_compile() {
        let set = IgnoreSet::new(DEFAULT_IGNORES.iter().copied()).unwrap();
        assert!(set.matches("node_modules"));
        assert!(set.matches(".DS_Store"));
        assert!(!set.matches("main.rs"));
    }

    #[test]
    fn test_cell_snapshot_is_stable() {
        let cell = IgnoreCell::new(IgnoreSet::new(["*.log"]).unwrap());
        let snap = cell.snapshot();
        cell.publish(IgnoreSet::new(["*.tmp"]).unwrap());
        // The old snapshot still sees the old set.
        assert!(snap.matches("a.log"));
        assert!(!snap.matches("a.tmp"));
        // New readers see the new set.
        let snap2 = cell.snapshot();
        assert!(snap2.matches("a.tmp"));
        assert!(!snap2.matches("a.log"));
    }
}
