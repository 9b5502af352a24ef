//! Store abstraction for the engine's state root.
//!
//! A `Store` is a logical container for the instinct database, the broker
//! audit log, the run-state file, and the pass lock. All engine state is
//! scoped to a store; nothing is ambient or global.

use std::path::{Path, PathBuf};

/// Store handle representing an engine state workspace.
///
/// Every subsystem takes a `&Store` rather than reaching for process-wide
/// paths, so tests can point the whole engine at a temp directory.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory (`.instinct/data`).
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The project directory holding this store (`.instinct/..`).
    pub fn project_dir(&self) -> &Path {
        self.root
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(&self.root)
    }

    /// Directory the external hook writes observation logs into.
    pub fn observations_dir(&self) -> PathBuf {
        self.root
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.root.clone())
    }
}
