//! Registry of files currently open read-only.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Canonical paths of files open through the read-only path.
///
/// The host offers no shared locks, so at most one handle may claim a
/// read-only file at a time. `try_insert` is an atomic check-and-insert;
/// only the handle whose insert succeeded removes the entry again.
///
/// # Thread Safety
///
/// A single mutex guards the set. Share the registry with `Arc` between
/// every VFS that can open the same files.
#[derive(Debug, Default)]
pub struct ReadOnlyRegistry {
    paths: Mutex<HashSet<PathBuf>>,
}

impl ReadOnlyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `path`. Returns false if it is already claimed.
    pub fn try_insert(&self, path: &Path) -> bool {
        self.paths.lock().insert(path.to_path_buf())
    }

    /// Releases `path`. Returns false if it was not claimed.
    pub fn remove(&self, path: &Path) -> bool {
        self.paths.lock().remove(path)
    }

    /// Returns true if `path` is claimed.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.lock().contains(path)
    }

    /// Returns the number of claimed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    /// Returns true if nothing is claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }
}
