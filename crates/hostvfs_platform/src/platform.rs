//! Host filesystem trait definitions.

use crate::error::PlatformResult;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Metadata returned by [`PlatformFile::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    /// Whether the path names a directory.
    pub is_directory: bool,
    /// Whether the path refuses write access.
    pub is_read_only: bool,
    /// Size in bytes (zero for directories).
    pub size: u64,
}

/// An open file handed out by a [`PlatformFile`].
///
/// Handles are **positional**: reads and writes happen at the current
/// position, which callers move with [`seek`](Self::seek). This mirrors the
/// handle shape most engine platform layers expose, and is the shape the
/// providers in `hostvfs_core` are written against.
///
/// # Invariants
///
/// - `read` never reads past the end of the file; it returns the number of
///   bytes actually copied, which may be fewer than requested
/// - `write` writes the whole buffer or fails
/// - a handle obtained from `open_read` rejects `write`, `truncate`
pub trait PlatformFileHandle: Send + Debug {
    /// Returns the current position.
    ///
    /// # Errors
    ///
    /// Returns an error if the position cannot be queried.
    fn tell(&mut self) -> PlatformResult<u64>;

    /// Moves the current position to `offset` bytes from the start.
    ///
    /// Seeking past the end is allowed; a subsequent write extends the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the host refuses the seek.
    fn seek(&mut self, offset: u64) -> PlatformResult<()>;

    /// Reads into `buf` from the current position.
    ///
    /// Returns the number of bytes read. Stops early only at end of file.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read(&mut self, buf: &mut [u8]) -> PlatformResult<usize>;

    /// Writes all of `data` at the current position.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is read-only or an I/O error occurs.
    fn write(&mut self, data: &[u8]) -> PlatformResult<()>;

    /// Flushes pending writes.
    ///
    /// With `full` set, data and metadata are forced to durable storage;
    /// otherwise only file contents are.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self, full: bool) -> PlatformResult<()>;

    /// Truncates (or extends with zeros) the file to `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is read-only or an I/O error occurs.
    fn truncate(&mut self, size: u64) -> PlatformResult<()>;

    /// Returns the current size of the file in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> PlatformResult<u64>;
}

/// A host filesystem.
///
/// This is the platform layer the file provider adapts to. It has no notion
/// of byte-range locks: the only exclusivity it offers is whether a file can
/// be opened for writing at all.
///
/// # Implementors
///
/// - [`super::NativePlatform`] - the operating system's filesystem
/// - [`super::InMemoryPlatform`] - for tests, with switchable read-only files
pub trait PlatformFile: Send + Sync + Debug {
    /// Returns true if `path` names an existing regular file.
    fn file_exists(&self, path: &Path) -> bool;

    /// Returns true if `path` names an existing directory.
    fn directory_exists(&self, path: &Path) -> bool;

    /// Returns true if `path` exists and refuses write access.
    fn is_read_only(&self, path: &Path) -> bool;

    /// Returns metadata for `path`, or `None` if it does not exist.
    fn stat(&self, path: &Path) -> Option<FileStat>;

    /// Opens `path` for writing, creating it if missing.
    ///
    /// Existing contents are preserved. With `allow_read`, the handle can
    /// also read.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is read-only or cannot be created.
    fn open_write(&self, path: &Path, allow_read: bool)
        -> PlatformResult<Box<dyn PlatformFileHandle>>;

    /// Opens an existing `path` for reading only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    fn open_read(&self, path: &Path) -> PlatformResult<Box<dyn PlatformFileHandle>>;

    /// Deletes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be removed.
    fn delete_file(&self, path: &Path) -> PlatformResult<()>;

    /// Deletes the directory at `path` and everything beneath it.
    ///
    /// # Errors
    ///
    /// Returns an error if any entry cannot be removed.
    fn delete_directory_recursively(&self, path: &Path) -> PlatformResult<()>;

    /// Creates `path` and any missing parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    fn create_directory_tree(&self, path: &Path) -> PlatformResult<()>;

    /// Makes directory entry changes under `path` durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the host fails the directory sync.
    fn sync_directory(&self, path: &Path) -> PlatformResult<()>;

    /// Returns the name the host uses on disk for `path`.
    ///
    /// Two spellings of the same file map to the same result.
    fn filename_on_disk(&self, path: &Path) -> PathBuf;

    /// Converts a possibly-relative path to an absolute one.
    fn convert_to_absolute(&self, path: &Path) -> PathBuf;
}

/// Collapses `.` and `..` components without touching the filesystem.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(
            normalize_lexically(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
    }

    #[test]
    fn normalize_keeps_leading_parent_of_relative() {
        assert_eq!(
            normalize_lexically(Path::new("../x/y")),
            PathBuf::from("../x/y")
        );
    }

    #[test]
    fn normalize_stops_at_root() {
        assert_eq!(normalize_lexically(Path::new("/..")), PathBuf::from("/"));
    }
}
