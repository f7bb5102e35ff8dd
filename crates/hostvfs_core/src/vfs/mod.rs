//! File and filesystem provider.
//!
//! The engine sees two tables here: [`Vfs`] for filesystem-level calls
//! (open, delete, access, path and clock services) and [`IoMethods`] for
//! calls on one open file. Open files are addressed by [`FileId`], an
//! opaque handle the provider validates on every call.
//!
//! ## Locking
//!
//! Lock levels are recorded per handle and only ever move in one direction
//! per call: `lock` must raise the level, `unlock` must lower it. Nothing
//! is locked on the host. Exclusion between processes rests entirely on
//! the host refusing a second writer.

mod host;
mod registry;

pub use host::HostVfs;
pub use registry::ReadOnlyRegistry;

use crate::error::OsResult;
use crate::flags::{AccessMode, DeviceCharacteristics, OpenFlags, SyncFlags};
use crate::lock::LockLevel;
use std::fmt::{self, Debug};
use std::path::{Path, PathBuf};

/// VFS table version reported to the engine.
pub const VFS_VERSION: i32 = 3;

/// File-control op asking for the handle's current lock level.
pub const FCNTL_LOCKSTATE: i32 = 1;

/// Opaque handle to an open file.
///
/// Ids are never reused within one VFS, so a stale id is always rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(u64);

impl FileId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

/// Result of a successful [`Vfs::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenedFile {
    /// Handle for subsequent [`IoMethods`] calls.
    pub id: FileId,
    /// The mode the file was actually opened in.
    ///
    /// Exactly [`OpenFlags::READONLY`] when only a read-only handle could
    /// be obtained, otherwise the requested flags.
    pub flags: OpenFlags,
}

/// Operations on one open file.
pub trait IoMethods: Send + Sync + Debug {
    /// Closes the file, deleting it if it was opened delete-on-close.
    ///
    /// # Errors
    ///
    /// Returns `UnknownFile` if `file` is not open. Host failures during
    /// teardown are logged, not returned.
    fn close(&self, file: FileId) -> OsResult<()>;

    /// Fills `buf` from `offset`.
    ///
    /// On any failure the unread part of `buf` is zeroed.
    ///
    /// # Errors
    ///
    /// `Seek` if positioning fails, `ShortRead` if end of file was reached
    /// first, `Read` for any other failure.
    fn read(&self, file: FileId, buf: &mut [u8], offset: u64) -> OsResult<()>;

    /// Writes all of `data` at `offset`.
    ///
    /// # Errors
    ///
    /// `Seek` if positioning fails, `Write` if the write fails.
    fn write(&self, file: FileId, data: &[u8], offset: u64) -> OsResult<()>;

    /// Truncates or extends the file to `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns `Truncate` on host failure.
    fn truncate(&self, file: FileId, size: u64) -> OsResult<()>;

    /// Flushes the file to durable storage.
    ///
    /// # Errors
    ///
    /// Returns `Fsync` on host failure.
    fn sync(&self, file: FileId, flags: SyncFlags) -> OsResult<()>;

    /// Returns the file size in bytes.
    ///
    /// # Errors
    ///
    /// Returns `Fstat` on host failure.
    fn file_size(&self, file: FileId) -> OsResult<u64>;

    /// Raises the recorded lock level to `level`.
    ///
    /// # Errors
    ///
    /// Returns `LockOrder` unless `level` is above the current level.
    fn lock(&self, file: FileId, level: LockLevel) -> OsResult<()>;

    /// Lowers the recorded lock level to `level`.
    ///
    /// # Errors
    ///
    /// Returns `UnlockOrder` unless `level` is below the current level.
    fn unlock(&self, file: FileId, level: LockLevel) -> OsResult<()>;

    /// Returns true if the handle holds any lock.
    ///
    /// # Errors
    ///
    /// Returns `UnknownFile` if `file` is not open.
    fn check_reserved_lock(&self, file: FileId) -> OsResult<bool>;

    /// Answers a file-control request.
    ///
    /// # Errors
    ///
    /// Returns `UnknownFileControl` for ops other than [`FCNTL_LOCKSTATE`].
    fn file_control(&self, file: FileId, op: i32) -> OsResult<i32>;

    /// Returns the logical sector size.
    fn sector_size(&self, file: FileId) -> u32;

    /// Returns the device capability flags.
    fn device_characteristics(&self, file: FileId) -> DeviceCharacteristics;
}

/// Filesystem-level operations, plus the [`IoMethods`] of every file the
/// VFS opens.
pub trait Vfs: IoMethods {
    /// Name the VFS registers under.
    fn name(&self) -> &str;

    /// Longest canonical path the VFS produces.
    fn max_pathname(&self) -> usize;

    /// Table version.
    fn version(&self) -> i32 {
        VFS_VERSION
    }

    /// Opens `path`, or a fresh temporary file when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an `IoErr`-class error if no handle can be obtained.
    fn open(&self, path: Option<&Path>, flags: OpenFlags) -> OsResult<OpenedFile>;

    /// Deletes a file or directory tree. A missing target is not an error.
    ///
    /// With `sync_dir`, the parent directory is synced afterwards.
    ///
    /// # Errors
    ///
    /// `Delete` if removal fails, `DirFsync` if the directory sync fails.
    fn delete(&self, path: &Path, sync_dir: bool) -> OsResult<()>;

    /// Checks `path` for existence, or existence and writability.
    ///
    /// # Errors
    ///
    /// The host provider never fails this check.
    fn access(&self, path: &Path, mode: AccessMode) -> OsResult<bool>;

    /// Converts `path` to an absolute path.
    ///
    /// # Errors
    ///
    /// Returns `PathTooLong` if the result exceeds [`Self::max_pathname`].
    fn full_pathname(&self, path: &Path) -> OsResult<PathBuf>;

    /// Fills `buf` with random bytes; returns the number written.
    fn randomness(&self, buf: &mut [u8]) -> usize;

    /// Sleeps at least `micros` microseconds; returns the time slept.
    fn sleep(&self, micros: u64) -> u64;

    /// Current time as a fractional Julian day.
    fn current_time(&self) -> f64;

    /// Current time as a Julian day in milliseconds.
    fn current_time_i64(&self) -> i64;

    /// Copies the last host error message into `buf`, NUL-terminated.
    ///
    /// Returns the number of message bytes copied.
    fn last_error(&self, buf: &mut [u8]) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_display() {
        assert_eq!(FileId::new(42).to_string(), "file#42");
        assert_eq!(FileId::new(7).as_u64(), 7);
    }
}
