//! Error types for provider operations.

use crate::codes::ResultCode;
use crate::lock::LockLevel;
use crate::vfs::FileId;
use hostvfs_platform::PlatformError;
use std::cell::RefCell;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for provider operations.
pub type OsResult<T> = Result<T, OsError>;

/// Errors that can occur in the provider layer.
///
/// Every variant maps to exactly one engine result code through
/// [`OsError::code`]. Distinct host failures keep distinct codes: the
/// engine's recovery logic branches on them.
#[derive(Debug, Error)]
pub enum OsError {
    /// `EXCLUSIVE` open of a file that already exists.
    #[error("file already exists: {}", path.display())]
    AlreadyExists {
        /// The path that was opened.
        path: PathBuf,
    },

    /// Open without `CREATE` of a file that does not exist.
    #[error("file does not exist: {}", path.display())]
    Missing {
        /// The path that was opened.
        path: PathBuf,
    },

    /// Another handle already has this file open read-only.
    #[error("file already open read-only: {}", path.display())]
    ReadOnlyConflict {
        /// The canonical path of the file.
        path: PathBuf,
    },

    /// The host refused to hand out a handle.
    #[error("cannot open {}", path.display())]
    OpenFailed {
        /// The path that was opened.
        path: PathBuf,
        /// The host failure, if there was one.
        #[source]
        source: Option<PlatformError>,
    },

    /// Seeking to an offset failed.
    #[error("seek to {offset} failed: {source}")]
    Seek {
        /// The requested offset.
        offset: u64,
        /// The host failure.
        #[source]
        source: PlatformError,
    },

    /// A read failed before reaching end of file.
    #[error("read of {len} bytes at {offset} failed")]
    Read {
        /// The requested offset.
        offset: u64,
        /// The requested length.
        len: usize,
        /// The host failure, if there was one.
        #[source]
        source: Option<PlatformError>,
    },

    /// A read hit end of file before filling the buffer.
    #[error("short read at {offset}: requested {requested} bytes, got {read}")]
    ShortRead {
        /// The requested offset.
        offset: u64,
        /// The requested length.
        requested: usize,
        /// The number of bytes actually read.
        read: usize,
    },

    /// A write failed.
    #[error("write of {len} bytes at {offset} failed: {source}")]
    Write {
        /// The requested offset.
        offset: u64,
        /// The requested length.
        len: usize,
        /// The host failure.
        #[source]
        source: PlatformError,
    },

    /// Truncation failed.
    #[error("truncate to {size} failed: {source}")]
    Truncate {
        /// The requested size.
        size: u64,
        /// The host failure.
        #[source]
        source: PlatformError,
    },

    /// Flushing to durable storage failed.
    #[error("sync failed: {source}")]
    Fsync {
        /// The host failure.
        #[source]
        source: PlatformError,
    },

    /// Syncing a directory after a delete failed.
    #[error("directory sync of {} failed: {source}", path.display())]
    DirFsync {
        /// The directory that was synced.
        path: PathBuf,
        /// The host failure.
        #[source]
        source: PlatformError,
    },

    /// Querying the file size failed.
    #[error("file size query failed: {source}")]
    Fstat {
        /// The host failure.
        #[source]
        source: PlatformError,
    },

    /// A lock request did not raise the held level.
    #[error("lock to {requested} rejected while holding {held}")]
    LockOrder {
        /// The level held when the request arrived.
        held: LockLevel,
        /// The requested level.
        requested: LockLevel,
    },

    /// An unlock request did not lower the held level.
    #[error("unlock to {requested} rejected while holding {held}")]
    UnlockOrder {
        /// The level held when the request arrived.
        held: LockLevel,
        /// The requested level.
        requested: LockLevel,
    },

    /// Deleting a file or directory failed.
    #[error("delete of {} failed: {source}", path.display())]
    Delete {
        /// The path that was deleted.
        path: PathBuf,
        /// The host failure.
        #[source]
        source: PlatformError,
    },

    /// A canonical path does not fit the engine's path buffer.
    #[error("path of {len} bytes exceeds the {max}-byte limit")]
    PathTooLong {
        /// Length of the canonical path in bytes.
        len: usize,
        /// The configured limit.
        max: usize,
    },

    /// A file handle that is not (or no longer) open.
    #[error("unknown file handle {0}")]
    UnknownFile(FileId),

    /// A file-control opcode this layer does not implement.
    #[error("unsupported file control op {op}")]
    UnknownFileControl {
        /// The raw opcode.
        op: i32,
    },

    /// A mutex call that breaks the provider contract.
    #[error("mutex misuse: {reason}")]
    MutexMisuse {
        /// What was wrong with the call.
        reason: &'static str,
    },

    /// A provider was used before `init` (or after `end`).
    #[error("{what} is not initialised")]
    NotInitialized {
        /// The provider that was used.
        what: &'static str,
    },

    /// Providers were registered twice without unregistering.
    #[error("providers are already registered")]
    AlreadyRegistered,

    /// The engine rejected a configuration or lifecycle call.
    #[error("engine returned {code:?}: {message}")]
    Engine {
        /// The engine's result code.
        code: ResultCode,
        /// Description of the failure.
        message: String,
    },
}

impl OsError {
    /// Returns the engine result code for this error.
    #[must_use]
    pub fn code(&self) -> ResultCode {
        match self {
            Self::AlreadyExists { .. }
            | Self::Missing { .. }
            | Self::ReadOnlyConflict { .. }
            | Self::OpenFailed { .. } => ResultCode::IoErr,
            Self::Seek { .. } => ResultCode::IoErrSeek,
            Self::Read { .. } => ResultCode::IoErrRead,
            Self::ShortRead { .. } => ResultCode::IoErrShortRead,
            Self::Write { .. } => ResultCode::IoErrWrite,
            Self::Truncate { .. } => ResultCode::IoErrTruncate,
            Self::Fsync { .. } => ResultCode::IoErrFsync,
            Self::DirFsync { .. } => ResultCode::IoErrDirFsync,
            Self::Fstat { .. } => ResultCode::IoErrFstat,
            Self::LockOrder { .. } => ResultCode::IoErrLock,
            Self::UnlockOrder { .. } => ResultCode::IoErrUnlock,
            Self::Delete { .. } => ResultCode::IoErrDelete,
            Self::PathTooLong { .. } => ResultCode::CantOpen,
            Self::UnknownFileControl { .. } => ResultCode::NotFound,
            Self::UnknownFile(_)
            | Self::MutexMisuse { .. }
            | Self::NotInitialized { .. }
            | Self::AlreadyRegistered => ResultCode::Misuse,
            Self::Engine { code, .. } => *code,
        }
    }

    /// Builds an `Engine` error.
    pub fn engine(code: ResultCode, message: impl Into<String>) -> Self {
        Self::Engine {
            code,
            message: message.into(),
        }
    }
}

/// Returns the raw engine status for a provider result.
#[must_use]
pub fn status<T>(result: &OsResult<T>) -> i32 {
    match result {
        Ok(_) => ResultCode::Ok.raw(),
        Err(e) => e.code().raw(),
    }
}

// Thread-local storage for the last host failure message
thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Records `message` as this thread's last host failure.
pub fn set_last_error(message: impl Into<String>) {
    let msg = message.into();
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some(msg);
    });
}

/// Returns this thread's last recorded host failure, if any.
#[must_use]
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|e| e.borrow().clone())
}

/// Clears this thread's last recorded host failure.
pub fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Records the message of a failed result before handing it back.
pub(crate) fn noted<T>(result: OsResult<T>) -> OsResult<T> {
    if let Err(e) = &result {
        set_last_error(e.to_string());
    }
    result
}
