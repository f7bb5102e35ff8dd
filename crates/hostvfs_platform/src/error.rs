//! Error types for host platform operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for host platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors that can occur in the host platform layer.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The named file or directory does not exist.
    #[error("not found: {}", path.display())]
    NotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The target cannot be opened or modified for writing.
    #[error("read-only: {}", path.display())]
    ReadOnly {
        /// The path that refused write access.
        path: PathBuf,
    },
}

impl PlatformError {
    /// Builds a `NotFound` error for the given path.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Builds a `ReadOnly` error for the given path.
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self::ReadOnly { path: path.into() }
    }
}
