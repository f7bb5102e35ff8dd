//! # hostvfs core
//!
//! An OS adaptation layer for an embeddable storage engine.
//!
//! The engine calls its OS layer through four tables. This crate supplies
//! each of them over a host platform ([`hostvfs_platform`]) instead of the
//! operating system:
//!
//! - [`MutexMethods`] - fast, recursive and static mutexes
//! - [`MemMethods`] - allocation, with a header-prefixed fallback for heaps
//!   that cannot report block sizes
//! - [`Vfs`] / [`IoMethods`] - files, lock levels and filesystem calls
//! - [`HostServices`] - randomness, sleep, clock and last-error text
//!
//! [`ProviderRegistration`] installs them into an [`Engine`] in the order
//! the engine requires.
//!
//! ## Error codes
//!
//! Every provider returns [`OsResult`]. [`OsError::code`] gives the exact
//! engine status; distinct host failures keep distinct extended codes.
//!
//! ## Example
//!
//! ```rust
//! use hostvfs_core::{HostVfs, IoMethods, LockLevel, OpenFlags, Vfs, VfsConfig};
//! use hostvfs_platform::InMemoryPlatform;
//! use std::path::Path;
//!
//! let vfs = HostVfs::new(InMemoryPlatform::new(), VfsConfig::default());
//! let file = vfs
//!     .open(Some(Path::new("/app.db")), OpenFlags::READWRITE | OpenFlags::CREATE)
//!     .unwrap();
//!
//! vfs.lock(file.id, LockLevel::Shared).unwrap();
//! assert!(vfs.lock(file.id, LockLevel::Shared).is_err());
//! vfs.unlock(file.id, LockLevel::None).unwrap();
//! vfs.close(file.id).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codes;
mod config;
mod error;
mod flags;
mod lock;
#[allow(unsafe_code)]
mod malloc;
mod mutex;
mod os;
mod register;
mod vfs;

pub use codes::ResultCode;
pub use config::{
    AllocatorStrategy, RegistrationConfig, VfsConfig, DEFAULT_SECTOR_SIZE, DEFAULT_VFS_NAME,
};
pub use error::{clear_last_error, last_error, set_last_error, status, OsError, OsResult};
pub use flags::{AccessMode, DeviceCharacteristics, OpenFlags, SyncFlags};
pub use lock::LockLevel;
pub use malloc::{
    allocator_for, probe_reports_size, resolve_strategy, HeaderAllocator, MemMethods,
    PassthroughAllocator, HEADER_SIZE,
};
pub use mutex::{EngineMutex, MutexKind, MutexMethods, MutexProvider, MutexRef, STATIC_MUTEX_COUNT};
pub use os::{julian_day, julian_day_ms, HostServices, UNIX_EPOCH_JULIAN_DAY, UNIX_EPOCH_JULIAN_MS};
pub use register::{Engine, ProviderRegistration};
pub use vfs::{
    FileId, HostVfs, IoMethods, OpenedFile, ReadOnlyRegistry, Vfs, FCNTL_LOCKSTATE, VFS_VERSION,
};
