//! # hostvfs platform
//!
//! The host platform abstraction the hostvfs providers adapt to.
//!
//! A storage engine's OS layer normally talks to the operating system
//! directly. Here it talks to a *host platform* instead: a filesystem with
//! positional file handles and a heap with its own bookkeeping. Neither
//! knows anything about the engine's files, lock levels or error codes.
//!
//! ## Design Principles
//!
//! - Handles are opaque byte stores (seek, read, write, flush, truncate)
//! - No byte-range locking: write access is the only exclusivity offered
//! - Must be `Send + Sync` so providers can be shared across threads
//! - Error codes are the provider layer's concern, not the platform's
//!
//! ## Available Platforms
//!
//! - [`NativePlatform`] - The operating system's filesystem
//! - [`InMemoryPlatform`] - For testing, with read-only files and fault injection
//! - [`SystemHeap`] - `std::alloc` with optional size reporting
//!
//! ## Example
//!
//! ```rust
//! use hostvfs_platform::{InMemoryPlatform, PlatformFile, PlatformFileHandle};
//! use std::path::Path;
//!
//! let platform = InMemoryPlatform::new();
//! let mut handle = platform.open_write(Path::new("db"), true).unwrap();
//! handle.write(b"hello world").unwrap();
//! assert_eq!(handle.size().unwrap(), 11);
//! ```

#![warn(missing_docs)]

mod error;
mod heap;
mod memory;
mod native;
mod platform;

pub use error::{PlatformError, PlatformResult};
pub use heap::{PlatformHeap, SystemHeap, DEFAULT_ALIGNMENT};
pub use memory::{Fault, InMemoryPlatform, MemoryFileHandle};
pub use native::{NativeFileHandle, NativePlatform};
pub use platform::{normalize_lexically, FileStat, PlatformFile, PlatformFileHandle};
