//! # hostvfs testkit
//!
//! Test utilities for the hostvfs providers.
//!
//! This crate provides:
//! - VFS fixtures over a temporary directory or an in-memory platform
//! - A recording mock engine for registration tests
//! - Property-based test generators using proptest
//! - Concurrency stress helpers for the read-only registry and mutexes
//!
//! ## Usage
//!
//! ```rust
//! use hostvfs_testkit::prelude::*;
//! use hostvfs_core::{IoMethods, Vfs};
//! use std::path::Path;
//!
//! with_memory_vfs(|vfs| {
//!     let file = vfs.open(Some(Path::new("/db")), RW_CREATE).unwrap();
//!     vfs.write(file.id, b"page", 0).unwrap();
//!     vfs.close(file.id).unwrap();
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::engine::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use engine::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
