//! VFS fixtures.
//!
//! Provides VFS instances over a temporary directory or an in-memory
//! platform, cleaned up when dropped.

use hostvfs_core::{HostVfs, OpenFlags, VfsConfig};
use hostvfs_platform::{InMemoryPlatform, NativePlatform};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Flags the engine uses to open or create a database file.
pub const RW_CREATE: OpenFlags = OpenFlags::READWRITE.union(OpenFlags::CREATE);

/// Scratch directory used by memory fixtures.
pub const MEMORY_SCRATCH_DIR: &str = "/scratch";

/// A native VFS rooted in a temporary directory.
pub struct TempVfs {
    /// The VFS instance.
    pub vfs: HostVfs<NativePlatform>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TempVfs {
    /// Creates a VFS whose scratch directory lives in a fresh temp dir.
    pub fn new() -> Self {
        Self::with_config(VfsConfig::default())
    }

    /// Creates a VFS from `config`, overriding its scratch directory.
    pub fn with_config(config: VfsConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = config.scratch_dir(temp_dir.path().join("scratch"));
        Self {
            vfs: HostVfs::native(config),
            temp_dir,
        }
    }

    /// Returns the root of the temporary directory.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns `name` resolved inside the temporary directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}

impl Default for TempVfs {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempVfs {
    type Target = HostVfs<NativePlatform>;

    fn deref(&self) -> &Self::Target {
        &self.vfs
    }
}

/// Creates an in-memory VFS with its scratch directory at
/// [`MEMORY_SCRATCH_DIR`].
pub fn memory_vfs() -> HostVfs<InMemoryPlatform> {
    HostVfs::new(
        InMemoryPlatform::new(),
        VfsConfig::default().scratch_dir(MEMORY_SCRATCH_DIR),
    )
}

/// Creates an in-memory VFS pre-populated with read-only files.
pub fn memory_vfs_with_read_only(paths: &[&str]) -> HostVfs<InMemoryPlatform> {
    let vfs = memory_vfs();
    for path in paths {
        vfs.platform()
            .insert_file(Path::new(path), Vec::new(), true);
    }
    vfs
}

/// Runs a test with an in-memory VFS.
pub fn with_memory_vfs<F, R>(f: F) -> R
where
    F: FnOnce(&HostVfs<InMemoryPlatform>) -> R,
{
    let vfs = memory_vfs();
    f(&vfs)
}

/// Runs a test with a native VFS and its temporary root directory.
pub fn with_temp_vfs<F, R>(f: F) -> R
where
    F: FnOnce(&HostVfs<NativePlatform>, &Path) -> R,
{
    let temp = TempVfs::new();
    f(&temp.vfs, temp.root())
}
