//! Provider configuration.

use std::path::PathBuf;

/// Name the file provider registers under unless configured otherwise.
pub const DEFAULT_VFS_NAME: &str = "host-fs";

/// Logical sector size reported for every file.
pub const DEFAULT_SECTOR_SIZE: u32 = 4096;

/// Configuration for the file and filesystem provider.
#[derive(Debug, Clone)]
pub struct VfsConfig {
    /// Name the VFS is registered under.
    pub name: String,

    /// Directory that holds synthesized temporary files.
    pub scratch_dir: PathBuf,

    /// Sector size reported to the engine.
    pub sector_size: u32,

    /// Longest canonical path, in bytes, the engine accepts.
    pub max_pathname: usize,

    /// Whether registration makes this VFS the engine's default.
    pub make_default: bool,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_VFS_NAME.to_string(),
            scratch_dir: std::env::temp_dir().join("hostvfs"),
            sector_size: DEFAULT_SECTOR_SIZE,
            max_pathname: 1024,
            make_default: false,
        }
    }
}

impl VfsConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the registration name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the scratch directory for temporary files.
    #[must_use]
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Sets the reported sector size.
    #[must_use]
    pub const fn sector_size(mut self, size: u32) -> Self {
        self.sector_size = size;
        self
    }

    /// Sets the maximum canonical path length.
    #[must_use]
    pub const fn max_pathname(mut self, max: usize) -> Self {
        self.max_pathname = max;
        self
    }

    /// Sets whether the VFS becomes the engine default.
    #[must_use]
    pub const fn make_default(mut self, value: bool) -> Self {
        self.make_default = value;
        self
    }
}

/// How the allocator provider picks its strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocatorStrategy {
    /// Probe the host heap once and pick whichever strategy fits.
    #[default]
    Probe,
    /// Forward straight to the host heap (requires size reporting).
    Passthrough,
    /// Store each block's size in a header ahead of the returned pointer.
    HeaderPrefixed,
}

/// Configuration for [`ProviderRegistration`](crate::ProviderRegistration).
#[derive(Debug, Clone, Default)]
pub struct RegistrationConfig {
    /// File provider settings.
    pub vfs: VfsConfig,

    /// Allocator strategy selection.
    pub allocator: AllocatorStrategy,

    /// Whether mutexes record their owner for `held`/`notheld`.
    ///
    /// Only takes effect when built with the `mutex-debug` feature.
    pub mutex_debug: bool,
}

impl RegistrationConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the file provider configuration.
    #[must_use]
    pub fn vfs(mut self, vfs: VfsConfig) -> Self {
        self.vfs = vfs;
        self
    }

    /// Sets the allocator strategy.
    #[must_use]
    pub const fn allocator(mut self, strategy: AllocatorStrategy) -> Self {
        self.allocator = strategy;
        self
    }

    /// Sets whether mutexes track their owner.
    #[must_use]
    pub const fn mutex_debug(mut self, value: bool) -> Self {
        self.mutex_debug = value;
        self
    }
}
