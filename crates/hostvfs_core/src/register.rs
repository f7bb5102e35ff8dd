//! Installing the providers into an engine.
//!
//! The engine may allocate or take a lock during its own first-time setup,
//! so the allocator and mutex tables are handed over as configuration
//! before `initialize`. The VFS is registered afterwards, by name.

use crate::config::RegistrationConfig;
use crate::error::{OsError, OsResult};
use crate::malloc::{allocator_for, MemMethods};
use crate::mutex::{MutexMethods, MutexProvider};
use crate::vfs::{HostVfs, ReadOnlyRegistry, Vfs};
use hostvfs_platform::{NativePlatform, PlatformFile, PlatformHeap, SystemHeap};
use std::sync::Arc;

/// The storage engine, as seen by the registration step.
///
/// Implementations forward to the engine's configuration and lifecycle
/// entry points and translate its status codes into [`OsError::Engine`].
pub trait Engine {
    /// Installs the allocator table. Must precede `initialize`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the configuration.
    fn config_malloc(&mut self, methods: Arc<dyn MemMethods>) -> OsResult<()>;

    /// Installs the mutex table. Must precede `initialize`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the configuration.
    fn config_mutex(&mut self, methods: Arc<dyn MutexMethods>) -> OsResult<()>;

    /// Initialises the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if initialisation fails.
    fn initialize(&mut self) -> OsResult<()>;

    /// Makes `vfs` selectable by name, and the default if `make_default`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the VFS.
    fn register_vfs(&mut self, vfs: Arc<dyn Vfs>, make_default: bool) -> OsResult<()>;

    /// Removes the VFS registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if no such VFS is registered.
    fn unregister_vfs(&mut self, name: &str) -> OsResult<()>;

    /// Shuts the engine down.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is still in use.
    fn shutdown(&mut self) -> OsResult<()>;
}

/// The installed set of providers.
///
/// Owns the allocator, mutex and file providers along with the read-only
/// registry they share across VFS instances. Build one at startup, call
/// [`register_all`](Self::register_all) before anything else touches the
/// engine, and [`unregister_all`](Self::unregister_all) at shutdown.
#[derive(Debug)]
pub struct ProviderRegistration {
    allocator: Arc<dyn MemMethods>,
    mutexes: Arc<dyn MutexMethods>,
    vfs: Arc<dyn Vfs>,
    registry: Arc<ReadOnlyRegistry>,
    make_default: bool,
    installed: bool,
}

impl ProviderRegistration {
    /// Creates providers over the operating system's filesystem and heap.
    #[must_use]
    pub fn new(config: RegistrationConfig) -> Self {
        Self::with_platform(NativePlatform::new(), Arc::new(SystemHeap::new()), config)
    }

    /// Creates providers over a custom platform and heap.
    pub fn with_platform<P>(platform: P, heap: Arc<dyn PlatformHeap>, config: RegistrationConfig) -> Self
    where
        P: PlatformFile + 'static,
    {
        let registry = Arc::new(ReadOnlyRegistry::new());
        let make_default = config.vfs.make_default;
        let mutexes: Arc<dyn MutexMethods> = if config.mutex_debug {
            Arc::new(MutexProvider::with_owner_tracking())
        } else {
            Arc::new(MutexProvider::new())
        };

        Self {
            allocator: allocator_for(heap, config.allocator),
            mutexes,
            vfs: Arc::new(HostVfs::with_registry(
                platform,
                config.vfs,
                Arc::clone(&registry),
            )),
            registry,
            make_default,
            installed: false,
        }
    }

    /// Returns the allocator table.
    pub fn allocator(&self) -> &Arc<dyn MemMethods> {
        &self.allocator
    }

    /// Returns the mutex table.
    pub fn mutexes(&self) -> &Arc<dyn MutexMethods> {
        &self.mutexes
    }

    /// Returns the VFS.
    pub fn vfs(&self) -> &Arc<dyn Vfs> {
        &self.vfs
    }

    /// Returns the registry of files open read-only.
    pub fn registry(&self) -> &Arc<ReadOnlyRegistry> {
        &self.registry
    }

    /// Returns true between `register_all` and `unregister_all`.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Installs every provider and initialises the engine.
    ///
    /// Order: allocator, mutexes, `initialize`, VFS. If the VFS is refused
    /// the engine is shut down again.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRegistered` if called twice, or the first engine
    /// failure.
    pub fn register_all<E: Engine + ?Sized>(&mut self, engine: &mut E) -> OsResult<()> {
        if self.installed {
            return Err(OsError::AlreadyRegistered);
        }

        engine.config_malloc(Arc::clone(&self.allocator))?;
        engine.config_mutex(Arc::clone(&self.mutexes))?;
        engine.initialize()?;

        if let Err(e) = engine.register_vfs(Arc::clone(&self.vfs), self.make_default) {
            if let Err(shutdown) = engine.shutdown() {
                tracing::warn!(error = %shutdown, "shutdown after failed VFS registration failed");
            }
            return Err(e);
        }

        self.installed = true;
        tracing::info!(
            vfs = self.vfs.name(),
            make_default = self.make_default,
            "providers registered"
        );
        Ok(())
    }

    /// Unregisters the VFS and shuts the engine down.
    ///
    /// Static mutexes are released by the engine's own shutdown calling
    /// back into the mutex provider. Does nothing if not installed.
    ///
    /// # Errors
    ///
    /// Returns the first engine failure; shutdown is attempted regardless.
    pub fn unregister_all<E: Engine + ?Sized>(&mut self, engine: &mut E) -> OsResult<()> {
        if !self.installed {
            return Ok(());
        }

        let unregistered = engine.unregister_vfs(self.vfs.name());
        let shut_down = engine.shutdown();
        self.installed = false;
        tracing::info!(vfs = self.vfs.name(), "providers unregistered");
        unregistered.and(shut_down)
    }
}
