//! A recording stand-in for the storage engine.
//!
//! [`MockEngine`] enforces the lifecycle rules the real engine does:
//! configuration is only accepted before `initialize`, and the mutex and
//! allocator tables are initialised and torn down with the engine.

use hostvfs_core::{Engine, MemMethods, MutexKind, MutexMethods, OsError, OsResult, ResultCode, Vfs};
use std::collections::HashMap;
use std::sync::Arc;

/// One call made into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// `config_malloc`.
    ConfigMalloc,
    /// `config_mutex`.
    ConfigMutex,
    /// `initialize`.
    Initialize,
    /// `register_vfs`.
    RegisterVfs {
        /// Name of the VFS.
        name: String,
        /// Whether it became the default.
        make_default: bool,
    },
    /// `unregister_vfs`.
    UnregisterVfs {
        /// Name of the VFS.
        name: String,
    },
    /// `shutdown`.
    Shutdown,
}

/// An [`Engine`] that records every call.
#[derive(Debug, Default)]
pub struct MockEngine {
    calls: Vec<EngineCall>,
    allocator: Option<Arc<dyn MemMethods>>,
    mutexes: Option<Arc<dyn MutexMethods>>,
    vfs: HashMap<String, Arc<dyn Vfs>>,
    default_vfs: Option<String>,
    initialized: bool,
    refuse_vfs: bool,
}

impl MockEngine {
    /// Creates an uninitialised engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine that rejects every `register_vfs`.
    pub fn refusing_vfs() -> Self {
        Self {
            refuse_vfs: true,
            ..Self::default()
        }
    }

    /// Returns the calls made so far, oldest first.
    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Returns true between `initialize` and `shutdown`.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Looks up a registered VFS by name.
    pub fn find_vfs(&self, name: &str) -> Option<Arc<dyn Vfs>> {
        self.vfs.get(name).cloned()
    }

    /// Returns the name of the default VFS, if one was registered as such.
    pub fn default_vfs(&self) -> Option<&str> {
        self.default_vfs.as_deref()
    }

    fn ensure_not_initialized(&self, what: &str) -> OsResult<()> {
        if self.initialized {
            return Err(OsError::engine(
                ResultCode::Misuse,
                format!("{what} after initialize"),
            ));
        }
        Ok(())
    }
}

impl Engine for MockEngine {
    fn config_malloc(&mut self, methods: Arc<dyn MemMethods>) -> OsResult<()> {
        self.calls.push(EngineCall::ConfigMalloc);
        self.ensure_not_initialized("config_malloc")?;
        self.allocator = Some(methods);
        Ok(())
    }

    fn config_mutex(&mut self, methods: Arc<dyn MutexMethods>) -> OsResult<()> {
        self.calls.push(EngineCall::ConfigMutex);
        self.ensure_not_initialized("config_mutex")?;
        self.mutexes = Some(methods);
        Ok(())
    }

    fn initialize(&mut self) -> OsResult<()> {
        self.calls.push(EngineCall::Initialize);
        if self.initialized {
            return Ok(());
        }
        if let Some(allocator) = &self.allocator {
            allocator.init()?;
        }
        if let Some(mutexes) = &self.mutexes {
            mutexes.init()?;
            // First-time setup takes the main static mutex
            let main = mutexes.alloc(MutexKind::StaticMain)?;
            mutexes.enter(&main);
            mutexes.leave(&main);
        }
        self.initialized = true;
        Ok(())
    }

    fn register_vfs(&mut self, vfs: Arc<dyn Vfs>, make_default: bool) -> OsResult<()> {
        let name = vfs.name().to_string();
        self.calls.push(EngineCall::RegisterVfs {
            name: name.clone(),
            make_default,
        });
        if self.refuse_vfs {
            return Err(OsError::engine(ResultCode::Error, "vfs refused"));
        }
        if make_default {
            self.default_vfs = Some(name.clone());
        }
        self.vfs.insert(name, vfs);
        Ok(())
    }

    fn unregister_vfs(&mut self, name: &str) -> OsResult<()> {
        self.calls.push(EngineCall::UnregisterVfs {
            name: name.to_string(),
        });
        if self.vfs.remove(name).is_none() {
            return Err(OsError::engine(
                ResultCode::Error,
                format!("no vfs named {name}"),
            ));
        }
        if self.default_vfs.as_deref() == Some(name) {
            self.default_vfs = None;
        }
        Ok(())
    }

    fn shutdown(&mut self) -> OsResult<()> {
        self.calls.push(EngineCall::Shutdown);
        if !self.initialized {
            return Ok(());
        }
        if let Some(mutexes) = &self.mutexes {
            mutexes.end()?;
        }
        if let Some(allocator) = &self.allocator {
            allocator.shutdown();
        }
        self.initialized = false;
        Ok(())
    }
}
