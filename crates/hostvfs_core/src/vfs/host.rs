//! VFS over a host platform.

use super::{FileId, IoMethods, OpenedFile, ReadOnlyRegistry, Vfs, FCNTL_LOCKSTATE};
use crate::config::VfsConfig;
use crate::error::{noted, OsError, OsResult};
use crate::flags::{AccessMode, DeviceCharacteristics, OpenFlags, SyncFlags};
use crate::lock::LockLevel;
use crate::os::HostServices;
use hostvfs_platform::{NativePlatform, PlatformFile, PlatformFileHandle};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Prefix of synthesized temporary file names.
const TEMP_PREFIX: &str = "hostvfs-";

/// Slot behind one [`FileId`]; `None` once the file is closed.
type FileSlot = Arc<Mutex<Option<OpenFile>>>;

/// State behind one [`FileId`].
#[derive(Debug)]
struct OpenFile {
    handle: Box<dyn PlatformFileHandle>,
    path: PathBuf,
    /// Registry key, present only if this handle claimed a read-only entry.
    claimed: Option<PathBuf>,
    read_only: bool,
    delete_on_close: bool,
    lock: LockLevel,
}

/// A [`Vfs`] backed by a [`PlatformFile`].
///
/// Every file is opened for writing when the host allows it. Files the host
/// only offers read-only are opened through the [`ReadOnlyRegistry`], which
/// admits one handle per canonical path.
///
/// # Thread Safety
///
/// The handle table is behind a `RwLock` that is only held long enough to
/// look up, insert or remove an entry. Each open file has its own mutex,
/// taken after the table lock is released, so host I/O on one file never
/// blocks calls on another. Close empties the slot under the file's mutex;
/// a call that races it sees `UnknownFile`.
///
/// # Example
///
/// ```rust
/// use hostvfs_core::{HostVfs, IoMethods, OpenFlags, Vfs, VfsConfig};
/// use hostvfs_platform::InMemoryPlatform;
/// use std::path::Path;
///
/// let vfs = HostVfs::new(InMemoryPlatform::new(), VfsConfig::default());
/// let file = vfs
///     .open(Some(Path::new("/db1")), OpenFlags::CREATE | OpenFlags::READWRITE)
///     .unwrap();
/// vfs.write(file.id, b"ABCDE", 0).unwrap();
///
/// let mut buf = [0u8; 5];
/// vfs.read(file.id, &mut buf, 0).unwrap();
/// assert_eq!(&buf, b"ABCDE");
/// vfs.close(file.id).unwrap();
/// ```
#[derive(Debug)]
pub struct HostVfs<P: PlatformFile = NativePlatform> {
    platform: P,
    config: VfsConfig,
    registry: Arc<ReadOnlyRegistry>,
    files: RwLock<HashMap<FileId, FileSlot>>,
    next_id: AtomicU64,
    services: HostServices,
}

impl HostVfs<NativePlatform> {
    /// Creates a VFS over the operating system's filesystem.
    #[must_use]
    pub fn native(config: VfsConfig) -> Self {
        Self::new(NativePlatform::new(), config)
    }
}

impl<P: PlatformFile> HostVfs<P> {
    /// Creates a VFS with its own read-only registry.
    pub fn new(platform: P, config: VfsConfig) -> Self {
        Self::with_registry(platform, config, Arc::new(ReadOnlyRegistry::new()))
    }

    /// Creates a VFS sharing `registry` with other VFS instances.
    pub fn with_registry(platform: P, config: VfsConfig, registry: Arc<ReadOnlyRegistry>) -> Self {
        Self {
            platform,
            config,
            registry,
            files: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            services: HostServices::new(),
        }
    }

    /// Returns the host platform.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Returns the configuration.
    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// Returns the read-only registry.
    pub fn registry(&self) -> &Arc<ReadOnlyRegistry> {
        &self.registry
    }

    /// Returns the number of open files.
    #[must_use]
    pub fn open_file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Returns the path `file` was opened with.
    ///
    /// # Errors
    ///
    /// Returns `UnknownFile` if `file` is not open.
    pub fn path_of(&self, file: FileId) -> OsResult<PathBuf> {
        self.with_file(file, |open| Ok(open.path.clone()))
    }

    /// Returns the lock level recorded for `file`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownFile` if `file` is not open.
    pub fn lock_level(&self, file: FileId) -> OsResult<LockLevel> {
        self.with_file(file, |open| Ok(open.lock))
    }

    /// Returns true if `file` was opened read-only.
    ///
    /// # Errors
    ///
    /// Returns `UnknownFile` if `file` is not open.
    pub fn is_read_only(&self, file: FileId) -> OsResult<bool> {
        self.with_file(file, |open| Ok(open.read_only))
    }

    fn with_file<T>(&self, file: FileId, f: impl FnOnce(&mut OpenFile) -> OsResult<T>) -> OsResult<T> {
        let slot = self
            .files
            .read()
            .get(&file)
            .cloned()
            .ok_or(OsError::UnknownFile(file))?;
        let mut slot = slot.lock();
        let open = slot.as_mut().ok_or(OsError::UnknownFile(file))?;
        f(open)
    }

    fn temp_path(&self) -> OsResult<PathBuf> {
        let dir = &self.config.scratch_dir;
        if !self.platform.directory_exists(dir) {
            self.platform
                .create_directory_tree(dir)
                .map_err(|source| OsError::OpenFailed {
                    path: dir.clone(),
                    source: Some(source),
                })?;
        }
        Ok(dir.join(format!("{TEMP_PREFIX}{}", Uuid::new_v4().simple())))
    }

    fn open_file(&self, path: Option<&Path>, flags: OpenFlags) -> OsResult<OpenedFile> {
        let (path, temporary) = match path {
            Some(path) => (path.to_path_buf(), false),
            None => (self.temp_path()?, true),
        };
        tracing::debug!(path = %path.display(), ?flags, "open");

        let exists = self.platform.file_exists(&path);
        if exists && flags.contains(OpenFlags::EXCLUSIVE) {
            return Err(OsError::AlreadyExists { path });
        }
        if !exists && !flags.contains(OpenFlags::CREATE) {
            return Err(OsError::Missing { path });
        }

        let mut claimed = None;
        let read_only = self.platform.is_read_only(&path);
        let handle = if !read_only {
            // The host has no shared locks, so every writable file gets a
            // write handle whatever mode was asked for
            self.platform
                .open_write(&path, true)
                .map_err(|source| OsError::OpenFailed {
                    path: path.clone(),
                    source: Some(source),
                })?
        } else if flags.contains(OpenFlags::READONLY) {
            let canonical = self.platform.filename_on_disk(&path);
            if !self.registry.try_insert(&canonical) {
                return Err(OsError::ReadOnlyConflict { path: canonical });
            }
            match self.platform.open_read(&path) {
                Ok(handle) => {
                    claimed = Some(canonical);
                    handle
                }
                Err(source) => {
                    self.registry.remove(&canonical);
                    return Err(OsError::OpenFailed {
                        path,
                        source: Some(source),
                    });
                }
            }
        } else {
            return Err(OsError::OpenFailed { path, source: None });
        };

        let id = FileId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let open = OpenFile {
            handle,
            path,
            claimed,
            read_only,
            delete_on_close: temporary || flags.contains(OpenFlags::DELETEONCLOSE),
            lock: LockLevel::None,
        };
        self.files
            .write()
            .insert(id, Arc::new(Mutex::new(Some(open))));

        let flags = if read_only { OpenFlags::READONLY } else { flags };
        Ok(OpenedFile { id, flags })
    }

    fn close_file(&self, file: FileId) -> OsResult<()> {
        let slot = self
            .files
            .write()
            .remove(&file)
            .ok_or(OsError::UnknownFile(file))?;
        // Waits out any call still running on this file
        let open = slot.lock().take().ok_or(OsError::UnknownFile(file))?;
        let OpenFile {
            mut handle,
            path,
            claimed,
            read_only,
            delete_on_close,
            ..
        } = open;
        tracing::debug!(%file, path = %path.display(), "close");

        if !read_only && !delete_on_close {
            if let Err(e) = handle.flush(false) {
                tracing::warn!(%file, error = %e, "flush before close failed");
            }
        }
        if let Some(canonical) = claimed {
            self.registry.remove(&canonical);
        }
        drop(handle);

        if delete_on_close {
            if let Err(e) = self.platform.delete_file(&path) {
                tracing::warn!(%file, path = %path.display(), error = %e, "delete on close failed");
            }
        }
        Ok(())
    }

    fn read_at(open: &mut OpenFile, buf: &mut [u8], offset: u64) -> OsResult<()> {
        buf.fill(0);
        open.handle
            .seek(offset)
            .map_err(|source| OsError::Seek { offset, source })?;

        let read = match open.handle.read(buf) {
            Ok(read) if read == buf.len() => return Ok(()),
            Ok(read) => read,
            Err(source) => {
                buf.fill(0);
                return Err(OsError::Read {
                    offset,
                    len: buf.len(),
                    source: Some(source),
                });
            }
        };
        buf[read..].fill(0);

        let at_end = match (open.handle.tell(), open.handle.size()) {
            (Ok(position), Ok(size)) => position >= size,
            _ => false,
        };
        if at_end {
            Err(OsError::ShortRead {
                offset,
                requested: buf.len(),
                read,
            })
        } else {
            Err(OsError::Read {
                offset,
                len: buf.len(),
                source: None,
            })
        }
    }

    fn write_at(open: &mut OpenFile, data: &[u8], offset: u64) -> OsResult<()> {
        open.handle
            .seek(offset)
            .map_err(|source| OsError::Seek { offset, source })?;
        open.handle.write(data).map_err(|source| OsError::Write {
            offset,
            len: data.len(),
            source,
        })
    }

    fn access_path(&self, path: &Path, mode: AccessMode) -> OsResult<bool> {
        let Some(stat) = self.platform.stat(path) else {
            return Ok(false);
        };
        Ok(match mode {
            AccessMode::ReadWrite => !stat.is_read_only,
            AccessMode::Exists | AccessMode::Read => true,
        })
    }

    fn delete_path(&self, path: &Path, sync_dir: bool) -> OsResult<()> {
        tracing::debug!(path = %path.display(), sync_dir, "delete");
        let removed = if self.platform.directory_exists(path) {
            self.platform.delete_directory_recursively(path)
        } else if self.platform.file_exists(path) {
            self.platform.delete_file(path)
        } else {
            return Ok(());
        };
        removed.map_err(|source| OsError::Delete {
            path: path.to_path_buf(),
            source,
        })?;

        if sync_dir {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                self.platform
                    .sync_directory(parent)
                    .map_err(|source| OsError::DirFsync {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }
        Ok(())
    }
}

impl<P: PlatformFile> IoMethods for HostVfs<P> {
    fn close(&self, file: FileId) -> OsResult<()> {
        noted(self.close_file(file))
    }

    fn read(&self, file: FileId, buf: &mut [u8], offset: u64) -> OsResult<()> {
        noted(self.with_file(file, |open| Self::read_at(open, buf, offset)))
    }

    fn write(&self, file: FileId, data: &[u8], offset: u64) -> OsResult<()> {
        noted(self.with_file(file, |open| Self::write_at(open, data, offset)))
    }

    fn truncate(&self, file: FileId, size: u64) -> OsResult<()> {
        noted(self.with_file(file, |open| {
            open.handle
                .truncate(size)
                .map_err(|source| OsError::Truncate { size, source })
        }))
    }

    fn sync(&self, file: FileId, flags: SyncFlags) -> OsResult<()> {
        noted(self.with_file(file, |open| {
            open.handle
                .flush(flags.is_full())
                .map_err(|source| OsError::Fsync { source })
        }))
    }

    fn file_size(&self, file: FileId) -> OsResult<u64> {
        noted(self.with_file(file, |open| {
            open.handle.size().map_err(|source| OsError::Fstat { source })
        }))
    }

    fn lock(&self, file: FileId, level: LockLevel) -> OsResult<()> {
        noted(self.with_file(file, |open| {
            if level <= open.lock {
                return Err(OsError::LockOrder {
                    held: open.lock,
                    requested: level,
                });
            }
            tracing::trace!(%file, from = %open.lock, to = %level, "lock");
            open.lock = level;
            Ok(())
        }))
    }

    fn unlock(&self, file: FileId, level: LockLevel) -> OsResult<()> {
        noted(self.with_file(file, |open| {
            if level >= open.lock {
                return Err(OsError::UnlockOrder {
                    held: open.lock,
                    requested: level,
                });
            }
            tracing::trace!(%file, from = %open.lock, to = %level, "unlock");
            open.lock = level;
            Ok(())
        }))
    }

    fn check_reserved_lock(&self, file: FileId) -> OsResult<bool> {
        noted(self.with_file(file, |open| Ok(open.lock > LockLevel::None)))
    }

    fn file_control(&self, file: FileId, op: i32) -> OsResult<i32> {
        noted(self.with_file(file, |open| match op {
            FCNTL_LOCKSTATE => Ok(i32::from(open.lock)),
            _ => Err(OsError::UnknownFileControl { op }),
        }))
    }

    fn sector_size(&self, _file: FileId) -> u32 {
        self.config.sector_size
    }

    fn device_characteristics(&self, _file: FileId) -> DeviceCharacteristics {
        DeviceCharacteristics::UNDELETABLE_WHEN_OPEN
    }
}

impl<P: PlatformFile> Vfs for HostVfs<P> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn max_pathname(&self) -> usize {
        self.config.max_pathname
    }

    fn open(&self, path: Option<&Path>, flags: OpenFlags) -> OsResult<OpenedFile> {
        noted(self.open_file(path, flags))
    }

    fn delete(&self, path: &Path, sync_dir: bool) -> OsResult<()> {
        noted(self.delete_path(path, sync_dir))
    }

    fn access(&self, path: &Path, mode: AccessMode) -> OsResult<bool> {
        noted(self.access_path(path, mode))
    }

    fn full_pathname(&self, path: &Path) -> OsResult<PathBuf> {
        let full = self.platform.convert_to_absolute(path);
        let len = full.as_os_str().len();
        if len > self.config.max_pathname {
            return noted(Err(OsError::PathTooLong {
                len,
                max: self.config.max_pathname,
            }));
        }
        Ok(full)
    }

    fn randomness(&self, buf: &mut [u8]) -> usize {
        self.services.randomness(buf)
    }

    fn sleep(&self, micros: u64) -> u64 {
        self.services.sleep(micros)
    }

    fn current_time(&self) -> f64 {
        self.services.current_time()
    }

    fn current_time_i64(&self) -> i64 {
        self.services.current_time_i64()
    }

    fn last_error(&self, buf: &mut [u8]) -> usize {
        self.services.last_error(buf)
    }
}
