//! Native filesystem platform backed by OS file APIs.

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{normalize_lexically, FileStat, PlatformFile, PlatformFileHandle};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// The operating system's filesystem.
///
/// # Durability
///
/// - `flush(false)` calls `File::sync_data()`
/// - `flush(true)` calls `File::sync_all()` so metadata is durable too
/// - `sync_directory` fsyncs the directory on Unix; other hosts rely on
///   their filesystem journal and treat it as a no-op
///
/// # Example
///
/// ```no_run
/// use hostvfs_platform::{NativePlatform, PlatformFile, PlatformFileHandle};
/// use std::path::Path;
///
/// let platform = NativePlatform::new();
/// let mut handle = platform.open_write(Path::new("data.bin"), true).unwrap();
/// handle.write(b"persistent data").unwrap();
/// handle.flush(true).unwrap();
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePlatform;

impl NativePlatform {
    /// Creates the native platform.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// An open native file.
#[derive(Debug)]
pub struct NativeFileHandle {
    path: PathBuf,
    file: File,
    writable: bool,
}

impl NativeFileHandle {
    /// Returns the path this handle was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_writable(&self) -> PlatformResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(PlatformError::read_only(&self.path))
        }
    }
}

impl PlatformFileHandle for NativeFileHandle {
    fn tell(&mut self) -> PlatformResult<u64> {
        Ok(self.file.stream_position()?)
    }

    fn seek(&mut self, offset: u64) -> PlatformResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> PlatformResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn write(&mut self, data: &[u8]) -> PlatformResult<()> {
        self.ensure_writable()?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self, full: bool) -> PlatformResult<()> {
        if !self.writable {
            return Ok(());
        }
        self.file.flush()?;
        if full {
            self.file.sync_all()?;
        } else {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn truncate(&mut self, size: u64) -> PlatformResult<()> {
        self.ensure_writable()?;
        self.file.set_len(size)?;
        Ok(())
    }

    fn size(&self) -> PlatformResult<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl PlatformFile for NativePlatform {
    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_read_only(&self, path: &Path) -> bool {
        fs::metadata(path)
            .map(|meta| meta.permissions().readonly())
            .unwrap_or(false)
    }

    fn stat(&self, path: &Path) -> Option<FileStat> {
        let meta = fs::metadata(path).ok()?;
        Some(FileStat {
            is_directory: meta.is_dir(),
            is_read_only: meta.permissions().readonly(),
            size: if meta.is_dir() { 0 } else { meta.len() },
        })
    }

    fn open_write(
        &self,
        path: &Path,
        allow_read: bool,
    ) -> PlatformResult<Box<dyn PlatformFileHandle>> {
        let file = OpenOptions::new()
            .read(allow_read)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::PermissionDenied => PlatformError::read_only(path),
                _ => PlatformError::Io(e),
            })?;

        Ok(Box::new(NativeFileHandle {
            path: path.to_path_buf(),
            file,
            writable: true,
        }))
    }

    fn open_read(&self, path: &Path) -> PlatformResult<Box<dyn PlatformFileHandle>> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PlatformError::not_found(path),
            _ => PlatformError::Io(e),
        })?;

        Ok(Box::new(NativeFileHandle {
            path: path.to_path_buf(),
            file,
            writable: false,
        }))
    }

    fn delete_file(&self, path: &Path) -> PlatformResult<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn delete_directory_recursively(&self, path: &Path) -> PlatformResult<()> {
        fs::remove_dir_all(path)?;
        Ok(())
    }

    fn create_directory_tree(&self, path: &Path) -> PlatformResult<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    #[cfg(unix)]
    fn sync_directory(&self, path: &Path) -> PlatformResult<()> {
        // On Unix, fsync on a directory syncs the directory entries
        let dir = File::open(path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self, _path: &Path) -> PlatformResult<()> {
        Ok(())
    }

    fn filename_on_disk(&self, path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap_or_else(|_| self.convert_to_absolute(path))
    }

    fn convert_to_absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return normalize_lexically(path);
        }
        match std::env::current_dir() {
            Ok(cwd) => normalize_lexically(&cwd.join(path)),
            Err(_) => normalize_lexically(path),
        }
    }
}
