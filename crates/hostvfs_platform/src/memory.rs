//! In-memory platform for testing.

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{normalize_lexically, FileStat, PlatformFile, PlatformFileHandle};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A host operation that can be forced to fail on an in-memory file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// `seek` fails.
    Seek,
    /// `read` fails.
    Read,
    /// `write` fails.
    Write,
    /// `flush` fails.
    Flush,
    /// `truncate` fails.
    Truncate,
    /// `size` fails.
    Size,
}

#[derive(Debug, Default)]
struct MemoryFile {
    data: Vec<u8>,
    read_only: bool,
    faults: HashSet<Fault>,
    /// Time a full flush spends before returning.
    full_flush_delay: Option<Duration>,
}

impl MemoryFile {
    fn check(&self, fault: Fault) -> PlatformResult<()> {
        if self.faults.contains(&fault) {
            return Err(PlatformError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected {fault:?} fault"),
            )));
        }
        Ok(())
    }
}

type SharedFile = Arc<RwLock<MemoryFile>>;

#[derive(Debug, Default)]
struct MemoryTree {
    files: HashMap<PathBuf, SharedFile>,
    directories: HashSet<PathBuf>,
}

/// An in-memory filesystem.
///
/// Suitable for:
/// - Unit tests that need read-only files (which a privileged test process
///   cannot reliably produce on a real filesystem)
/// - Tests that inject host failures with [`inject_fault`](Self::inject_fault)
///
/// Relative paths are resolved against `/`. Clones share the same tree.
///
/// # Example
///
/// ```rust
/// use hostvfs_platform::{InMemoryPlatform, PlatformFile};
/// use std::path::Path;
///
/// let platform = InMemoryPlatform::new();
/// platform.insert_file(Path::new("/pak/data.db"), b"baked".to_vec(), true);
/// assert!(platform.is_read_only(Path::new("/pak/data.db")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryPlatform {
    tree: Arc<RwLock<MemoryTree>>,
}

impl InMemoryPlatform {
    /// Creates an empty in-memory filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_lexically(path)
        } else {
            normalize_lexically(&Path::new("/").join(path))
        }
    }

    fn file(&self, path: &Path) -> Option<SharedFile> {
        self.tree.read().files.get(&Self::key(path)).cloned()
    }

    /// Creates or replaces a file with the given contents.
    pub fn insert_file(&self, path: &Path, data: Vec<u8>, read_only: bool) {
        let file = MemoryFile {
            data,
            read_only,
            ..MemoryFile::default()
        };
        self.tree
            .write()
            .files
            .insert(Self::key(path), Arc::new(RwLock::new(file)));
    }

    /// Marks an existing file read-only or writable.
    ///
    /// Returns false if the file does not exist.
    pub fn set_read_only(&self, path: &Path, read_only: bool) -> bool {
        match self.file(path) {
            Some(file) => {
                file.write().read_only = read_only;
                true
            }
            None => false,
        }
    }

    /// Makes every subsequent `fault` operation on `path` fail.
    ///
    /// Applies to handles that are already open. Returns false if the file
    /// does not exist.
    pub fn inject_fault(&self, path: &Path, fault: Fault) -> bool {
        match self.file(path) {
            Some(file) => {
                file.write().faults.insert(fault);
                true
            }
            None => false,
        }
    }

    /// Makes every subsequent full flush of `path` take `delay`.
    ///
    /// Applies to handles that are already open. Returns false if the file
    /// does not exist.
    pub fn delay_full_flush(&self, path: &Path, delay: Duration) -> bool {
        match self.file(path) {
            Some(file) => {
                file.write().full_flush_delay = Some(delay);
                true
            }
            None => false,
        }
    }

    /// Removes all injected faults from `path`.
    pub fn clear_faults(&self, path: &Path) {
        if let Some(file) = self.file(path) {
            file.write().faults.clear();
        }
    }

    /// Returns a copy of the contents of `path`.
    #[must_use]
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.file(path).map(|file| file.read().data.clone())
    }

    /// Returns the number of files in the tree.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.tree.read().files.len()
    }
}

/// An open in-memory file.
#[derive(Debug)]
pub struct MemoryFileHandle {
    file: SharedFile,
    position: u64,
    writable: bool,
    path: PathBuf,
}

impl MemoryFileHandle {
    fn ensure_writable(&self) -> PlatformResult<()> {
        if self.writable && !self.file.read().read_only {
            Ok(())
        } else {
            Err(PlatformError::read_only(&self.path))
        }
    }
}

impl PlatformFileHandle for MemoryFileHandle {
    fn tell(&mut self) -> PlatformResult<u64> {
        Ok(self.position)
    }

    fn seek(&mut self, offset: u64) -> PlatformResult<()> {
        self.file.read().check(Fault::Seek)?;
        self.position = offset;
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read(&mut self, buf: &mut [u8]) -> PlatformResult<usize> {
        let file = self.file.read();
        file.check(Fault::Read)?;

        let len = file.data.len() as u64;
        if self.position >= len {
            return Ok(0);
        }
        let start = self.position as usize;
        let n = buf.len().min(file.data.len() - start);
        buf[..n].copy_from_slice(&file.data[start..start + n]);
        drop(file);

        self.position += n as u64;
        Ok(n)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write(&mut self, data: &[u8]) -> PlatformResult<()> {
        self.ensure_writable()?;
        let mut file = self.file.write();
        file.check(Fault::Write)?;

        let start = self.position as usize;
        let end = start + data.len();
        if end > file.data.len() {
            file.data.resize(end, 0);
        }
        file.data[start..end].copy_from_slice(data);
        drop(file);

        self.position = end as u64;
        Ok(())
    }

    fn flush(&mut self, full: bool) -> PlatformResult<()> {
        // Nothing is buffered; only the fault switch and delay matter
        let delay = {
            let file = self.file.read();
            file.check(Fault::Flush)?;
            file.full_flush_delay.filter(|_| full)
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn truncate(&mut self, size: u64) -> PlatformResult<()> {
        self.ensure_writable()?;
        let mut file = self.file.write();
        file.check(Fault::Truncate)?;
        file.data.resize(size as usize, 0);
        Ok(())
    }

    fn size(&self) -> PlatformResult<u64> {
        let file = self.file.read();
        file.check(Fault::Size)?;
        Ok(file.data.len() as u64)
    }
}

impl PlatformFile for InMemoryPlatform {
    fn file_exists(&self, path: &Path) -> bool {
        self.tree.read().files.contains_key(&Self::key(path))
    }

    fn directory_exists(&self, path: &Path) -> bool {
        self.tree.read().directories.contains(&Self::key(path))
    }

    fn is_read_only(&self, path: &Path) -> bool {
        self.file(path).is_some_and(|file| file.read().read_only)
    }

    fn stat(&self, path: &Path) -> Option<FileStat> {
        if let Some(file) = self.file(path) {
            let file = file.read();
            return Some(FileStat {
                is_directory: false,
                is_read_only: file.read_only,
                size: file.data.len() as u64,
            });
        }
        self.directory_exists(path).then_some(FileStat {
            is_directory: true,
            is_read_only: false,
            size: 0,
        })
    }

    fn open_write(
        &self,
        path: &Path,
        _allow_read: bool,
    ) -> PlatformResult<Box<dyn PlatformFileHandle>> {
        let key = Self::key(path);
        let file = {
            let mut tree = self.tree.write();
            Arc::clone(tree.files.entry(key.clone()).or_default())
        };
        if file.read().read_only {
            return Err(PlatformError::read_only(key));
        }

        Ok(Box::new(MemoryFileHandle {
            file,
            position: 0,
            writable: true,
            path: key,
        }))
    }

    fn open_read(&self, path: &Path) -> PlatformResult<Box<dyn PlatformFileHandle>> {
        let key = Self::key(path);
        let file = self
            .file(&key)
            .ok_or_else(|| PlatformError::not_found(&key))?;

        Ok(Box::new(MemoryFileHandle {
            file,
            position: 0,
            writable: false,
            path: key,
        }))
    }

    fn delete_file(&self, path: &Path) -> PlatformResult<()> {
        let key = Self::key(path);
        match self.tree.write().files.remove(&key) {
            Some(_) => Ok(()),
            None => Err(PlatformError::not_found(key)),
        }
    }

    fn delete_directory_recursively(&self, path: &Path) -> PlatformResult<()> {
        let key = Self::key(path);
        let mut tree = self.tree.write();
        if !tree.directories.remove(&key) {
            return Err(PlatformError::not_found(key));
        }
        tree.files.retain(|p, _| !p.starts_with(&key));
        tree.directories.retain(|p| !p.starts_with(&key));
        Ok(())
    }

    fn create_directory_tree(&self, path: &Path) -> PlatformResult<()> {
        let key = Self::key(path);
        let mut tree = self.tree.write();
        for ancestor in key.ancestors() {
            tree.directories.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn sync_directory(&self, _path: &Path) -> PlatformResult<()> {
        Ok(())
    }

    fn filename_on_disk(&self, path: &Path) -> PathBuf {
        Self::key(path)
    }

    fn convert_to_absolute(&self, path: &Path) -> PathBuf {
        Self::key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let platform = InMemoryPlatform::new();
        assert_eq!(platform.file_count(), 0);
        assert!(!platform.file_exists(Path::new("/a")));
    }

    #[test]
    fn memory_write_and_read_back() {
        let platform = InMemoryPlatform::new();
        let mut handle = platform.open_write(Path::new("db"), true).unwrap();
        handle.write(b"hello world").unwrap();

        handle.seek(6).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(handle.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(platform.contents(Path::new("/db")).unwrap(), b"hello world");
    }

    #[test]
    fn memory_write_past_end_zero_extends() {
        let platform = InMemoryPlatform::new();
        let mut handle = platform.open_write(Path::new("/f"), true).unwrap();
        handle.seek(3).unwrap();
        handle.write(b"x").unwrap();
        assert_eq!(platform.contents(Path::new("/f")).unwrap(), vec![0, 0, 0, b'x']);
    }

    #[test]
    fn memory_read_past_end_returns_zero() {
        let platform = InMemoryPlatform::new();
        platform.insert_file(Path::new("/f"), b"abc".to_vec(), false);
        let mut handle = platform.open_read(Path::new("/f")).unwrap();
        handle.seek(10).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(handle.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn memory_read_only_refuses_write_open() {
        let platform = InMemoryPlatform::new();
        platform.insert_file(Path::new("/ro"), b"data".to_vec(), true);

        assert!(matches!(
            platform.open_write(Path::new("/ro"), true),
            Err(PlatformError::ReadOnly { .. })
        ));
        let mut handle = platform.open_read(Path::new("/ro")).unwrap();
        assert!(handle.write(b"x").is_err());
    }

    #[test]
    fn memory_injected_faults() {
        let platform = InMemoryPlatform::new();
        let mut handle = platform.open_write(Path::new("/f"), true).unwrap();
        assert!(platform.inject_fault(Path::new("/f"), Fault::Seek));
        assert!(handle.seek(0).is_err());

        platform.clear_faults(Path::new("/f"));
        assert!(handle.seek(0).is_ok());
    }

    #[test]
    fn memory_directories() {
        let platform = InMemoryPlatform::new();
        platform.create_directory_tree(Path::new("/a/b")).unwrap();
        platform.insert_file(Path::new("/a/b/f"), Vec::new(), false);

        assert!(platform.directory_exists(Path::new("/a")));
        assert!(platform.stat(Path::new("/a/b")).unwrap().is_directory);

        platform
            .delete_directory_recursively(Path::new("/a"))
            .unwrap();
        assert!(!platform.file_exists(Path::new("/a/b/f")));
        assert!(!platform.directory_exists(Path::new("/a/b")));
    }

    #[test]
    fn memory_paths_are_rooted() {
        let platform = InMemoryPlatform::new();
        assert_eq!(
            platform.convert_to_absolute(Path::new("x/../y.db")),
            PathBuf::from("/y.db")
        );
    }

    #[test]
    fn memory_delay_applies_to_full_flush_only() {
        let platform = InMemoryPlatform::new();
        let mut handle = platform.open_write(Path::new("/slow"), true).unwrap();
        assert!(platform.delay_full_flush(Path::new("/slow"), Duration::from_millis(50)));
        assert!(!platform.delay_full_flush(Path::new("/missing"), Duration::from_millis(50)));

        let start = std::time::Instant::now();
        handle.flush(false).unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));

        let start = std::time::Instant::now();
        handle.flush(true).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
