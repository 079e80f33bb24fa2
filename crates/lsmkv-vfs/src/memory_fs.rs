use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::error::{FsError, FsResult};
use crate::fs_traits::{DirEntry, Env, Lockfile, RandomAccessFile, WritableFile};

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<PathBuf, Arc<Mutex<Vec<u8>>>>,
    dirs: hashbrown::HashSet<PathBuf>,
    locked: hashbrown::HashSet<PathBuf>,
}

/// An in-memory [`Env`], used to exercise the engine's write path, WAL replay, and compaction
/// logic deterministically in tests without touching a real filesystem.
#[derive(Debug, Clone)]
pub struct MemoryFs {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<AtomicU64>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advances the fake clock, for tests that exercise rate-limited sleeps deterministically.
    pub fn advance_micros(&self, delta: u64) {
        self.clock.fetch_add(delta, Ordering::Relaxed);
    }

    fn not_found(path: &Path) -> FsError {
        FsError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such file: {}", path.display()),
        ))
    }
}

impl Env for MemoryFs {
    fn open_sequential(&self, path: &Path) -> FsResult<Box<dyn crate::fs_traits::SequentialFile>> {
        let data = self.inner.lock().files.get(path).cloned().ok_or_else(|| Self::not_found(path))?;
        let bytes = data.lock().clone();
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn open_random_access(&self, path: &Path) -> FsResult<Box<dyn RandomAccessFile>> {
        let data = self.inner.lock().files.get(path).cloned().ok_or_else(|| Self::not_found(path))?;
        Ok(Box::new(MemoryRandomAccessFile(data)))
    }

    fn open_writable(&self, path: &Path) -> FsResult<Box<dyn WritableFile>> {
        let data = Arc::new(Mutex::new(Vec::new()));
        self.inner.lock().files.insert(path.to_owned(), Arc::clone(&data));
        Ok(Box::new(MemoryWritableFile(data)))
    }

    fn open_appendable(&self, path: &Path) -> FsResult<Box<dyn WritableFile>> {
        let mut inner = self.inner.lock();
        let data = inner
            .files
            .entry(path.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone();
        Ok(Box::new(MemoryWritableFile(data)))
    }

    fn exists(&self, path: &Path) -> FsResult<bool> {
        let inner = self.inner.lock();
        Ok(inner.files.contains_key(path) || inner.dirs.contains(path))
    }

    fn children(&self, dir: &Path) -> FsResult<Vec<DirEntry>> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        for path in inner.files.keys().chain(inner.dirs.iter()) {
            if path.parent() == Some(dir) {
                if let Some(name) = path.file_name() {
                    out.push(PathBuf::from(name));
                }
            }
        }
        Ok(out)
    }

    fn size_of(&self, path: &Path) -> FsResult<u64> {
        let inner = self.inner.lock();
        let data = inner.files.get(path).ok_or_else(|| Self::not_found(path))?;
        Ok(data.lock().len() as u64)
    }

    fn delete_file(&self, path: &Path) -> FsResult<()> {
        let mut inner = self.inner.lock();
        inner.files.remove(path).ok_or_else(|| Self::not_found(path))?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> FsResult<()> {
        let mut inner = self.inner.lock();
        let mut cur = PathBuf::new();
        for component in path.components() {
            cur.push(component);
            inner.dirs.insert(cur.clone());
        }
        Ok(())
    }

    fn delete_dir(&self, path: &Path) -> FsResult<()> {
        let mut inner = self.inner.lock();
        inner.dirs.remove(path);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        let mut inner = self.inner.lock();
        let data = inner.files.remove(from).ok_or_else(|| Self::not_found(from))?;
        inner.files.insert(to.to_owned(), data);
        Ok(())
    }

    fn lock_file(&self, path: &Path) -> FsResult<Box<dyn Lockfile>> {
        let mut inner = self.inner.lock();
        if !inner.locked.insert(path.to_owned()) {
            return Err(FsError::AlreadyLocked(path.display().to_string()));
        }
        inner.files.entry(path.to_owned()).or_insert_with(|| Arc::new(Mutex::new(Vec::new())));
        Ok(Box::new(MemoryLockfile {
            inner: Arc::clone(&self.inner),
            path: path.to_owned(),
        }))
    }

    fn unlock_file(&self, lock: Box<dyn Lockfile>) -> FsResult<()> {
        drop(lock);
        Ok(())
    }

    fn micros(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct MemoryRandomAccessFile(Arc<Mutex<Vec<u8>>>);

impl RandomAccessFile for MemoryRandomAccessFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.0.lock();
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let available = &data[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.0.lock().len() as u64)
    }
}

#[derive(Debug)]
struct MemoryWritableFile(Arc<Mutex<Vec<u8>>>);

impl WritableFile for MemoryWritableFile {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(&mut *self.0.lock(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn sync_data(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn sync_all(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryLockfile {
    inner: Arc<Mutex<Inner>>,
    path: PathBuf,
}

impl Lockfile for MemoryLockfile {}

impl Drop for MemoryLockfile {
    fn drop(&mut self) {
        self.inner.lock().locked.remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let fs = MemoryFs::new();
        let path = Path::new("/db/000001.log");
        let mut file = fs.open_writable(path).unwrap();
        file.write_all(b"hello world").unwrap();
        drop(file);

        let mut seq = fs.open_sequential(path).unwrap();
        let mut buf = Vec::new();
        io::Read::read_to_end(&mut seq, &mut buf).unwrap();
        assert_eq!(buf, b"hello world");

        let random = fs.open_random_access(path).unwrap();
        let mut tail = [0_u8; 5];
        let n = random.read_at(6, &mut tail).unwrap();
        assert_eq!(&tail[..n], b"world");
    }

    #[test]
    fn locking_is_exclusive() {
        let fs = MemoryFs::new();
        let path = Path::new("/db/LOCK");
        let lock = fs.lock_file(path).unwrap();
        assert!(fs.lock_file(path).is_err());
        fs.unlock_file(lock).unwrap();
        assert!(fs.lock_file(path).is_ok());
    }

    #[test]
    fn rename_moves_contents() {
        let fs = MemoryFs::new();
        let from = Path::new("/db/MANIFEST-000001.dbtmp");
        let to = Path::new("/db/CURRENT");
        fs.open_writable(from).unwrap().write_all(b"MANIFEST-000001").unwrap();
        fs.rename(from, to).unwrap();
        assert!(!fs.exists(from).unwrap());
        assert!(fs.exists(to).unwrap());
    }
}
