use std::fmt::Debug;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::FsResult;

/// A file opened for sequential reading, such as a write-ahead log being replayed.
pub trait SequentialFile: Read + Debug + Send {}

impl<T: Read + Debug + Send + ?Sized> SequentialFile for T {}

/// A file that may be read at arbitrary offsets, such as an open sorted table.
///
/// Implementations must tolerate concurrent calls to `read_at` from multiple readers; they
/// should not assume a single cursor position.
pub trait RandomAccessFile: Debug + Send + Sync {
    /// Reads up to `buf.len()` bytes starting at `offset`, returning the number of bytes read.
    /// Short reads are only permitted at end-of-file.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// The current size of the file in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Reads exactly `buf.len()` bytes starting at `offset`, failing with
    /// `io::ErrorKind::UnexpectedEof` on a short file.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.read_at(offset + filled as u64, &mut buf[filled..])?;
            if read == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"));
            }
            filled += read;
        }
        Ok(())
    }
}

/// A file opened for sequential writing: WAL segments, MANIFEST files, and new SST outputs are
/// all written this way, never with random-access seeks.
pub trait WritableFile: Debug + Send {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    /// Flushes data (and ideally metadata) to stable storage. Corresponds to `fdatasync`.
    fn sync_data(&mut self) -> io::Result<()>;
    /// Flushes data and metadata to stable storage. Corresponds to `fsync`.
    fn sync_all(&mut self) -> io::Result<()>;
}

impl WritableFile for Box<dyn WritableFile> {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        (**self).write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn sync_data(&mut self) -> io::Result<()> {
        (**self).sync_data()
    }

    fn sync_all(&mut self) -> io::Result<()> {
        (**self).sync_all()
    }
}

/// An advisory lock held on the database's `LOCK` file for the lifetime of an open `Database`.
pub trait Lockfile: Debug + Send {}

/// An opaque directory entry name, as returned by [`Env::children`].
pub type DirEntry = PathBuf;

/// The environment abstraction: every filesystem interaction, and the
/// database's only source of wall-clock and monotonic time, is funneled through this trait so
/// that the engine itself is deterministic and testable against an in-memory filesystem.
pub trait Env: Debug + Send + Sync {
    fn open_sequential(&self, path: &Path) -> FsResult<Box<dyn SequentialFile>>;
    fn open_random_access(&self, path: &Path) -> FsResult<Box<dyn RandomAccessFile>>;
    /// Creates (truncating if necessary) a file for sequential writing.
    fn open_writable(&self, path: &Path) -> FsResult<Box<dyn WritableFile>>;
    /// Opens a file for appending, creating it if it does not exist.
    fn open_appendable(&self, path: &Path) -> FsResult<Box<dyn WritableFile>>;

    fn exists(&self, path: &Path) -> FsResult<bool>;
    fn children(&self, dir: &Path) -> FsResult<Vec<DirEntry>>;
    fn size_of(&self, path: &Path) -> FsResult<u64>;
    fn delete_file(&self, path: &Path) -> FsResult<()>;
    fn create_dir_all(&self, path: &Path) -> FsResult<()>;
    fn delete_dir(&self, path: &Path) -> FsResult<()>;
    fn rename(&self, from: &Path, to: &Path) -> FsResult<()>;

    fn lock_file(&self, path: &Path) -> FsResult<Box<dyn Lockfile>>;
    fn unlock_file(&self, lock: Box<dyn Lockfile>) -> FsResult<()>;

    /// Monotonically nondecreasing microseconds, used for rate-limit sleeps and metrics;
    /// never used as a source of wall-clock truth.
    fn micros(&self) -> u64;
}
