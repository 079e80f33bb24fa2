use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use fs4::fs_std::FileExt as _;

use crate::error::{FsError, FsResult};
use crate::fs_traits::{DirEntry, Env, Lockfile, RandomAccessFile, WritableFile};

/// The ordinary on-disk [`Env`], backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFs;

impl Env for StdFs {
    fn open_sequential(&self, path: &Path) -> FsResult<Box<dyn crate::fs_traits::SequentialFile>> {
        Ok(Box::new(File::open(path).map_err(FsError::Io)?))
    }

    fn open_random_access(&self, path: &Path) -> FsResult<Box<dyn RandomAccessFile>> {
        Ok(Box::new(StdRandomAccessFile(File::open(path).map_err(FsError::Io)?)))
    }

    fn open_writable(&self, path: &Path) -> FsResult<Box<dyn WritableFile>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(FsError::Io)?;
        Ok(Box::new(StdWritableFile(file)))
    }

    fn open_appendable(&self, path: &Path) -> FsResult<Box<dyn WritableFile>> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(FsError::Io)?;
        Ok(Box::new(StdWritableFile(file)))
    }

    fn exists(&self, path: &Path) -> FsResult<bool> {
        Ok(path.exists())
    }

    fn children(&self, dir: &Path) -> FsResult<Vec<DirEntry>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(dir).map_err(FsError::Io)? {
            let entry = entry.map_err(FsError::Io)?;
            out.push(entry.file_name().into());
        }
        Ok(out)
    }

    fn size_of(&self, path: &Path) -> FsResult<u64> {
        Ok(fs::metadata(path).map_err(FsError::Io)?.len())
    }

    fn delete_file(&self, path: &Path) -> FsResult<()> {
        fs::remove_file(path).map_err(FsError::Io)?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> FsResult<()> {
        fs::create_dir_all(path).map_err(FsError::Io)?;
        Ok(())
    }

    fn delete_dir(&self, path: &Path) -> FsResult<()> {
        fs::remove_dir(path).map_err(FsError::Io)?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        fs::rename(from, to).map_err(FsError::Io)?;
        Ok(())
    }

    fn lock_file(&self, path: &Path) -> FsResult<Box<dyn Lockfile>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(FsError::Io)?;
        file.try_lock_exclusive()
            .map_err(|_| FsError::AlreadyLocked(path.display().to_string()))?;
        Ok(Box::new(StdLockfile(file)))
    }

    fn unlock_file(&self, lock: Box<dyn Lockfile>) -> FsResult<()> {
        // Dropping the lockfile releases the OS-level advisory lock.
        drop(lock);
        Ok(())
    }

    fn micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct StdRandomAccessFile(File);

impl RandomAccessFile for StdRandomAccessFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.0.metadata()?.len())
    }
}

#[derive(Debug)]
struct StdWritableFile(File);

impl WritableFile for StdWritableFile {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.0, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.0)
    }

    fn sync_data(&mut self) -> io::Result<()> {
        self.0.sync_data()
    }

    fn sync_all(&mut self) -> io::Result<()> {
        self.0.sync_all()
    }
}

#[derive(Debug)]
struct StdLockfile(#[allow(dead_code)] File);

impl Lockfile for StdLockfile {}
