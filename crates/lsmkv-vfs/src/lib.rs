//! Environment abstraction for the `lsmkv` storage engine: file I/O, directory listing,
//! advisory locking, and clocks, all behind one trait so the engine can run against a real
//! filesystem or an in-memory one.

mod error;
mod fs_traits;
mod memory_fs;
#[cfg(unix)]
mod std_fs;

pub use self::error::{FsError, FsResult};
pub use self::fs_traits::{DirEntry, Env, Lockfile, RandomAccessFile, SequentialFile, WritableFile};
pub use self::memory_fs::MemoryFs;
#[cfg(unix)]
pub use self::std_fs::StdFs;
