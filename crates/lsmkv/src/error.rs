//! Error kinds, propagated as one sum type across the whole engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The key is absent at the requested snapshot, or a required file is missing.
    #[error("not found")]
    NotFound,
    /// Invalid encoding, a bad checksum, an inconsistent manifest, or an internal-key parse
    /// failure.
    #[error("corruption: {0}")]
    Corruption(String),
    /// The operation is not implemented for this configuration (e.g. a compaction policy or
    /// index flavor this build does not carry).
    #[error("not supported: {0}")]
    NotSupported(String),
    /// Bad options, an unknown column family, or a comparator mismatch on open.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Fs(#[from] lsmkv_vfs::FsError),
    /// A sorted table or block failed to parse.
    #[error("table error: {0}")]
    Table(String),
    /// `Get` found a stack of merge operands with no terminator reachable without I/O.
    #[error("merge in progress")]
    MergeInProgress,
    /// A no-I/O lookup aborted before touching disk.
    #[error("incomplete")]
    Incomplete,
    /// Background work was preempted by a shutdown request.
    #[error("shutdown in progress")]
    ShutdownInProgress,
    /// A writer's `timeout_hint_us` elapsed before it reached the head of the writer queue.
    #[error("timed out")]
    TimedOut,
    /// Optimistic-retry hint; rare, used for manifest contention.
    #[error("busy")]
    Busy,
}

impl From<lsmkv_sstable::TableError> for Error {
    fn from(e: lsmkv_sstable::TableError) -> Self {
        Self::Table(e.to_string())
    }
}

impl From<lsmkv_sstable::BlockCorruption> for Error {
    fn from(_: lsmkv_sstable::BlockCorruption) -> Self {
        Self::Table("corrupt block".into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
