use std::io;

use thiserror::Error;

/// Errors surfaced by an [`Env`](crate::Env) implementation.
///
/// This mirrors the subset of `lsmkv`'s top-level error kinds that an environment can
/// itself produce: I/O failures, and the advisory-lock contention case.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("lock already held: {0}")]
    AlreadyLocked(String),
}

pub type FsResult<T> = Result<T, FsError>;
