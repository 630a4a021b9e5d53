use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("entry encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

/// Error of a streaming put, keeping source failures distinguishable from
/// cache failures so the scheduler can tell a chunk-store gap from a disk
/// problem.
#[derive(Debug, Error)]
pub enum PutStreamError<E> {
    #[error("body source error: {0}")]
    Source(E),
    #[error(transparent)]
    Cache(CacheError),
}

/// Outcome of [`ContentCache::check_integrity`](crate::ContentCache::check_integrity).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntegrityStatus {
    Ok,
    Missing,
    SizeMismatch { expected: u64, actual: u64 },
    ChecksumMismatch,
}
