use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by the chunk store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(std::io::Error),

    #[error("persistent store is full")]
    Full,

    #[error("persistent store is unavailable")]
    Unavailable,

    #[error("validator mismatch: persisted {persisted:?}, supplied {supplied:?}")]
    ValidatorMismatch { persisted: String, supplied: String },

    #[error("chunk {0} is missing")]
    MissingChunk(u64),

    #[error("metadata encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::StorageFull | std::io::ErrorKind::QuotaExceeded => Self::Full,
            // Some platforms surface ENOSPC through an unclassified kind.
            _ if e.raw_os_error() == Some(28) => Self::Full,
            _ => Self::Io(e),
        }
    }
}
