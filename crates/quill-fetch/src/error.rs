use quill_cache::CacheError;
use quill_core::CoreError;
use quill_net::NetError;
use quill_store::StoreError;
use thiserror::Error;

pub type FetchResult<T> = Result<T, FetchError>;

/// Terminal outcome kinds surfaced to `acquire` callers.
///
/// `Clone` because the result is broadcast to every deduplicated waiter;
/// transport and storage details are carried as strings for that reason.
#[derive(Debug, Error, Clone)]
pub enum FetchError {
    #[error("download cancelled")]
    Cancelled,

    /// Unhandled HTTP status. The chunk store is kept so a later acquire can
    /// resume.
    #[error("HTTP {status}")]
    Http { status: u16 },

    /// The server's validator no longer matches the persisted partial data,
    /// which has been discarded.
    #[error("resource changed on the server")]
    ValidatorChanged,

    /// Persistent store exhausted and memory fallback was not permitted.
    #[error("persistent store is full")]
    StorageFull,

    #[error("persistent store is unavailable")]
    StorageUnavailable,

    #[error("integrity error: {0}")]
    Integrity(String),

    /// Transport failure before completion; partial state stays resumable.
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<NetError> for FetchError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::HttpError { status, .. } => Self::Http { status },
            NetError::Timeout => Self::Network("timeout".to_string()),
            NetError::Http(msg) => Self::Network(msg),
        }
    }
}

impl From<StoreError> for FetchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Full => Self::StorageFull,
            StoreError::Unavailable => Self::StorageUnavailable,
            StoreError::ValidatorMismatch { .. } => Self::ValidatorChanged,
            StoreError::MissingChunk(index) => Self::Integrity(format!("missing chunk {index}")),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<CacheError> for FetchError {
    fn from(e: CacheError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<CoreError> for FetchError {
    fn from(e: CoreError) -> Self {
        Self::InvalidUrl(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_kinds_map_to_policy_kinds() {
        assert!(matches!(
            FetchError::from(StoreError::Full),
            FetchError::StorageFull
        ));
        assert!(matches!(
            FetchError::from(StoreError::Unavailable),
            FetchError::StorageUnavailable
        ));
        assert!(matches!(
            FetchError::from(StoreError::MissingChunk(3)),
            FetchError::Integrity(msg) if msg.contains('3')
        ));
    }

    #[test]
    fn fetch_error_is_clone_send_sync() {
        fn assert_clone_send_sync<T: Clone + Send + Sync>() {}
        assert_clone_send_sync::<FetchError>();
    }
}
