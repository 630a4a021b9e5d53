use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::CacheResult;

/// Sidecar metadata persisted next to an entry body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub url: String,
    pub content_length: u64,
    pub content_type: Option<String>,
}

impl EntryMeta {
    pub(crate) fn encode(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        bincode::serde::encode_to_vec(self, bincode::config::legacy())
    }

    pub(crate) fn decode(buf: &[u8]) -> Option<Self> {
        match bincode::serde::decode_from_slice(buf, bincode::config::legacy()) {
            Ok((meta, _)) => Some(meta),
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable cache entry metadata");
                None
            }
        }
    }
}

/// Handle to one cached artifact.
///
/// Holds the metadata eagerly and the body lazily; artifacts run into the
/// hundreds of megabytes, so callers decide when to materialize.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    meta: EntryMeta,
    body_path: PathBuf,
}

impl CacheEntry {
    pub(crate) fn new(meta: EntryMeta, body_path: PathBuf) -> Self {
        Self { meta, body_path }
    }

    pub fn url(&self) -> &str {
        &self.meta.url
    }

    pub fn content_length(&self) -> u64 {
        self.meta.content_length
    }

    pub fn content_type(&self) -> Option<&str> {
        self.meta.content_type.as_deref()
    }

    /// Read the full body into memory.
    pub async fn bytes(&self) -> CacheResult<Bytes> {
        let data = fs::read(&self.body_path).await?;
        Ok(Bytes::from(data))
    }
}
