use serde::{Deserialize, Serialize};

/// Per-resource bookkeeping persisted next to the chunks.
///
/// Invariants maintained by [`ChunkStore::append_chunk`](crate::ChunkStore::append_chunk)
/// under the sequential-append contract:
/// - `downloaded_bytes` equals the sum of stored chunk sizes;
/// - chunks are indexed `0..chunk_count`;
/// - the resource is complete iff `downloaded_bytes == total_bytes > 0`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub url: String,
    /// Authoritative size; `0` until learned from the first response.
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub chunk_count: u64,
    /// Server entity tag of the version the chunks belong to.
    pub validator: Option<String>,
    /// Unix-epoch seconds of the last successful append.
    pub last_updated: u64,
}

impl ChunkMeta {
    pub(crate) fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            total_bytes: 0,
            downloaded_bytes: 0,
            chunk_count: 0,
            validator: None,
            last_updated: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_bytes > 0 && self.downloaded_bytes == self.total_bytes
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        bincode::serde::encode_to_vec(self, bincode::config::legacy())
    }

    /// Best-effort decode: corrupted metadata reads as absent, the resource
    /// is simply downloaded again.
    ///
    /// Bounds the implied allocation size so a scribbled-over file (which
    /// decodes as an absurd length prefix) returns a decode error instead of
    /// trying to allocate gigabytes.
    pub(crate) fn decode(buf: &[u8]) -> Option<Self> {
        match bincode::serde::decode_from_slice(buf, bincode::config::legacy().with_limit::<4096>())
        {
            Ok((meta, _)) => Some(meta),
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable chunk metadata");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let meta = ChunkMeta {
            url: "https://example.com/model.onnx".to_string(),
            total_bytes: 10,
            downloaded_bytes: 5,
            chunk_count: 1,
            validator: Some("\"v1\"".to_string()),
            last_updated: 1_700_000_000,
        };

        let bytes = meta.encode().unwrap();
        assert_eq!(ChunkMeta::decode(&bytes), Some(meta));
    }

    #[test]
    fn decode_garbage_is_none() {
        assert_eq!(ChunkMeta::decode(&[0xFF, 0x01, 0x02]), None);
    }

    #[test]
    fn completeness_requires_known_total() {
        let mut meta = ChunkMeta::new("https://example.com/a");
        assert!(!meta.is_complete());

        meta.total_bytes = 4;
        meta.downloaded_bytes = 4;
        assert!(meta.is_complete());

        meta.total_bytes = 0;
        meta.downloaded_bytes = 0;
        assert!(!meta.is_complete());
    }
}
