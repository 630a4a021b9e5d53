use std::{
    path::PathBuf,
    pin::Pin,
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use futures::Stream;
use quill_core::ResourceKey;
use tokio::fs;

use crate::{
    error::{StoreError, StoreResult},
    meta::ChunkMeta,
};

const META_FILE: &str = "meta.bin";

/// Ordered pull-based chunk read-back. Single-pass; restart by calling
/// [`ChunkStore::stream`] again.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, StoreError>> + Send>>;

#[derive(Clone, Debug)]
pub struct StoreOptions {
    pub root_dir: PathBuf,
    /// Logical namespace, combined with `store_version` into the directory
    /// name so schema changes never read old layouts.
    pub store_name: String,
    pub store_version: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            root_dir: std::env::temp_dir().join("quill"),
            store_name: "quill-chunks".to_string(),
            store_version: 1,
        }
    }
}

/// Durable `(resource, index) -> chunk` store plus per-resource [`ChunkMeta`].
///
/// Callers append strictly in ascending index order within one job; that
/// contract is what makes the incremental `downloaded_bytes` update correct
/// without re-reading chunk files. Cross-resource concurrency is safe
/// (distinct directories); per-resource serialization is the scheduler's.
#[derive(Clone, Debug)]
pub struct ChunkStore {
    namespace_dir: PathBuf,
    #[cfg(any(test, feature = "test-utils"))]
    appends_before_full: std::sync::Arc<std::sync::Mutex<Option<u64>>>,
}

impl ChunkStore {
    /// Open (and create) the store under `options.root_dir`.
    ///
    /// An unusable root maps to [`StoreError::Unavailable`]; the caller is
    /// expected to degrade to memory-only downloads.
    pub async fn open(options: StoreOptions) -> StoreResult<Self> {
        let namespace_dir = options
            .root_dir
            .join(format!("{}-v{}", options.store_name, options.store_version));
        if let Err(e) = fs::create_dir_all(&namespace_dir).await {
            tracing::warn!(dir = %namespace_dir.display(), error = %e, "chunk store root unusable");
            return Err(StoreError::Unavailable);
        }
        Ok(Self {
            namespace_dir,
            #[cfg(any(test, feature = "test-utils"))]
            appends_before_full: std::sync::Arc::default(),
        })
    }

    fn resource_dir(&self, key: &ResourceKey) -> PathBuf {
        self.namespace_dir.join(key.hex_name())
    }

    /// Append one chunk and fold it into the resource metadata.
    ///
    /// The two writes are ordered chunk-then-metadata, each temp+rename; if
    /// the metadata write fails the chunk file is removed again, so neither
    /// side ever observably moves without the other.
    pub async fn append_chunk(
        &self,
        key: &ResourceKey,
        index: u64,
        bytes: Bytes,
        total_bytes: u64,
        validator: Option<&str>,
    ) -> StoreResult<ChunkMeta> {
        #[cfg(any(test, feature = "test-utils"))]
        self.consume_fault_budget()?;

        let dir = self.resource_dir(key);
        fs::create_dir_all(&dir).await.map_err(|e| {
            match StoreError::from(e) {
                StoreError::Io(io) => {
                    tracing::warn!(url = %key, error = %io, "chunk store became unusable");
                    StoreError::Unavailable
                }
                other => other,
            }
        })?;

        let existing = self.read_meta(&dir).await;
        if let Some(meta) = &existing
            && let (Some(persisted), Some(supplied)) = (meta.validator.as_deref(), validator)
            && persisted != supplied
        {
            return Err(StoreError::ValidatorMismatch {
                persisted: persisted.to_string(),
                supplied: supplied.to_string(),
            });
        }

        let chunk_path = dir.join(chunk_file_name(index));
        let tmp_path = dir.join(format!("{}.tmp", chunk_file_name(index)));
        fs::write(&tmp_path, &bytes).await.map_err(StoreError::from)?;
        fs::rename(&tmp_path, &chunk_path)
            .await
            .map_err(StoreError::from)?;

        let mut meta = existing.unwrap_or_else(|| ChunkMeta::new(key.as_str()));
        meta.chunk_count = meta.chunk_count.max(index + 1);
        if total_bytes > 0 {
            meta.total_bytes = total_bytes;
        }
        meta.downloaded_bytes += bytes.len() as u64;
        if meta.validator.is_none() {
            meta.validator = validator.map(str::to_owned);
        }
        meta.last_updated = unix_now();

        if let Err(e) = self.write_meta(&dir, &meta).await {
            let _ = fs::remove_file(&chunk_path).await;
            return Err(e);
        }

        tracing::trace!(
            url = %key,
            index,
            len = bytes.len(),
            downloaded = meta.downloaded_bytes,
            "chunk appended"
        );
        Ok(meta)
    }

    /// Best-effort metadata read: an absent resource, an unusable store and
    /// corrupted bytes all read as `None`.
    pub async fn metadata(&self, key: &ResourceKey) -> Option<ChunkMeta> {
        let buf = fs::read(self.resource_dir(key).join(META_FILE)).await.ok()?;
        ChunkMeta::decode(&buf)
    }

    /// Remove every chunk and the metadata for `key`. Idempotent.
    pub async fn clear(&self, key: &ResourceKey) -> StoreResult<()> {
        match fs::remove_dir_all(self.resource_dir(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Stream chunks `0..expected_chunks` in order.
    ///
    /// A gap ends the stream with [`StoreError::MissingChunk`]; finalization
    /// treats that as an integrity failure.
    pub fn stream(&self, key: &ResourceKey, expected_chunks: u64) -> ChunkStream {
        let dir = self.resource_dir(key);
        Box::pin(async_stream::try_stream! {
            for index in 0..expected_chunks {
                let path = dir.join(chunk_file_name(index));
                let data = fs::read(&path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        StoreError::MissingChunk(index)
                    } else {
                        StoreError::from(e)
                    }
                })?;
                yield Bytes::from(data);
            }
        })
    }

    async fn read_meta(&self, dir: &std::path::Path) -> Option<ChunkMeta> {
        let buf = fs::read(dir.join(META_FILE)).await.ok()?;
        ChunkMeta::decode(&buf)
    }

    async fn write_meta(&self, dir: &std::path::Path, meta: &ChunkMeta) -> StoreResult<()> {
        let bytes = meta.encode()?;
        let path = dir.join(META_FILE);
        let tmp = dir.join(format!("{META_FILE}.tmp"));
        fs::write(&tmp, &bytes).await.map_err(StoreError::from)?;
        fs::rename(&tmp, &path).await.map_err(StoreError::from)?;
        Ok(())
    }

    /// Make the next appends succeed `successful_appends` times, then fail
    /// with [`StoreError::Full`]. Simulates quota exhaustion in tests.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn fail_appends_with_full_after(&self, successful_appends: u64) {
        *self.appends_before_full.lock().unwrap() = Some(successful_appends);
    }

    #[cfg(any(test, feature = "test-utils"))]
    fn consume_fault_budget(&self) -> StoreResult<()> {
        let mut slot = self.appends_before_full.lock().unwrap();
        if let Some(remaining) = slot.as_mut() {
            if *remaining == 0 {
                return Err(StoreError::Full);
            }
            *remaining -= 1;
        }
        Ok(())
    }
}

fn chunk_file_name(index: u64) -> String {
    format!("{index:08}.chunk")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn open_store(dir: &TempDir) -> ChunkStore {
        ChunkStore::open(StoreOptions {
            root_dir: dir.path().to_path_buf(),
            ..StoreOptions::default()
        })
        .await
        .unwrap()
    }

    fn key() -> ResourceKey {
        ResourceKey::parse("https://example.com/model.onnx").unwrap()
    }

    #[tokio::test]
    async fn injected_full_fails_after_budget() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.fail_appends_with_full_after(1);

        store
            .append_chunk(&key(), 0, Bytes::from_static(b"abc"), 6, None)
            .await
            .unwrap();
        let second = store
            .append_chunk(&key(), 1, Bytes::from_static(b"def"), 6, None)
            .await;

        assert!(matches!(second, Err(StoreError::Full)));
        // The failed append left both tables untouched.
        let meta = store.metadata(&key()).await.unwrap();
        assert_eq!(meta.downloaded_bytes, 3);
        assert_eq!(meta.chunk_count, 1);
    }
}
