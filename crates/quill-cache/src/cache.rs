use std::path::PathBuf;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use quill_core::ResourceKey;
use sha2::{Digest, Sha256};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncWriteExt},
};

use crate::{
    entry::{CacheEntry, EntryMeta},
    error::{CacheResult, IntegrityStatus, PutStreamError},
};

const ENTRY_FILE: &str = "entry.bin";
const BODY_FILE: &str = "body.bin";

/// URL-keyed store of immutable completed artifacts.
#[derive(Clone, Debug)]
pub struct ContentCache {
    cache_dir: PathBuf,
}

impl ContentCache {
    /// Open (and create) the cache namespace under `root_dir`.
    pub async fn open(root_dir: impl Into<PathBuf>, cache_name: &str) -> CacheResult<Self> {
        let cache_dir = root_dir.into().join(cache_name);
        fs::create_dir_all(&cache_dir).await?;
        Ok(Self { cache_dir })
    }

    fn entry_dir(&self, key: &ResourceKey) -> PathBuf {
        self.cache_dir.join(key.hex_name())
    }

    pub async fn get(&self, key: &ResourceKey) -> CacheResult<Option<CacheEntry>> {
        let dir = self.entry_dir(key);
        let buf = match fs::read(dir.join(ENTRY_FILE)).await {
            Ok(buf) => buf,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(EntryMeta::decode(&buf).map(|meta| CacheEntry::new(meta, dir.join(BODY_FILE))))
    }

    /// Store a materialized body. Overwriting an existing entry is allowed
    /// and atomic per file.
    pub async fn put(
        &self,
        key: &ResourceKey,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> CacheResult<()> {
        let dir = self.entry_dir(key);
        fs::create_dir_all(&dir).await?;

        let body_tmp = dir.join(format!("{BODY_FILE}.tmp"));
        fs::write(&body_tmp, &bytes).await?;
        fs::rename(&body_tmp, dir.join(BODY_FILE)).await?;

        self.write_sidecar(&dir, key, bytes.len() as u64, content_type)
            .await
    }

    /// Store a body from a stream without materializing it.
    ///
    /// Returns the number of bytes written. On any failure the temp file is
    /// removed and no entry becomes visible.
    pub async fn put_stream<S, E>(
        &self,
        key: &ResourceKey,
        stream: S,
        content_type: Option<&str>,
    ) -> Result<u64, PutStreamError<E>>
    where
        S: Stream<Item = Result<Bytes, E>> + Send,
    {
        let dir = self.entry_dir(key);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| PutStreamError::Cache(e.into()))?;

        let body_tmp = dir.join(format!("{BODY_FILE}.tmp"));
        let result = self.write_body_stream(&body_tmp, stream).await;

        let written = match result {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&body_tmp).await;
                return Err(e);
            }
        };

        fs::rename(&body_tmp, dir.join(BODY_FILE))
            .await
            .map_err(|e| PutStreamError::Cache(e.into()))?;
        self.write_sidecar(&dir, key, written, content_type)
            .await
            .map_err(PutStreamError::Cache)?;

        Ok(written)
    }

    /// Remove the entry for `key`. Idempotent.
    pub async fn delete(&self, key: &ResourceKey) -> CacheResult<()> {
        match fs::remove_dir_all(self.entry_dir(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify a stored entry against its own sidecar and, optionally, an
    /// expected sha256 hex digest.
    pub async fn check_integrity(
        &self,
        key: &ResourceKey,
        expected_checksum: Option<&str>,
    ) -> CacheResult<IntegrityStatus> {
        let Some(entry) = self.get(key).await? else {
            return Ok(IntegrityStatus::Missing);
        };

        let body_path = self.entry_dir(key).join(BODY_FILE);
        let actual = match fs::metadata(&body_path).await {
            Ok(m) => m.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(IntegrityStatus::Missing);
            }
            Err(e) => return Err(e.into()),
        };

        if actual != entry.content_length() {
            return Ok(IntegrityStatus::SizeMismatch {
                expected: entry.content_length(),
                actual,
            });
        }

        if let Some(expected) = expected_checksum {
            let digest = hex::encode(self.digest_body(&body_path).await?);
            if !digest.eq_ignore_ascii_case(expected) {
                tracing::warn!(url = %key, "cached artifact checksum mismatch");
                return Ok(IntegrityStatus::ChecksumMismatch);
            }
        }

        Ok(IntegrityStatus::Ok)
    }

    async fn write_body_stream<S, E>(
        &self,
        body_tmp: &std::path::Path,
        stream: S,
    ) -> Result<u64, PutStreamError<E>>
    where
        S: Stream<Item = Result<Bytes, E>> + Send,
    {
        let mut file = fs::File::create(body_tmp)
            .await
            .map_err(|e| PutStreamError::Cache(e.into()))?;
        let mut written: u64 = 0;

        let mut stream = std::pin::pin!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(PutStreamError::Source)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| PutStreamError::Cache(e.into()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| PutStreamError::Cache(e.into()))?;

        Ok(written)
    }

    async fn write_sidecar(
        &self,
        dir: &std::path::Path,
        key: &ResourceKey,
        content_length: u64,
        content_type: Option<&str>,
    ) -> CacheResult<()> {
        let meta = EntryMeta {
            url: key.as_str().to_string(),
            content_length,
            content_type: content_type.map(str::to_owned),
        };
        let bytes = meta.encode()?;

        let tmp = dir.join(format!("{ENTRY_FILE}.tmp"));
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, dir.join(ENTRY_FILE)).await?;

        tracing::debug!(url = %key, bytes = content_length, "cache entry written");
        Ok(())
    }

    /// Streaming sha256 over the body; artifacts are too large to slurp.
    async fn digest_body(&self, body_path: &std::path::Path) -> CacheResult<[u8; 32]> {
        let mut file = fs::File::open(body_path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(hasher.finalize().into())
    }
}
