use std::time::Instant;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use quill_core::ResourceKey;
use quill_net::{HttpClient, RangeSpec};
use quill_store::{ChunkMeta, ChunkStore, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::{
    classify::{ResponseClass, classify_response},
    error::FetchError,
    events::{EventBus, FetchEvent},
    manager::QuotaHandler,
    progress::{Progress, ProgressFn, SpeedMeter},
};

/// How a finished job hands its bytes to the finalizer.
pub(crate) enum JobOutcome {
    /// All chunks persisted; finalize by streaming them out of the store.
    Persisted {
        meta: ChunkMeta,
        content_type: Option<String>,
    },
    /// Chunks buffered in process memory (no store, or quota fallback).
    Memory {
        chunks: Vec<Bytes>,
        total_bytes: u64,
        content_type: Option<String>,
    },
}

/// One resource acquisition: resumable, cancellable, quota-aware.
///
/// The job is created per admission by the scheduler and consumed by
/// [`DownloadJob::run`]; restart-after-pause is a fresh job resuming from
/// whatever [`ChunkMeta`] survived.
pub(crate) struct DownloadJob {
    pub(crate) key: ResourceKey,
    pub(crate) url: Url,
    pub(crate) net: HttpClient,
    pub(crate) store: Option<ChunkStore>,
    pub(crate) flush_window: usize,
    pub(crate) cancel: CancellationToken,
    pub(crate) progress: ProgressFn,
    pub(crate) events: EventBus,
    pub(crate) quota: Option<QuotaHandler>,
}

#[derive(Default)]
struct ResumePoint {
    start_byte: u64,
    next_index: u64,
    validator: Option<String>,
}

impl DownloadJob {
    pub(crate) async fn run(self) -> Result<JobOutcome, FetchError> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        // Resumption check. Metadata claiming zero bytes is stale state from
        // an append that never happened; clear it rather than resume onto it.
        let mut resume = ResumePoint::default();
        if let Some(store) = &self.store {
            match store.metadata(&self.key).await {
                Some(meta) if meta.downloaded_bytes > 0 => {
                    debug!(
                        url = %self.key,
                        start = meta.downloaded_bytes,
                        chunks = meta.chunk_count,
                        "resuming from persisted chunks"
                    );
                    resume = ResumePoint {
                        start_byte: meta.downloaded_bytes,
                        next_index: meta.chunk_count,
                        validator: meta.validator,
                    };
                }
                Some(_) => store.clear(&self.key).await?,
                None => {}
            }
        }

        let range = (resume.start_byte > 0).then(|| RangeSpec::from_start(resume.start_byte));
        let mut resp = self
            .net
            .get_streaming(self.url.clone(), range, None)
            .await?;

        // Validator drift: whatever else this response means, a different
        // validator invalidates every persisted byte. Never mix bytes from
        // two resource versions; the scheduler owns the retry.
        if let (Some(persisted), Some(served)) =
            (resume.validator.as_deref(), resp.headers.etag())
            && persisted != served
        {
            warn!(url = %self.key, persisted, served, "validator changed; discarding partial data");
            if let Some(store) = &self.store {
                store.clear(&self.key).await?;
            }
            return Err(FetchError::ValidatorChanged);
        }

        let mut total_bytes;
        match classify_response(resume.start_byte, resp.status, &resp.headers) {
            ResponseClass::Fresh { total_bytes: t } | ResponseClass::Resumed { total_bytes: t } => {
                total_bytes = t;
            }
            ResponseClass::RangeIgnored { total_bytes: t } => {
                debug!(url = %self.key, "server ignored range header; consuming from offset 0");
                if let Some(store) = &self.store {
                    store.clear(&self.key).await?;
                }
                resume = ResumePoint::default();
                total_bytes = t;
            }
            ResponseClass::AlreadyComplete { total_bytes: t } => {
                debug!(url = %self.key, total = t, "persisted chunks already cover the resource");
                let meta = match &self.store {
                    Some(store) => store.metadata(&self.key).await,
                    None => None,
                }
                .ok_or_else(|| {
                    FetchError::Integrity("server reports complete but no chunk metadata".into())
                })?;
                (self.progress)(Progress {
                    loaded: t,
                    total: t,
                    speed_bps: 0.0,
                });
                return Ok(JobOutcome::Persisted {
                    meta,
                    content_type: None,
                });
            }
            ResponseClass::RestartFromScratch => {
                debug!(url = %self.key, "range not satisfiable; restarting from zero");
                if let Some(store) = &self.store {
                    store.clear(&self.key).await?;
                }
                resume = ResumePoint::default();
                resp = self.net.get_streaming(self.url.clone(), None, None).await?;
                total_bytes = match classify_response(0, resp.status, &resp.headers) {
                    ResponseClass::Fresh { total_bytes } => total_bytes,
                    ResponseClass::Http { status } => {
                        return Err(FetchError::Http { status });
                    }
                    other => {
                        return Err(FetchError::Network(format!(
                            "unexpected response to restarted request: {other:?}"
                        )));
                    }
                };
            }
            ResponseClass::Http { status } => return Err(FetchError::Http { status }),
        }

        let server_validator = resp.headers.etag().map(str::to_owned);
        let content_type = resp.headers.content_type().map(str::to_owned);

        let mut sink = match self.store.clone() {
            Some(store) => ChunkSink::store(store, server_validator, resume.next_index),
            None => ChunkSink::memory(),
        };

        let mut buf = BytesMut::new();
        let mut loaded = resume.start_byte;
        let mut meter = SpeedMeter::new(Instant::now());
        let mut body = resp.body;

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    // The unflushed tail is simply dropped: only flushed
                    // chunks are accounted in metadata, so the store stays
                    // consistent for a later resume.
                    debug!(url = %self.key, loaded, "download paused");
                    return Err(FetchError::Cancelled);
                }

                next = body.next() => {
                    let Some(next) = next else { break };
                    let bytes = next.map_err(|e| FetchError::Network(e.to_string()))?;
                    if bytes.is_empty() {
                        continue;
                    }

                    buf.extend_from_slice(&bytes);
                    loaded += bytes.len() as u64;
                    let speed = meter.record(bytes.len() as u64, Instant::now());
                    (self.progress)(Progress { loaded, total: total_bytes, speed_bps: speed });
                    self.events.publish(FetchEvent::Progress {
                        url: self.key.to_string(),
                        loaded,
                        total: total_bytes,
                    });

                    while buf.len() >= self.flush_window {
                        let chunk = buf.split_to(self.flush_window).freeze();
                        sink.push(chunk, total_bytes, self.quota.as_ref(), &self.key, &self.events)
                            .await?;
                    }
                }
            }
        }

        // The final flush carries the definitive total so metadata finishes
        // complete even when Content-Length was never sent. If the size was
        // unknown and the body ended exactly on a flush boundary, every
        // in-loop append ran with total 0, so a zero-length terminal append
        // stamps the total on its own.
        let total_was_unknown = total_bytes == 0;
        if total_was_unknown {
            total_bytes = loaded;
        }
        if !buf.is_empty() || (total_was_unknown && loaded > 0) {
            let chunk = buf.split_to(buf.len()).freeze();
            sink.push(chunk, total_bytes, self.quota.as_ref(), &self.key, &self.events)
                .await?;
        }

        match sink.into_mode() {
            SinkMode::Memory(chunks) => Ok(JobOutcome::Memory {
                chunks,
                total_bytes,
                content_type,
            }),
            SinkMode::Store { store, .. } => {
                let meta = store.metadata(&self.key).await.ok_or_else(|| {
                    FetchError::Integrity("chunk metadata missing after download".into())
                })?;
                Ok(JobOutcome::Persisted { meta, content_type })
            }
        }
    }
}

enum SinkMode {
    Store {
        store: ChunkStore,
        validator: Option<String>,
    },
    Memory(Vec<Bytes>),
}

/// Where flushed chunks go. Starts against the store and may switch to
/// memory once, after which it never switches back.
struct ChunkSink {
    mode: SinkMode,
    next_index: u64,
}

impl ChunkSink {
    fn store(store: ChunkStore, validator: Option<String>, next_index: u64) -> Self {
        Self {
            mode: SinkMode::Store { store, validator },
            next_index,
        }
    }

    fn memory() -> Self {
        Self {
            mode: SinkMode::Memory(Vec::new()),
            next_index: 0,
        }
    }

    fn into_mode(self) -> SinkMode {
        self.mode
    }

    async fn push(
        &mut self,
        chunk: Bytes,
        total_bytes: u64,
        quota: Option<&QuotaHandler>,
        key: &ResourceKey,
        events: &EventBus,
    ) -> Result<(), FetchError> {
        let index = self.next_index;
        let fallback = match &mut self.mode {
            SinkMode::Memory(chunks) => {
                chunks.push(chunk);
                None
            }
            SinkMode::Store { store, validator } => {
                match store
                    .append_chunk(key, index, chunk.clone(), total_bytes, validator.as_deref())
                    .await
                {
                    Ok(_) => None,
                    Err(StoreError::Full) => {
                        let permitted = match quota {
                            Some(handler) => handler().await,
                            None => false,
                        };
                        if !permitted {
                            warn!(url = %key, "store full and memory fallback not permitted");
                            return Err(FetchError::StorageFull);
                        }
                        Some(Self::recover_into_memory(store, key, index, chunk).await?)
                    }
                    // The store vanished before anything was persisted for
                    // this resource; nothing to recover, buffer in memory.
                    Err(StoreError::Unavailable) if index == 0 => Some(vec![chunk]),
                    Err(e) => return Err(e.into()),
                }
            }
        };

        if let Some(chunks) = fallback {
            warn!(url = %key, chunks = chunks.len(), "switched to in-memory buffering");
            events.publish(FetchEvent::MemoryFallback {
                url: key.to_string(),
            });
            self.mode = SinkMode::Memory(chunks);
        }
        self.next_index = index + 1;
        Ok(())
    }

    /// Drain everything persisted so far back into memory, reclaim the
    /// store, and tack the chunk that failed onto the end.
    async fn recover_into_memory(
        store: &ChunkStore,
        key: &ResourceKey,
        persisted_chunks: u64,
        failed: Bytes,
    ) -> Result<Vec<Bytes>, FetchError> {
        let mut chunks = Vec::with_capacity(persisted_chunks as usize + 1);
        if persisted_chunks > 0 {
            let mut stream = store.stream(key, persisted_chunks);
            while let Some(item) = stream.next().await {
                chunks.push(item?);
            }
        }
        store.clear(key).await?;
        chunks.push(failed);
        Ok(chunks)
    }
}
