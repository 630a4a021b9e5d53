use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use bytes::BytesMut;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use quill_cache::{CacheEntry, ContentCache, IntegrityStatus, PutStreamError};
use quill_core::ResourceKey;
use quill_net::HttpClient;
use quill_store::{ChunkStore, StoreOptions};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::FetchConfig,
    error::{FetchError, FetchResult},
    events::{EventBus, FetchEvent},
    job::{DownloadJob, JobOutcome},
    progress::{Progress, ProgressFn},
};

/// Async callback consulted when the chunk store reports it is full;
/// returning `true` permits in-memory buffering for the rest of the job.
pub type QuotaHandler = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

/// Lifecycle of one tracked acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Errored,
}

struct JobEntry {
    status: Mutex<JobStatus>,
    /// Replaced by the newest deduplicated subscriber; the terminal result
    /// is still broadcast to every waiter.
    progress_fn: Mutex<Option<ProgressFn>>,
    latest: Mutex<Progress>,
    waiters: Mutex<Vec<oneshot::Sender<FetchResult<()>>>>,
    cancel: tokio_util::sync::CancellationToken,
}

impl JobEntry {
    fn new(progress: Option<ProgressFn>) -> Self {
        Self {
            status: Mutex::new(JobStatus::Pending),
            progress_fn: Mutex::new(progress),
            latest: Mutex::new(Progress::default()),
            waiters: Mutex::new(Vec::new()),
            cancel: tokio_util::sync::CancellationToken::new(),
        }
    }
}

/// Process-wide download coordinator.
///
/// One instance per cache namespace, constructed at startup and threaded
/// through to whoever needs artifacts; cloning shares the same state.
#[derive(Clone)]
pub struct FetchManager {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: FetchConfig,
    net: HttpClient,
    store: Option<ChunkStore>,
    cache: ContentCache,
    events: EventBus,
    quota: Mutex<Option<QuotaHandler>>,
    jobs: Mutex<HashMap<String, Arc<JobEntry>>>,
    queue: Mutex<VecDeque<ResourceKey>>,
    running: AtomicUsize,
}

impl FetchManager {
    /// Open the stores under `cfg.root_dir` and build the manager.
    ///
    /// An unusable chunk store degrades to memory-only downloads rather than
    /// failing construction; an unusable content cache is fatal.
    pub async fn new(cfg: FetchConfig) -> FetchResult<Self> {
        let net = HttpClient::new(cfg.net.clone());
        let cache = ContentCache::open(&cfg.root_dir, &cfg.cache_name).await?;
        let store = if cfg.persist_partial {
            match ChunkStore::open(StoreOptions {
                root_dir: cfg.root_dir.clone(),
                store_name: cfg.store_name.clone(),
                store_version: cfg.store_version,
            })
            .await
            {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!(error = %e, "chunk store unavailable; downloads will buffer in memory");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self::with_parts(cfg, net, store, cache))
    }

    /// Assemble a manager from already-constructed parts.
    pub fn with_parts(
        cfg: FetchConfig,
        net: HttpClient,
        store: Option<ChunkStore>,
        cache: ContentCache,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                net,
                store,
                cache,
                events: EventBus::new(64),
                quota: Mutex::new(None),
                jobs: Mutex::new(HashMap::new()),
                queue: Mutex::new(VecDeque::new()),
                running: AtomicUsize::new(0),
            }),
        }
    }

    /// Acquire `url` into the content cache.
    ///
    /// Resolves `Ok(())` once the artifact is fully cached; a cached
    /// non-empty entry short-circuits without touching the network.
    /// Concurrent calls for the same URL attach to the same job.
    pub async fn acquire(&self, url: &str, progress: Option<ProgressFn>) -> FetchResult<()> {
        let key = ResourceKey::parse(url)?;

        if let Some(entry) = self.inner.cache.get(&key).await?
            && entry.content_length() > 0
        {
            debug!(url = %key, bytes = entry.content_length(), "cache hit; acquisition is a no-op");
            if let Some(progress) = &progress {
                progress(Progress {
                    loaded: entry.content_length(),
                    total: entry.content_length(),
                    speed_bps: 0.0,
                });
            }
            return Ok(());
        }

        let rx = self.subscribe(&key, progress);
        Arc::clone(&self.inner).pump();
        rx.await.unwrap_or(Err(FetchError::Cancelled))
    }

    /// Abort a running download or drop a queued one. The waiting `acquire`
    /// calls resolve with [`FetchError::Cancelled`]; persisted partial state
    /// survives for a later resume.
    pub fn cancel(&self, url: &str) {
        let Ok(key) = ResourceKey::parse(url) else {
            return;
        };

        let was_queued = {
            let mut queue = self.inner.queue.lock();
            let before = queue.len();
            queue.retain(|queued| queued != &key);
            queue.len() != before
        };

        let entry = self.inner.jobs.lock().get(key.as_str()).cloned();
        let Some(entry) = entry else { return };
        entry.cancel.cancel();

        if was_queued {
            // Never admitted; no task will resolve the waiters for us.
            self.inner.finish(&key, &entry, Err(FetchError::Cancelled));
        }
    }

    /// Install the callback consulted on `StorageFull`.
    pub fn set_quota_handler(&self, handler: QuotaHandler) {
        *self.inner.quota.lock() = Some(handler);
    }

    /// Verify a cached artifact (size, and checksum when supplied).
    pub async fn check_integrity(
        &self,
        url: &str,
        expected_checksum: Option<&str>,
    ) -> FetchResult<IntegrityStatus> {
        let key = ResourceKey::parse(url)?;
        Ok(self
            .inner
            .cache
            .check_integrity(&key, expected_checksum)
            .await?)
    }

    /// Remove a cached artifact. Idempotent.
    pub async fn delete(&self, url: &str) -> FetchResult<()> {
        let key = ResourceKey::parse(url)?;
        Ok(self.inner.cache.delete(&key).await?)
    }

    /// Read back a completed artifact.
    pub async fn cached(&self, url: &str) -> FetchResult<Option<CacheEntry>> {
        let key = ResourceKey::parse(url)?;
        Ok(self.inner.cache.get(&key).await?)
    }

    /// Status of the tracked job for `url`, if one exists.
    pub fn job_status(&self, url: &str) -> Option<JobStatus> {
        let key = ResourceKey::parse(url).ok()?;
        let jobs = self.inner.jobs.lock();
        jobs.get(key.as_str()).map(|entry| *entry.status.lock())
    }

    /// Subscribe to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<FetchEvent> {
        self.inner.events.subscribe()
    }

    fn subscribe(
        &self,
        key: &ResourceKey,
        progress: Option<ProgressFn>,
    ) -> oneshot::Receiver<FetchResult<()>> {
        let (tx, rx) = oneshot::channel();
        let mut jobs = self.inner.jobs.lock();
        if let Some(entry) = jobs.get(key.as_str()) {
            debug!(url = %key, "attaching to in-flight download");
            *entry.progress_fn.lock() = progress;
            entry.waiters.lock().push(tx);
        } else {
            let entry = Arc::new(JobEntry::new(progress));
            entry.waiters.lock().push(tx);
            jobs.insert(key.as_str().to_string(), entry);
            self.inner.queue.lock().push_back(key.clone());
        }
        rx
    }
}

impl Inner {
    /// Drain the queue into the active set up to `max_concurrent`.
    fn pump(self: Arc<Self>) {
        loop {
            let key = {
                let mut queue = self.queue.lock();
                if self.running.load(Ordering::Acquire) >= self.cfg.max_concurrent {
                    return;
                }
                let Some(key) = queue.pop_front() else { return };
                self.running.fetch_add(1, Ordering::AcqRel);
                key
            };

            let inner = Arc::clone(&self);
            tokio::spawn(async move {
                inner.drive(key).await;
            });
        }
    }

    async fn drive(self: Arc<Self>, key: ResourceKey) {
        let entry = self.jobs.lock().get(key.as_str()).cloned();
        if let Some(entry) = entry {
            self.run_tracked(&key, &entry).await;
        }
        self.running.fetch_sub(1, Ordering::AcqRel);
        // Admission continues as jobs leave the active set.
        self.pump();
    }

    async fn run_tracked(&self, key: &ResourceKey, entry: &Arc<JobEntry>) {
        if entry.cancel.is_cancelled() {
            self.finish(key, entry, Err(FetchError::Cancelled));
            return;
        }

        *entry.status.lock() = JobStatus::Running;
        self.events.publish(FetchEvent::Started {
            url: key.to_string(),
        });

        let mut result = self.run_job(key, entry).await;
        if matches!(result, Err(FetchError::ValidatorChanged)) {
            // The job already cleared the stale chunks; one fresh attempt.
            debug!(url = %key, "retrying once after validator change");
            result = self.run_job(key, entry).await;
        }

        let result = match result {
            Ok(outcome) => self.finalize(key, outcome).await,
            Err(e) => Err(e),
        };
        self.finish(key, entry, result);
    }

    async fn run_job(
        &self,
        key: &ResourceKey,
        entry: &Arc<JobEntry>,
    ) -> Result<JobOutcome, FetchError> {
        let url = Url::parse(key.as_str()).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let progress: ProgressFn = {
            let entry = Arc::clone(entry);
            Arc::new(move |progress: Progress| {
                *entry.latest.lock() = progress;
                let callback = entry.progress_fn.lock().clone();
                if let Some(callback) = callback {
                    callback(progress);
                }
            })
        };

        let job = DownloadJob {
            key: key.clone(),
            url,
            net: self.net.clone(),
            store: self.store.clone(),
            flush_window: self.cfg.flush_window_bytes,
            cancel: entry.cancel.clone(),
            progress,
            events: self.events.clone(),
            quota: self.quota.lock().clone(),
        };
        job.run().await
    }

    /// Turn a completed job's chunks into one cache entry and reclaim the
    /// transient store. Waiters resolve only after this returns.
    async fn finalize(&self, key: &ResourceKey, outcome: JobOutcome) -> FetchResult<()> {
        match outcome {
            JobOutcome::Memory {
                chunks,
                total_bytes,
                content_type,
            } => {
                if total_bytes == 0 || chunks.is_empty() {
                    return Err(FetchError::Integrity("empty download".into()));
                }
                let mut body = BytesMut::with_capacity(total_bytes as usize);
                for chunk in &chunks {
                    body.extend_from_slice(chunk);
                }
                if body.len() as u64 != total_bytes {
                    return Err(FetchError::Integrity(format!(
                        "buffered {} bytes, expected {total_bytes}",
                        body.len()
                    )));
                }
                self.cache
                    .put(key, body.freeze(), content_type.as_deref())
                    .await?;
            }
            JobOutcome::Persisted { meta, content_type } => {
                let Some(store) = &self.store else {
                    return Err(FetchError::Integrity(
                        "persisted outcome without a chunk store".into(),
                    ));
                };
                if !meta.is_complete() {
                    store.clear(key).await.ok();
                    return Err(FetchError::Integrity(format!(
                        "downloaded {} of {} bytes",
                        meta.downloaded_bytes, meta.total_bytes
                    )));
                }

                let chunk_stream = store.stream(key, meta.chunk_count);
                match self
                    .cache
                    .put_stream(key, chunk_stream, content_type.as_deref())
                    .await
                {
                    Ok(written) if written == meta.total_bytes => {}
                    Ok(written) => {
                        self.cache.delete(key).await.ok();
                        store.clear(key).await.ok();
                        return Err(FetchError::Integrity(format!(
                            "assembled {written} bytes, expected {}",
                            meta.total_bytes
                        )));
                    }
                    Err(PutStreamError::Source(gap)) => {
                        // A gap in the chunk store is unrecoverable.
                        store.clear(key).await.ok();
                        return Err(gap.into());
                    }
                    Err(PutStreamError::Cache(e)) => return Err(e.into()),
                }

                store.clear(key).await?;
            }
        }

        debug!(url = %key, "artifact finalized into content cache");
        Ok(())
    }

    fn finish(&self, key: &ResourceKey, entry: &Arc<JobEntry>, result: FetchResult<()>) {
        *entry.status.lock() = match &result {
            Ok(()) => JobStatus::Completed,
            Err(FetchError::Cancelled) => JobStatus::Paused,
            Err(_) => JobStatus::Errored,
        };

        match &result {
            Ok(()) => {
                let latest = *entry.latest.lock();
                self.events.publish(FetchEvent::Completed {
                    url: key.to_string(),
                    total_bytes: latest.total,
                });
            }
            Err(e) => self.events.publish(FetchEvent::Failed {
                url: key.to_string(),
                error: e.to_string(),
            }),
        }

        // Remove the entry and drain its waiters under the jobs lock.
        // `subscribe` pushes waiters while holding that lock, so a
        // concurrent acquire either attaches before the removal (and is
        // drained here) or finds no entry and starts a fresh job; a waiter
        // can never slip in between drain and removal and go unresolved.
        let waiters: Vec<_> = {
            let mut jobs = self.jobs.lock();
            jobs.remove(key.as_str());
            entry.waiters.lock().drain(..).collect()
        };
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}
