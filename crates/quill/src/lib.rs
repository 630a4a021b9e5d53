#![forbid(unsafe_code)]

//! # quill
//!
//! Facade over the Quill model-artifact download core.
//!
//! The OCR application acquires its vision-model weights through
//! [`FetchManager`]:
//!
//! ```ignore
//! let manager = FetchManager::new(FetchConfig::new(data_dir)).await?;
//! manager
//!     .acquire("https://cdn.example.com/quill/encoder.onnx", Some(progress))
//!     .await?;
//! let weights = manager.cached(url).await?.expect("just acquired").bytes().await?;
//! ```
//!
//! Downloads are chunked through a persistent store so interrupted fetches
//! resume where they left off, deduplicated per URL, bounded in concurrency,
//! and degrade to in-memory buffering when local storage runs out of quota.

pub use quill_cache::{CacheEntry, ContentCache, IntegrityStatus};
pub use quill_core::ResourceKey;
pub use quill_fetch::{
    FetchConfig, FetchError, FetchEvent, FetchManager, FetchResult, JobStatus, Progress,
    ProgressFn, QuotaHandler,
};
pub use quill_net::{HttpClient, NetOptions};
pub use quill_store::{ChunkMeta, ChunkStore, StoreOptions};
