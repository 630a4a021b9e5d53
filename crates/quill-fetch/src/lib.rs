#![forbid(unsafe_code)]

//! # quill-fetch
//!
//! Resumable, quota-aware acquisition of large model artifacts.
//!
//! [`FetchManager`] is the narrow interface the rest of the application
//! consumes: `acquire(url, progress)` resolves once the artifact is fully
//! materialized in the content cache, deduplicating concurrent requests for
//! the same URL and bounding how many downloads run at once. Interrupted
//! downloads resume from the chunk store; a full chunk store degrades to
//! in-memory buffering when the installed quota handler permits it.

mod classify;
mod config;
mod error;
mod events;
mod job;
mod manager;
mod progress;

pub use config::FetchConfig;
pub use error::{FetchError, FetchResult};
pub use events::{EventBus, FetchEvent};
pub use manager::{FetchManager, JobStatus, QuotaHandler};
pub use progress::{Progress, ProgressFn};

// The integrity verdict surfaces unchanged through the manager.
pub use quill_cache::IntegrityStatus;
