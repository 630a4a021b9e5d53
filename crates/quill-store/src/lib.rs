#![forbid(unsafe_code)]

//! # quill-store
//!
//! Durable chunk store for in-flight downloads.
//!
//! A download job flushes bounded chunks here as they arrive off the wire;
//! after an interruption a later job resumes from the persisted
//! [`ChunkMeta`]. Once a resource is complete the scheduler streams the
//! chunks back out into the content cache and clears this store, so entries
//! are transient by design.
//!
//! ## Disk layout
//!
//! `<root>/<store_name>-v<version>/<hex(sha256(url))>/` containing `meta.bin`
//! (bincode [`ChunkMeta`]) and one `%08d.chunk` file per chunk. Chunk data
//! and metadata are committed in two temp+rename steps ordered so that
//! metadata never references a chunk that is not on disk.

mod error;
mod meta;
mod store;

pub use error::{StoreError, StoreResult};
pub use meta::ChunkMeta;
pub use store::{ChunkStore, ChunkStream, StoreOptions};
