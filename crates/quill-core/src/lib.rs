#![forbid(unsafe_code)]

//! # quill-core
//!
//! Shared resource identifiers for the Quill download core.
//!
//! A resource is an immutable byte sequence addressed by URL. Both the chunk
//! store and the content cache key their on-disk state by [`ResourceKey`],
//! which canonicalizes the URL and derives a stable directory name from its
//! sha256 digest.

mod canonicalize;
mod error;
mod key;

pub use canonicalize::canonicalize_url;
pub use error::{CoreError, CoreResult};
pub use key::ResourceKey;
