#![forbid(unsafe_code)]

//! # quill-net
//!
//! Thin async HTTP layer for the Quill download core.
//!
//! [`HttpClient`] wraps `reqwest` behind the [`Net`] trait. The download job
//! classifies responses itself (200 vs 206 vs 416), so the streaming entry
//! point [`Net::get_streaming`] hands back status, response headers and the
//! body stream without judging non-2xx statuses.

mod client;
mod error;
mod traits;
mod types;

pub use client::HttpClient;
pub use error::{NetError, NetResult};
pub use traits::{ByteStream, HttpResponse, Net};
pub use types::{Headers, NetOptions, RangeSpec};
