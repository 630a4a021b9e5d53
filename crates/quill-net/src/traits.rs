use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::{
    error::NetError,
    types::{Headers, RangeSpec},
};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, NetError>> + Send>>;

/// A streaming HTTP response before any status judgement.
///
/// The download job decides what a 200/206/416 means relative to its resume
/// offset, so the client must not collapse non-2xx statuses into errors
/// here.
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: ByteStream,
}

#[async_trait]
pub trait Net: Send + Sync {
    /// Get all bytes from a URL. Fails on non-success statuses.
    async fn get_bytes(&self, url: url::Url, headers: Option<Headers>) -> Result<Bytes, NetError>;

    /// Open a streaming GET, optionally ranged. Returns status + headers +
    /// body for any status the server produced; only transport failures
    /// error.
    async fn get_streaming(
        &self,
        url: url::Url,
        range: Option<RangeSpec>,
        headers: Option<Headers>,
    ) -> Result<HttpResponse, NetError>;

    /// HEAD request returning response headers.
    async fn head(&self, url: url::Url, headers: Option<Headers>) -> Result<Headers, NetError>;
}
