use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::Client;
use url::Url;

use crate::{
    error::{NetError, NetResult},
    traits::{HttpResponse, Net},
    types::{Headers, NetOptions, RangeSpec},
};

#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    /// Build a client from options.
    ///
    /// # Panics
    ///
    /// Panics if the underlying TLS backend cannot be initialized; this is a
    /// process-configuration failure, not a runtime condition.
    #[must_use]
    pub fn new(options: NetOptions) -> Self {
        let inner = Client::builder()
            .connect_timeout(options.connect_timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .expect("failed to build reqwest client");
        Self { inner, options }
    }

    pub fn options(&self) -> &NetOptions {
        &self.options
    }

    fn apply_headers(
        mut req: reqwest::RequestBuilder,
        headers: Option<Headers>,
    ) -> reqwest::RequestBuilder {
        if let Some(headers) = headers {
            for (k, v) in headers.iter() {
                req = req.header(k, v);
            }
        }
        req
    }

    fn collect_headers(resp: &reqwest::Response) -> Headers {
        let mut out = Headers::new();
        for (name, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                out.insert(name.as_str(), v);
            }
        }
        out
    }

    pub async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> NetResult<Bytes> {
        <Self as Net>::get_bytes(self, url, headers).await
    }

    pub async fn get_streaming(
        &self,
        url: Url,
        range: Option<RangeSpec>,
        headers: Option<Headers>,
    ) -> NetResult<HttpResponse> {
        <Self as Net>::get_streaming(self, url, range, headers).await
    }

    pub async fn head(&self, url: Url, headers: Option<Headers>) -> NetResult<Headers> {
        <Self as Net>::head(self, url, headers).await
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> Result<Bytes, NetError> {
        let req = self.inner.get(url.clone());
        let req = Self::apply_headers(req, headers);

        let resp = req.send().await.map_err(NetError::from)?;
        let status = resp.status();

        if !status.is_success() {
            return Err(NetError::HttpError {
                status: status.as_u16(),
                url,
            });
        }

        resp.bytes().await.map_err(NetError::from)
    }

    async fn get_streaming(
        &self,
        url: Url,
        range: Option<RangeSpec>,
        headers: Option<Headers>,
    ) -> Result<HttpResponse, NetError> {
        let mut req = self.inner.get(url.clone());
        if let Some(range) = &range {
            req = req.header("Range", range.to_header_value());
        }
        req = Self::apply_headers(req, headers);

        let resp = req.send().await.map_err(NetError::from)?;
        let status = resp.status().as_u16();
        let response_headers = Self::collect_headers(&resp);

        tracing::debug!(url = %url, status, range = ?range.map(|r| r.to_header_value()), "opened streaming response");

        let body = resp.bytes_stream().map_err(NetError::from);
        Ok(HttpResponse {
            status,
            headers: response_headers,
            body: Box::pin(body),
        })
    }

    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError> {
        let req = self.inner.head(url.clone());
        let req = Self::apply_headers(req, headers);

        let resp = req.send().await.map_err(NetError::from)?;
        let status = resp.status();

        if !status.is_success() {
            return Err(NetError::HttpError {
                status: status.as_u16(),
                url,
            });
        }

        Ok(Self::collect_headers(&resp))
    }
}
