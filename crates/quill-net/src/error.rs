use reqwest::Error as ReqwestError;
use thiserror::Error;
use url::Url;

pub type NetResult<T> = Result<T, NetError>;

/// Centralized error type for quill-net.
///
/// `Clone` is part of the contract: download results are broadcast to every
/// deduplicated waiter, so transport errors are carried as strings rather
/// than as the non-cloneable `reqwest::Error`.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Timeout")]
    Timeout,
    #[error("HTTP {status} for URL: {url}")]
    HttpError { status: u16, url: Url },
}

impl From<ReqwestError> for NetError {
    fn from(e: ReqwestError) -> Self {
        if e.is_timeout() {
            return Self::Timeout;
        }
        // Alternate formatting includes the full source chain
        // (e.g. "error sending request ... : connection refused").
        Self::Http(format!("{e:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_names_status_and_url() {
        let err = NetError::HttpError {
            status: 404,
            url: Url::parse("http://example.com/missing").unwrap(),
        };

        assert_eq!(
            err.to_string(),
            "HTTP 404 for URL: http://example.com/missing"
        );
    }

    #[test]
    fn net_error_is_clone_and_send_sync() {
        fn assert_clone_send_sync<T: Clone + Send + Sync>() {}
        assert_clone_send_sync::<NetError>();
    }
}
