use std::{collections::HashMap, time::Duration};

/// Case-insensitive header map.
///
/// Keys are normalized to lowercase on insert; `reqwest` already hands them
/// over that way, normalizing covers headers built by callers and tests.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Parsed `Content-Length`, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.get("content-length").and_then(|v| v.parse().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get("content-type")
    }

    /// Entity validator as sent by the server, quotes and weak prefix kept.
    pub fn etag(&self) -> Option<&str> {
        self.get("etag")
    }

    pub fn content_range(&self) -> Option<&str> {
        self.get("content-range")
    }
}

impl From<HashMap<String, String>> for Headers {
    fn from(map: HashMap<String, String>) -> Self {
        let mut headers = Self::new();
        for (k, v) in map {
            headers.insert(k, v);
        }
        headers
    }
}

/// Byte range for a resume request, formatted as `bytes=<start>-[<end>]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: Option<u64>,
}

impl RangeSpec {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Open-ended range from `start` to the end of the resource.
    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn to_header_value(&self) -> String {
        if let Some(end) = self.end {
            format!("bytes={}-{}", self.start, end)
        } else {
            format!("bytes={}-", self.start)
        }
    }
}

#[derive(Clone, Debug)]
pub struct NetOptions {
    /// Timeout for establishing the connection. Whole-request timeouts are
    /// deliberately absent: artifact bodies run into the hundreds of
    /// megabytes and take as long as they take.
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Length", "42");

        assert_eq!(headers.get("content-length"), Some("42"));
        assert_eq!(headers.get("CONTENT-LENGTH"), Some("42"));
        assert_eq!(headers.content_length(), Some(42));
    }

    #[test]
    fn content_length_ignores_garbage() {
        let mut headers = Headers::new();
        headers.insert("content-length", "many");

        assert_eq!(headers.content_length(), None);
    }

    #[test]
    fn range_spec_header_values() {
        assert_eq!(RangeSpec::from_start(5).to_header_value(), "bytes=5-");
        assert_eq!(
            RangeSpec::new(0, Some(4)).to_header_value(),
            "bytes=0-4"
        );
    }
}
