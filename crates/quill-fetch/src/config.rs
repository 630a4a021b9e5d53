use std::path::PathBuf;

use quill_net::NetOptions;

/// Configuration for [`FetchManager`](crate::FetchManager).
#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// Maximum number of downloads running simultaneously.
    pub max_concurrent: usize,
    /// Buffered-byte threshold at which response data is committed to the
    /// chunk store as one chunk.
    pub flush_window_bytes: usize,
    /// Content cache namespace.
    pub cache_name: String,
    /// Chunk store namespace and schema version.
    pub store_name: String,
    pub store_version: u32,
    /// Directory both stores live under.
    pub root_dir: PathBuf,
    /// When false, no chunk store is opened and every download buffers in
    /// memory; partial progress does not survive the process.
    pub persist_partial: bool,
    pub net: NetOptions,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            flush_window_bytes: 5 * 1024 * 1024,
            cache_name: "transformers-cache".to_string(),
            store_name: "quill-chunks".to_string(),
            store_version: 1,
            root_dir: std::env::temp_dir().join("quill"),
            persist_partial: true,
            net: NetOptions::default(),
        }
    }
}

impl FetchConfig {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_flush_window_bytes(mut self, bytes: usize) -> Self {
        self.flush_window_bytes = bytes.max(1);
        self
    }

    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Disable the chunk store; downloads buffer in memory only.
    pub fn without_persistence(mut self) -> Self {
        self.persist_partial = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = FetchConfig::default();
        assert_eq!(cfg.max_concurrent, 3);
        assert_eq!(cfg.flush_window_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.cache_name, "transformers-cache");
        assert!(cfg.persist_partial);
    }

    #[test]
    fn builders_clamp_degenerate_values() {
        let cfg = FetchConfig::default()
            .with_max_concurrent(0)
            .with_flush_window_bytes(0);
        assert_eq!(cfg.max_concurrent, 1);
        assert_eq!(cfg.flush_window_bytes, 1);
    }
}
