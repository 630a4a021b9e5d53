use sha2::{Digest, Sha256};
use url::Url;

use crate::{
    canonicalize::canonicalize_url,
    error::{CoreError, CoreResult},
};

/// Canonical identity of a downloadable resource.
///
/// Wraps the canonicalized URL together with the sha256 digest both stores
/// use as the resource's directory name. Equality and hashing follow the
/// canonical form, so `HTTPS://Host/x` and `https://host/x` collapse to one
/// key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    canonical: String,
    digest: [u8; 32],
}

impl ResourceKey {
    pub fn parse(url: &str) -> CoreResult<Self> {
        let url = Url::parse(url).map_err(|e| CoreError::InvalidUrl(e.to_string()))?;
        Self::from_url(&url)
    }

    pub fn from_url(url: &Url) -> CoreResult<Self> {
        let canonical = canonicalize_url(url)?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(Self {
            canonical,
            digest: digest.into(),
        })
    }

    /// Canonical URL string this key was derived from.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Hex directory name used by the on-disk stores.
    pub fn hex_name(&self) -> String {
        hex::encode(self.digest)
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical)
    }
}
