use url::Url;

use crate::error::{CoreError, CoreResult};

/// Canonical form of a resource URL.
///
/// Two URLs that differ only in scheme/host case, an explicit default port,
/// or the fragment identify the same resource. The query is kept: signed
/// artifact URLs carry tokens that select different bytes.
pub fn canonicalize_url(url: &Url) -> CoreResult<String> {
    if url.scheme().is_empty() {
        return Err(CoreError::MissingComponent("scheme".to_string()));
    }
    if url.host().is_none() {
        return Err(CoreError::MissingComponent("host".to_string()));
    }

    let mut canonical = url.clone();

    canonical.set_fragment(None);

    let scheme_lower = canonical.scheme().to_lowercase();
    if canonical.scheme() != scheme_lower {
        let _ = canonical.set_scheme(&scheme_lower);
    }

    if let Some(host) = canonical.host_str() {
        let host_lower = host.to_lowercase();
        if host != host_lower {
            let _ = canonical.set_host(Some(&host_lower));
        }
    }

    match (canonical.scheme(), canonical.port()) {
        ("https", Some(443)) | ("http", Some(80)) => {
            let _ = canonical.set_port(None);
        }
        _ => {}
    }

    Ok(canonical.to_string())
}
