//! Cache key derivation and `Vary` matching

use crate::offline_cache::{CacheError, Request, Response};
use sha2::{Digest, Sha256};
use url::Url;

/// Stored bodies are always identity-encoded (the fetcher never forwards
/// `Accept-Encoding`), so this header never splits entries.
const IGNORED_VARY: &[&str] = &["accept-encoding"];

/// Compute the SHA-256 hex digest of data
pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// URL as it is keyed in a store: fragment removed, query preserved
pub fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

/// Store key for a request: hash of method and normalized URL
pub fn entry_key(request: &Request) -> String {
    let material = format!("{} {}", request.method, normalize_url(&request.url));
    sha256(material.as_bytes())
}

/// Rejects requests a store must never hold
pub fn ensure_storable(request: &Request) -> Result<(), CacheError> {
    if !request.is_get() {
        return Err(CacheError::UnsupportedMethod(request.method.clone()));
    }
    Ok(())
}

/// Lowercased header names listed in the response's `Vary` header
pub fn vary_names(response: &Response) -> Vec<String> {
    response
        .headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("vary"))
        .flat_map(|(_, value)| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty() && !IGNORED_VARY.contains(&name.as_str()))
        .collect()
}

/// Capture the request's values for every header the response varies on
pub fn vary_snapshot(request: &Request, response: &Response) -> Vec<(String, Option<String>)> {
    vary_names(response)
        .into_iter()
        .map(|name| {
            let value = request.header(&name).map(str::to_string);
            (name, value)
        })
        .collect()
}

/// Whether a stored entry's `Vary` capture matches an incoming request
///
/// `Vary: *` never matches.
pub fn vary_matches(stored: &[(String, Option<String>)], request: &Request) -> bool {
    stored.iter().all(|(name, value)| {
        name != "*" && request.header(name) == value.as_deref()
    })
}
