use serde::{Deserialize, Serialize};

/// How the response relates to the requesting origin.
///
/// Mirrors the response types a browser exposes: only `Basic` responses are
/// same-origin, non-opaque and non-redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ResponseKind {
    Basic = 0,
    Cors = 1,
    Opaque = 2,
    OpaqueRedirect = 3,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Cors => "cors",
            Self::Opaque => "opaque",
            Self::OpaqueRedirect => "opaqueredirect",
        }
    }
}

/// The part of a request that identifies a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub method: String,
    pub url: String,
    /// Request header values captured for every name in the response's `Vary`
    /// header. `None` means the request did not carry that header.
    pub vary: Vec<(String, Option<String>)>,
}

/// A stored response, fully buffered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>, // (name, value) pairs, order preserved
    pub kind: ResponseKind,
    pub body: Vec<u8>,
}

/// One request → response pair as persisted in a cache store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub request: RequestSnapshot,
    pub response: ResponseSnapshot,
    pub stored_at: u64, // Unix timestamp in milliseconds
}
