//! Request and response types flowing through the interceptor

use crate::offline_cache::CacheError;
use bytes::Bytes;
use recipe_offline_proto::{ResponseKind, ResponseSnapshot};
use url::Url;

/// An intercepted request
///
/// Transient: only the method, URL and `Vary`-selected header values are ever
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Uppercase HTTP method
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Whether this request loads a full document (top-level navigation)
    pub navigation: bool,
}

impl Request {
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            headers: Vec::new(),
            body: Bytes::new(),
            navigation: false,
        }
    }

    /// Parse `url` and build a GET sub-resource request
    pub fn get(url: &str) -> Result<Self, CacheError> {
        let url = Url::parse(url)
            .map_err(|e| CacheError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self::new("GET", url))
    }

    /// Parse `url` and build a GET navigation request
    pub fn navigate(url: &str) -> Result<Self, CacheError> {
        Ok(Self::get(url)?.as_navigation())
    }

    pub fn as_navigation(mut self) -> Self {
        self.navigation = true;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First header value with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

/// A response body that can be consumed exactly once
///
/// `Body` is deliberately not `Clone`. A response that must reach two
/// consumers has to be split with [`Response::duplicate`] before either of
/// them reads it.
#[derive(Debug, Default)]
pub struct Body {
    data: Bytes,
}

impl Body {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drain the body
    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    // Both halves share the same immutable buffer.
    fn tee(self) -> (Body, Body) {
        let other = Body {
            data: self.data.clone(),
        };
        (self, other)
    }
}

/// A response produced by the network or read back from a cache store
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub kind: ResponseKind,
    body: Body,
}

impl Response {
    pub fn new(status: u16, kind: ResponseKind, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: canonical_reason(status).to_string(),
            headers: Vec::new(),
            kind,
            body: Body::new(body),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// A `200` response of the `basic` type: the only kind that is ever stored
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic
    }

    /// Split into two independent responses before anything reads the body
    pub fn duplicate(self) -> (Response, Response) {
        let Response {
            status,
            status_text,
            headers,
            kind,
            body,
        } = self;
        let (first, second) = body.tee();
        (
            Response {
                status,
                status_text: status_text.clone(),
                headers: headers.clone(),
                kind,
                body: first,
            },
            Response {
                status,
                status_text,
                headers,
                kind,
                body: second,
            },
        )
    }

    pub fn into_body(self) -> Bytes {
        self.body.into_bytes()
    }

    pub fn into_parts(self) -> (u16, Vec<(String, String)>, Bytes) {
        (self.status, self.headers, self.body.into_bytes())
    }

    pub fn into_snapshot(self) -> ResponseSnapshot {
        ResponseSnapshot {
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            kind: self.kind,
            body: self.body.into_bytes().to_vec(),
        }
    }

    pub fn from_snapshot(snapshot: ResponseSnapshot) -> Self {
        Self {
            status: snapshot.status,
            status_text: snapshot.status_text,
            headers: snapshot.headers,
            kind: snapshot.kind,
            body: Body::new(snapshot.body),
        }
    }
}

fn canonical_reason(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}
