//! Network fetcher backed by reqwest

use crate::config::OfflineConfig;
use crate::offline_cache::{CacheError, Fetcher, Request, Response, ResponseKind};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::{Origin, Url};

/// Request headers never forwarded upstream. `accept-encoding` is dropped so
/// that every body is identity-encoded and safe to replay to any client.
const SKIP_REQUEST_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "content-length",
    "accept-encoding",
];

/// Fetches requests from the network on behalf of the worker
///
/// Redirects are not followed: a redirect comes back as an
/// `opaqueredirect` response for the client to follow.
pub struct HttpFetcher {
    client: Client,
    origin: Origin,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(
        origin: &Url,
        timeout: Duration,
        max_body_bytes: usize,
        user_agent: &str,
    ) -> Result<Self, CacheError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            origin: origin.origin(),
            max_body_bytes,
        })
    }

    pub fn from_config(config: &OfflineConfig) -> Result<Self, CacheError> {
        Self::new(
            &config.upstream,
            config.fetch_timeout(),
            config.max_body_bytes,
            &config.user_agent,
        )
    }

    /// Response type as a browser would report it for this request
    pub fn classify(&self, url: &Url, status: u16) -> ResponseKind {
        if (300..400).contains(&status) {
            ResponseKind::OpaqueRedirect
        } else if url.origin() == self.origin {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, CacheError> {
        if !request.is_http() {
            return Err(CacheError::Network(format!(
                "cannot fetch {} URLs: {}",
                request.scheme(),
                request.url
            )));
        }

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| CacheError::Network(format!("invalid method {}: {}", request.method, e)))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            if SKIP_REQUEST_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        debug!("Fetching {} {}", request.method, request.url);
        let mut response = builder.send().await?;

        let status = response.status().as_u16();
        let kind = self.classify(response.url(), status);
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        if let Some(len) = response.content_length() {
            if len as usize > self.max_body_bytes {
                return Err(CacheError::Network(format!(
                    "response body of {} is {} bytes, limit is {}",
                    request.url, len, self.max_body_bytes
                )));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(CacheError::Network(format!(
                    "response body of {} exceeds {} bytes",
                    request.url, self.max_body_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(
            "Fetched {} {} -> {} {} ({} bytes)",
            request.method,
            request.url,
            status,
            kind.as_str(),
            body.len()
        );

        Ok(Response::new(status, kind, body).with_headers(headers))
    }
}
