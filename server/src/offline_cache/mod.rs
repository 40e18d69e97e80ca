//! Offline caching layer for the recipe analyzer
//!
//! This module owns the versioned request → response cache that keeps the
//! app usable without a network: the lifecycle manager seeds and retires
//! versioned stores, and the request interceptor decides per request between
//! cache hit, network fetch (populating the cache) and the offline fallback.

pub mod fetcher;
pub mod interceptor;
pub mod key;
pub mod lifecycle;
pub mod manifest;
pub mod memory;
pub mod message;
pub mod sqlite;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use interceptor::RequestInterceptor;
pub use lifecycle::{ActivateReport, InstallReport, LifecycleManager, WorkerState};
pub use manifest::Manifest;
pub use message::{Body, Request, Response};
pub use recipe_offline_proto::ResponseKind;
pub use worker::{BootOutcome, CacheWorker, OfflineWorker, WorkerStatus};

use crate::config::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Error type for offline cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Fetch of {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Cache store not found: {0}")]
    StoreNotFound(String),

    #[error("Only GET requests can be cached, got {0}")]
    UnsupportedMethod(String),

    #[error("Install of {version} failed at {url}: {reason}")]
    InstallFailed {
        version: String,
        url: String,
        reason: String,
    },

    #[error("Cannot activate {0}: install has not completed")]
    NotInstalled(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        CacheError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(e: reqwest::Error) -> Self {
        CacheError::Network(e.to_string())
    }
}

/// Where the response handed back by the interceptor came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    OfflineFallback,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Network => "network",
            Self::OfflineFallback => "offline",
        }
    }
}

/// Outcome of intercepting one request
#[derive(Debug)]
pub enum Interception {
    /// Not handled; the host performs the request itself
    Passthrough,
    Respond {
        response: Response,
        source: ResponseSource,
    },
    /// The request failed and there is nothing to serve in its place
    NoResponse,
}

impl Interception {
    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            Self::Respond { source, .. } => Some(*source),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Respond { response, .. } => Some(response),
            _ => None,
        }
    }
}

/// Network primitive used by both the lifecycle manager and the interceptor
///
/// Implementations must not cache anything themselves; caching decisions
/// belong to the interceptor.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request against the network
    ///
    /// Returns `Err` only when no response was obtained at all (offline, DNS,
    /// refused connection). HTTP error statuses are `Ok` responses.
    async fn fetch(&self, request: &Request) -> Result<Response, CacheError>;
}

/// Durable storage of named caches, each a map of request → response
///
/// One `CacheStorage` holds every store belonging to the application; store
/// names are cache versions. Implementations must be safe for concurrent use:
/// writes to distinct keys never lose data, writes to the same key are
/// last-write-wins.
#[async_trait::async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the named store, creating it if absent
    async fn open(&self, name: &str) -> Result<(), CacheError>;

    /// Look up a request in the named store
    ///
    /// Returns `None` on a miss or when the store does not exist.
    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError>;

    /// Store a response for a request, replacing any previous entry
    ///
    /// Fails with `StoreNotFound` if the store has not been opened (or was
    /// deleted), and with `UnsupportedMethod` for non-GET requests.
    async fn put(&self, name: &str, request: &Request, response: Response)
        -> Result<(), CacheError>;

    /// Store several entries atomically: either all are written or none
    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(Request, Response)>,
    ) -> Result<(), CacheError>;

    /// Delete the named store and its entries. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// Names of every store, in creation order
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Number of entries in the named store (0 if absent)
    async fn entry_count(&self, name: &str) -> Result<usize, CacheError>;

    /// The version whose activation last completed, if any
    async fn active_version(&self) -> Result<Option<String>, CacheError>;

    /// Record the version whose activation just completed
    async fn set_active_version(&self, version: &str) -> Result<(), CacheError>;

    /// Get the storage type identifier (e.g., "sqlite", "memory")
    fn storage_type(&self) -> &str;
}
