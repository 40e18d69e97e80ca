//! Per-request cache decision: hit, fetch-and-populate, or offline fallback

use crate::config::OfflineConfig;
use crate::offline_cache::{
    CacheError, CacheStorage, Fetcher, Interception, Request, Response, ResponseSource,
};
use std::sync::{Arc, RwLock};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

/// Cache-first request interceptor
///
/// Each request goes `CHECK_CACHE -> HIT | MISS -> FETCH -> STORE? | FALLBACK`.
/// Store writes run in the background and never delay the response.
pub struct RequestInterceptor {
    config: Arc<OfflineConfig>,
    store_name: RwLock<String>,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    writes: TaskTracker,
    settling: tokio::sync::Mutex<()>,
}

impl RequestInterceptor {
    /// Interceptor serving from the configured version's store
    pub fn new(
        config: Arc<OfflineConfig>,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let store_name = config.cache_version.clone();
        Self::for_store(config, &store_name, storage, fetcher)
    }

    /// Interceptor serving from an explicitly named store
    pub fn for_store(
        config: Arc<OfflineConfig>,
        store_name: &str,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            store_name: RwLock::new(store_name.to_string()),
            storage,
            fetcher,
            writes: TaskTracker::new(),
            settling: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store_name(&self) -> String {
        match self.store_name.read() {
            Ok(name) => name.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Serve subsequent requests from another store (after an activation)
    pub fn use_store(&self, name: &str) {
        let mut current = match self.store_name.write() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *current != name {
            debug!("Interceptor switching from {} to {}", *current, name);
            *current = name.to_string();
        }
    }

    pub async fn intercept(&self, request: Request) -> Interception {
        if self.config.is_ignored_scheme(request.scheme()) {
            debug!("Passing through {} request {}", request.scheme(), request.url);
            return Interception::Passthrough;
        }

        let store_name = self.store_name();
        match self.lookup_or_fetch(&store_name, &request).await {
            Ok(interception) => interception,
            Err(e) => self.fallback(&store_name, &request, e).await,
        }
    }

    async fn lookup_or_fetch(
        &self,
        store_name: &str,
        request: &Request,
    ) -> Result<Interception, CacheError> {
        match self.storage.match_request(store_name, request).await {
            Ok(Some(response)) => {
                debug!("Cache hit: {} {}", request.method, request.url);
                return Ok(Interception::Respond {
                    response,
                    source: ResponseSource::Cache,
                });
            }
            Ok(None) => {}
            Err(e) => warn!("Cache lookup for {} failed, treating as miss: {}", request.url, e),
        }

        let response = self.fetch(request).await?;

        if !request.is_http() {
            return Ok(network(response));
        }

        if !response.is_cacheable() {
            debug!(
                "Not caching {}: status {} type {}",
                request.url,
                response.status,
                response.kind.as_str()
            );
            return Ok(network(response));
        }

        if !request.is_get() {
            debug!("Not caching {} {}: method", request.method, request.url);
            return Ok(network(response));
        }

        let (returned, stored) = response.duplicate();
        self.spawn_write(store_name, request.clone(), stored);
        Ok(network(returned))
    }

    async fn fetch(&self, request: &Request) -> Result<Response, CacheError> {
        let timeout = self.config.fetch_timeout();
        match tokio::time::timeout(timeout, self.fetcher.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                url: request.url.to_string(),
                timeout,
            }),
        }
    }

    fn spawn_write(&self, store_name: &str, request: Request, response: Response) {
        let storage = self.storage.clone();
        let store_name = store_name.to_string();
        self.writes.spawn(async move {
            match storage.put(&store_name, &request, response).await {
                Ok(()) => debug!("Cached {} in {}", request.url, store_name),
                Err(e) => error!("Failed to cache {} in {}: {}", request.url, store_name, e),
            }
        });
    }

    async fn fallback(&self, store_name: &str, request: &Request, cause: CacheError) -> Interception {
        if !request.navigation {
            debug!("No response for {} {}: {}", request.method, request.url, cause);
            return Interception::NoResponse;
        }

        let offline = match self.config.offline_url() {
            Ok(url) => Request::new("GET", url),
            Err(e) => {
                error!("Offline fallback unavailable: {}", e);
                return Interception::NoResponse;
            }
        };

        match self.storage.match_request(store_name, &offline).await {
            Ok(Some(response)) => {
                warn!("Serving offline page for {} ({})", request.url, cause);
                Interception::Respond {
                    response,
                    source: ResponseSource::OfflineFallback,
                }
            }
            Ok(None) => {
                warn!("Offline page {} is not cached; no response for {}", offline.url, request.url);
                Interception::NoResponse
            }
            Err(e) => {
                warn!("Offline page lookup failed: {}; no response for {}", e, request.url);
                Interception::NoResponse
            }
        }
    }

    /// Wait until every background store write started so far has finished
    ///
    /// Callers are serialized: the tracker stays closed for one waiter at a
    /// time, and writes spawned meanwhile are still awaited.
    pub async fn settle(&self) {
        let _settling = self.settling.lock().await;
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }
}

fn network(response: Response) -> Interception {
    Interception::Respond {
        response,
        source: ResponseSource::Network,
    }
}
