pub mod config;
pub mod offline_cache;
pub mod server;

// Re-export commonly used types
pub use config::{ConfigError, OfflineConfig, StorageBackend};
pub use offline_cache::{CacheError, CacheStorage, CacheWorker, Fetcher, OfflineWorker};

use std::sync::Arc;

pub type AppState = Arc<OfflineState>;

pub struct OfflineState {
    pub config: Arc<OfflineConfig>,
    pub worker: CacheWorker,
    // Used directly for passthrough requests
    pub fetcher: Arc<dyn Fetcher>,
}

impl OfflineState {
    pub fn new(config: Arc<OfflineConfig>, worker: CacheWorker, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            worker,
            fetcher,
        }
    }
}

impl std::fmt::Debug for OfflineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineState")
            .field("config", &self.config)
            .field("serving_version", &self.worker.serving_version())
            .field("worker", &"<CacheWorker>")
            .field("fetcher", &"<dyn Fetcher>")
            .finish()
    }
}

#[cfg(test)]
mod server_test;
