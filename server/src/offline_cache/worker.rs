//! The offline worker: lifecycle events plus request interception

use crate::config::OfflineConfig;
use crate::offline_cache::{
    ActivateReport, CacheError, CacheStorage, Fetcher, InstallReport, Interception,
    LifecycleManager, Request, RequestInterceptor, WorkerState,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Event surface of an offline worker
///
/// The host delivers `install` and `activate` once per version, and every
/// outgoing request through `intercept`.
#[async_trait::async_trait]
pub trait OfflineWorker: Send + Sync {
    async fn on_install(&self) -> Result<InstallReport, CacheError>;
    async fn on_activate(&self) -> Result<ActivateReport, CacheError>;
    async fn intercept(&self, request: Request) -> Interception;
}

/// What `CacheWorker::boot` ended up doing
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BootOutcome {
    /// The configured version was activated by an earlier run
    AlreadyActive,
    Upgraded {
        from: Option<String>,
        install: InstallReport,
        activate: ActivateReport,
    },
    /// Install of the configured version failed; still serving `version`
    KeptPrevious { version: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub configured_version: String,
    pub serving_version: String,
    pub active_version: Option<String>,
    pub state: WorkerState,
    pub stores: Vec<String>,
    pub storage_type: String,
}

pub struct CacheWorker {
    config: Arc<OfflineConfig>,
    storage: Arc<dyn CacheStorage>,
    lifecycle: LifecycleManager,
    interceptor: RequestInterceptor,
}

impl CacheWorker {
    pub fn new(
        config: Arc<OfflineConfig>,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let lifecycle = LifecycleManager::new(config.clone(), storage.clone(), fetcher.clone());
        let interceptor = RequestInterceptor::new(config.clone(), storage.clone(), fetcher);
        Self {
            config,
            storage,
            lifecycle,
            interceptor,
        }
    }

    /// Bring the configured version up the way a browser would on page load
    pub async fn boot(
        config: Arc<OfflineConfig>,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<(Self, BootOutcome), CacheError> {
        let worker = Self::new(config, storage, fetcher);

        if worker.lifecycle.adopt_active().await? {
            return Ok((worker, BootOutcome::AlreadyActive));
        }

        let previous = worker.previous_version().await?;
        match worker.on_install().await {
            Ok(install) => {
                let activate = worker.on_activate().await?;
                info!(
                    "Upgraded offline cache from {} to {}",
                    previous.as_deref().unwrap_or("nothing"),
                    activate.version
                );
                let outcome = BootOutcome::Upgraded {
                    from: previous,
                    install,
                    activate,
                };
                Ok((worker, outcome))
            }
            Err(e) => match previous {
                Some(version) => {
                    warn!(
                        "Install of {} failed, continuing to serve {}: {}",
                        worker.config.cache_version, version, e
                    );
                    worker.interceptor.use_store(&version);
                    let outcome = BootOutcome::KeptPrevious {
                        version,
                        error: e.to_string(),
                    };
                    Ok((worker, outcome))
                }
                None => Err(e),
            },
        }
    }

    /// A different, still stored version that an earlier run activated
    async fn previous_version(&self) -> Result<Option<String>, CacheError> {
        let Some(active) = self.storage.active_version().await? else {
            return Ok(None);
        };
        if active == self.config.cache_version {
            return Ok(None);
        }
        let stored = self.storage.keys().await?.contains(&active);
        Ok(stored.then_some(active))
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn interceptor(&self) -> &RequestInterceptor {
        &self.interceptor
    }

    /// Store name requests are currently answered from
    pub fn serving_version(&self) -> String {
        self.interceptor.store_name()
    }

    pub async fn status(&self) -> Result<WorkerStatus, CacheError> {
        Ok(WorkerStatus {
            configured_version: self.config.cache_version.clone(),
            serving_version: self.serving_version(),
            active_version: self.storage.active_version().await?,
            state: self.lifecycle.state(),
            stores: self.storage.keys().await?,
            storage_type: self.storage.storage_type().to_string(),
        })
    }
}

#[async_trait::async_trait]
impl OfflineWorker for CacheWorker {
    async fn on_install(&self) -> Result<InstallReport, CacheError> {
        self.lifecycle.on_install().await
    }

    async fn on_activate(&self) -> Result<ActivateReport, CacheError> {
        let report = self.lifecycle.on_activate().await?;
        self.interceptor.use_store(&report.version);
        Ok(report)
    }

    async fn intercept(&self, request: Request) -> Interception {
        self.interceptor.intercept(request).await
    }
}
