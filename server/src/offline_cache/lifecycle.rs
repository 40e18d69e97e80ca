//! Cache lifecycle: install-time seeding and activation-time cleanup

use crate::config::OfflineConfig;
use crate::offline_cache::{CacheError, CacheStorage, Fetcher, Request, Response};
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;

/// Lifecycle state of the configured cache version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; this version will never become current
    Redundant,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub version: String,
    /// Every manifest URL now present in the store, in manifest order
    pub cached: Vec<String>,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
    pub version: String,
    pub deleted: Vec<String>,
    /// Stale stores whose deletion failed; retried on the next activation
    pub failed: Vec<String>,
}

/// Seeds and retires versioned cache stores
pub struct LifecycleManager {
    config: Arc<OfflineConfig>,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<WorkerState>,
    /// Held for the whole of each install or activation; they never overlap
    events: tokio::sync::Mutex<()>,
}

impl LifecycleManager {
    pub fn new(
        config: Arc<OfflineConfig>,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
            state: Mutex::new(WorkerState::Parsed),
            events: tokio::sync::Mutex::new(()),
        }
    }

    pub fn version(&self) -> &str {
        &self.config.cache_version
    }

    pub fn state(&self) -> WorkerState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn transition(&self, next: WorkerState) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug!("{}: {:?} -> {:?}", self.config.cache_version, *state, next);
        *state = next;
    }

    /// Fetch every manifest entry and commit them all to the version's store
    ///
    /// All-or-nothing: every response is fetched before anything is written,
    /// so a failed fetch leaves storage untouched.
    pub async fn on_install(&self) -> Result<InstallReport, CacheError> {
        let _event = self.events.lock().await;
        let version = self.config.cache_version.clone();
        self.transition(WorkerState::Installing);
        info!("Installing {} ({} manifest entries)", version, self.config.manifest.len());

        match self.install(&version).await {
            Ok(report) => {
                self.transition(WorkerState::Installed);
                info!(
                    "Installed {}: {} entries, {} bytes",
                    version,
                    report.cached.len(),
                    report.bytes
                );
                Ok(report)
            }
            Err(e) => {
                // A failed refresh of the running version leaves it serving
                let current = self.is_current().await.unwrap_or(false);
                if current {
                    self.transition(WorkerState::Activated);
                } else {
                    self.transition(WorkerState::Redundant);
                }
                error!("Install of {} aborted: {}", version, e);
                Err(e)
            }
        }
    }

    async fn install(&self, version: &str) -> Result<InstallReport, CacheError> {
        let urls = self.config.manifest.resolve(&self.config.upstream)?;
        let fetched = try_join_all(urls.into_iter().map(|url| self.fetch_manifest_entry(version, url))).await?;

        let cached = fetched
            .iter()
            .map(|(request, _)| request.url.to_string())
            .collect();
        let bytes = fetched
            .iter()
            .map(|(_, response)| response.body_len() as u64)
            .sum();

        self.storage.open(version).await?;
        self.storage.put_all(version, fetched).await?;

        Ok(InstallReport {
            version: version.to_string(),
            cached,
            bytes,
        })
    }

    async fn fetch_manifest_entry(
        &self,
        version: &str,
        url: Url,
    ) -> Result<(Request, Response), CacheError> {
        let request = Request::new("GET", url);
        let install_failed = |reason: String| CacheError::InstallFailed {
            version: version.to_string(),
            url: request.url.to_string(),
            reason,
        };

        let timeout = self.config.fetch_timeout();
        let response = match tokio::time::timeout(timeout, self.fetcher.fetch(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(install_failed(e.to_string())),
            Err(_) => return Err(install_failed(format!("timed out after {:?}", timeout))),
        };

        if response.status != 200 {
            return Err(install_failed(format!("HTTP status {}", response.status)));
        }

        debug!("Fetched manifest entry {} ({} bytes)", request.url, response.body_len());
        Ok((request, response))
    }

    /// Delete every store except the current version's and mark it active
    ///
    /// Deletion failures are logged and skipped; they never fail activation.
    pub async fn on_activate(&self) -> Result<ActivateReport, CacheError> {
        let _event = self.events.lock().await;
        let version = self.config.cache_version.clone();
        if !matches!(self.state(), WorkerState::Installed | WorkerState::Activated) {
            return Err(CacheError::NotInstalled(version));
        }
        self.transition(WorkerState::Activating);

        let result = self.activate(&version).await;
        match &result {
            Ok(report) => {
                self.transition(WorkerState::Activated);
                info!(
                    "Activated {} (deleted {} stale stores, {} failed)",
                    version,
                    report.deleted.len(),
                    report.failed.len()
                );
            }
            Err(e) => {
                // Installed entries are intact; activation can be retried
                self.transition(WorkerState::Installed);
                error!("Activation of {} failed: {}", version, e);
            }
        }
        result
    }

    async fn activate(&self, version: &str) -> Result<ActivateReport, CacheError> {
        let mut deleted = Vec::new();
        let mut failed = Vec::new();

        for name in self.storage.keys().await? {
            if name == version {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(_) => {
                    info!("Deleted stale cache store {}", name);
                    deleted.push(name);
                }
                Err(e) => {
                    warn!("Failed to delete stale cache store {}: {}", name, e);
                    failed.push(name);
                }
            }
        }

        self.storage.open(version).await?;
        self.storage.set_active_version(version).await?;

        Ok(ActivateReport {
            version: version.to_string(),
            deleted,
            failed,
        })
    }

    /// Take over a version that a previous run already activated
    ///
    /// Returns false (and changes nothing) if its store no longer exists.
    pub async fn adopt_active(&self) -> Result<bool, CacheError> {
        let _event = self.events.lock().await;
        if !self.is_current().await? {
            return Ok(false);
        }
        self.transition(WorkerState::Activated);
        info!("Resuming already active version {}", self.config.cache_version);
        Ok(true)
    }

    /// Whether the active-version marker names this version and its store exists
    async fn is_current(&self) -> Result<bool, CacheError> {
        let version = &self.config.cache_version;
        if self.storage.active_version().await?.as_deref() != Some(version.as_str()) {
            return Ok(false);
        }
        if !self.storage.keys().await?.iter().any(|name| name == version) {
            warn!("Active version {} has no store, reinstall required", version);
            return Ok(false);
        }
        Ok(true)
    }
}
