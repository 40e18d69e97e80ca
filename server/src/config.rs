//! Configuration for the offline cache worker and its host server
//!
//! Every component receives an `OfflineConfig` at construction; nothing reads
//! the cache version or manifest from ambient state. Values come from
//! `RECIPE_OFFLINE_*` environment variables layered over built-in defaults.

use crate::offline_cache::Manifest;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const ENV_PREFIX: &str = "RECIPE_OFFLINE_";

pub const DEFAULT_CACHE_VERSION: &str = "recipe-analyzer-v1";
pub const DEFAULT_OFFLINE_PATH: &str = "/offline.html";

/// Room left in a stored entry for the URL, headers and Vary values
const ENTRY_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Largest response body that still fits in one stored entry
pub const MAX_BODY_BYTES_LIMIT: usize =
    recipe_offline_proto::MAX_ENTRY_SIZE as usize - ENTRY_OVERHEAD_BYTES;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Which `CacheStorage` backend holds the versioned stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// Name of the store for this deployment. Bump it to invalidate every
    /// client's cached assets.
    pub cache_version: String,
    pub manifest: Manifest,
    /// Document served for failed navigations; must be in the manifest
    pub offline_path: String,
    /// Origin of the application being fronted
    pub upstream: Url,
    pub listen_addr: SocketAddr,
    pub storage_dir: PathBuf,
    pub storage: StorageBackend,
    /// Upper bound on any single network fetch before falling back
    pub fetch_timeout_ms: u64,
    pub max_body_bytes: usize,
    /// URL schemes that are never intercepted (browser extension origins)
    pub ignored_schemes: Vec<String>,
    pub user_agent: String,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            manifest: Manifest::default(),
            offline_path: DEFAULT_OFFLINE_PATH.to_string(),
            upstream: Url::parse("http://127.0.0.1:5000").expect("static URL is valid"),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            storage_dir: PathBuf::from("./recipe-offline-storage"),
            storage: StorageBackend::Sqlite,
            fetch_timeout_ms: 10_000,
            max_body_bytes: 20 * 1024 * 1024,
            ignored_schemes: vec![
                "chrome-extension".to_string(),
                "moz-extension".to_string(),
                "safari-web-extension".to_string(),
            ],
            user_agent: "recipe-offline/0.1".to_string(),
        }
    }
}

impl OfflineConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for each `RECIPE_OFFLINE_*` variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{}{}", ENV_PREFIX, name);
            lookup(&key).map(|value| (key, value))
        };
        let mut config = Self::default();

        if let Some((_, value)) = get("CACHE_VERSION") {
            config.cache_version = value.trim().to_string();
        }
        if let Some((key, value)) = get("MANIFEST") {
            config.manifest = Manifest::new(split_list(&value)).map_err(|e| invalid(&key, &value, e))?;
        }
        if let Some((_, value)) = get("OFFLINE_PATH") {
            config.offline_path = value.trim().to_string();
        }
        if let Some((key, value)) = get("UPSTREAM") {
            config.upstream = Url::parse(value.trim()).map_err(|e| invalid(&key, &value, e))?;
        }
        if let Some((key, value)) = get("LISTEN_ADDR") {
            config.listen_addr = value.trim().parse().map_err(|e| invalid(&key, &value, e))?;
        }
        if let Some((_, value)) = get("STORAGE_DIR") {
            config.storage_dir = PathBuf::from(value);
        }
        if let Some((key, value)) = get("STORAGE") {
            config.storage = match value.trim().to_ascii_lowercase().as_str() {
                "sqlite" => StorageBackend::Sqlite,
                "memory" => StorageBackend::Memory,
                _ => return Err(invalid(&key, &value, "expected sqlite or memory")),
            };
        }
        if let Some((key, value)) = get("FETCH_TIMEOUT_MS") {
            config.fetch_timeout_ms = value.trim().parse().map_err(|e| invalid(&key, &value, e))?;
        }
        if let Some((key, value)) = get("MAX_BODY_BYTES") {
            config.max_body_bytes = value.trim().parse().map_err(|e| invalid(&key, &value, e))?;
        }
        if let Some((_, value)) = get("IGNORED_SCHEMES") {
            config.ignored_schemes = split_list(&value)
                .into_iter()
                .map(|s| s.to_ascii_lowercase())
                .collect();
        }
        if let Some((_, value)) = get("USER_AGENT") {
            config.user_agent = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_version.trim().is_empty() {
            return Err(ConfigError::Validation("cache_version is empty".to_string()));
        }
        self.manifest.validate()?;
        if !self.manifest.contains(&self.offline_path) {
            return Err(ConfigError::Validation(format!(
                "offline path {} is not in the manifest, it would not be available offline",
                self.offline_path
            )));
        }
        if !matches!(self.upstream.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "upstream {} must be an http(s) origin",
                self.upstream
            )));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::Validation("fetch_timeout_ms must be positive".to_string()));
        }
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Validation(format!(
                "max_body_bytes must be between 1 and {}, got {}",
                MAX_BODY_BYTES_LIMIT, self.max_body_bytes
            )));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// SQLite database holding every versioned store
    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join("offline_cache.db")
    }

    pub fn offline_url(&self) -> Result<Url, ConfigError> {
        self.upstream
            .join(&self.offline_path)
            .map_err(|e| invalid("offline_path", &self.offline_path, e))
    }

    pub fn is_ignored_scheme(&self, scheme: &str) -> bool {
        self.ignored_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
    }

    /// Same settings, different store name
    pub fn with_version(&self, version: &str) -> Self {
        Self {
            cache_version: version.to_string(),
            ..self.clone()
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid(key: &str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
