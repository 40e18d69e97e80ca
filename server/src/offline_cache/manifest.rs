//! Install manifest: the paths that must be available offline

use crate::config::ConfigError;
use crate::offline_cache::CacheError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// Paths seeded at install time when no manifest is configured
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/manifest.json",
    "/assets/main.css",
    "/assets/logo.svg",
    "/offline.html",
];

/// Ordered list of root-relative paths fixed per deployed version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: Vec<String>,
}

impl Manifest {
    /// Build a manifest, rejecting relative paths and duplicates
    pub fn new<I, S>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let manifest = Self {
            entries: entries.into_iter().map(Into::into).collect(),
        };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entries.is_empty() {
            return Err(ConfigError::Validation("manifest is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !entry.starts_with('/') || entry.starts_with("//") {
                return Err(ConfigError::Validation(format!(
                    "manifest entry {:?} is not a root-relative path",
                    entry
                )));
            }
            if !seen.insert(entry.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "manifest entry {:?} is listed twice",
                    entry
                )));
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e == path)
    }

    /// Resolve every entry against the application origin, in order
    pub fn resolve(&self, origin: &Url) -> Result<Vec<Url>, CacheError> {
        self.entries
            .iter()
            .map(|path| {
                origin
                    .join(path)
                    .map_err(|e| CacheError::InvalidUrl(format!("{}: {}", path, e)))
            })
            .collect()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            entries: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
        }
    }
}
