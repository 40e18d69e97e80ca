//! In-memory implementation of the CacheStorage trait
//!
//! Nothing survives a restart; used when `RECIPE_OFFLINE_STORAGE=memory` and
//! throughout the unit tests.

use crate::offline_cache::key::{entry_key, ensure_storable, vary_matches, vary_snapshot};
use crate::offline_cache::{CacheError, CacheStorage, Request, Response};
use recipe_offline_proto::{now_millis, CachedEntry, RequestSnapshot};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    /// Store names in creation order
    order: Vec<String>,
    stores: HashMap<String, HashMap<String, CachedEntry>>,
    active_version: Option<String>,
}

/// Map-backed implementation of CacheStorage
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    inner: RwLock<Inner>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, CacheError> {
        self.inner
            .read()
            .map_err(|_| CacheError::Storage("memory storage lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, CacheError> {
        self.inner
            .write()
            .map_err(|_| CacheError::Storage("memory storage lock poisoned".to_string()))
    }
}

fn make_entry(request: &Request, response: Response) -> CachedEntry {
    let vary = vary_snapshot(request, &response);
    CachedEntry {
        request: RequestSnapshot {
            method: request.method.clone(),
            url: crate::offline_cache::key::normalize_url(&request.url),
            vary,
        },
        response: response.into_snapshot(),
        stored_at: now_millis(),
    }
}

#[async_trait::async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let mut inner = self.write()?;
        if !inner.stores.contains_key(name) {
            inner.order.push(name.to_string());
            inner.stores.insert(name.to_string(), HashMap::new());
            debug!("Created cache store {}", name);
        }
        Ok(())
    }

    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        let inner = self.read()?;
        let Some(store) = inner.stores.get(name) else {
            return Ok(None);
        };

        Ok(store
            .get(&entry_key(request))
            .filter(|entry| vary_matches(&entry.request.vary, request))
            .map(|entry| Response::from_snapshot(entry.response.clone())))
    }

    async fn put(&self, name: &str, request: &Request, response: Response) -> Result<(), CacheError> {
        ensure_storable(request)?;
        let entry = make_entry(request, response);

        let mut inner = self.write()?;
        let store = inner
            .stores
            .get_mut(name)
            .ok_or_else(|| CacheError::StoreNotFound(name.to_string()))?;
        store.insert(entry_key(request), entry);
        Ok(())
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(Request, Response)>,
    ) -> Result<(), CacheError> {
        for (request, _) in &entries {
            ensure_storable(request)?;
        }
        let prepared: Vec<(String, CachedEntry)> = entries
            .into_iter()
            .map(|(request, response)| (entry_key(&request), make_entry(&request, response)))
            .collect();

        let mut inner = self.write()?;
        let store = inner
            .stores
            .get_mut(name)
            .ok_or_else(|| CacheError::StoreNotFound(name.to_string()))?;
        store.extend(prepared);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut inner = self.write()?;
        inner.order.retain(|n| n != name);
        Ok(inner.stores.remove(name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.read()?.order.clone())
    }

    async fn entry_count(&self, name: &str) -> Result<usize, CacheError> {
        Ok(self.read()?.stores.get(name).map(HashMap::len).unwrap_or(0))
    }

    async fn active_version(&self) -> Result<Option<String>, CacheError> {
        Ok(self.read()?.active_version.clone())
    }

    async fn set_active_version(&self, version: &str) -> Result<(), CacheError> {
        self.write()?.active_version = Some(version.to_string());
        Ok(())
    }

    fn storage_type(&self) -> &str {
        "memory"
    }
}
