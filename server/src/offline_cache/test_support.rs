//! Scripted fetcher and fault-injecting storage shared by the unit tests

use crate::config::OfflineConfig;
use crate::offline_cache::memory::MemoryCacheStorage;
use crate::offline_cache::{CacheError, CacheStorage, Fetcher, Request, Response, ResponseKind};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub(crate) fn test_config() -> OfflineConfig {
    OfflineConfig {
        upstream: url::Url::parse("http://app.test").unwrap(),
        fetch_timeout_ms: 200,
        ..OfflineConfig::default()
    }
}

#[derive(Clone)]
enum Script {
    Respond {
        status: u16,
        kind: ResponseKind,
        headers: Vec<(String, String)>,
        body: Bytes,
    },
    Fail,
    Hang,
}

/// Fetcher answering from a per-URL script; unscripted URLs fail like an
/// unreachable network
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serves every manifest entry of `config` with a 200 basic response
    pub(crate) fn serving_manifest(config: &OfflineConfig) -> Self {
        let fetcher = Self::new();
        for url in config.manifest.resolve(&config.upstream).unwrap() {
            let body = if url.path() == config.offline_path {
                "<h1>Offline</h1>".to_string()
            } else {
                format!("<page {}>", url.path())
            };
            fetcher.script(
                url.as_str(),
                Script::Respond {
                    status: 200,
                    kind: ResponseKind::Basic,
                    headers: vec![("content-type".to_string(), "text/html".to_string())],
                    body: Bytes::from(body),
                },
            );
        }
        fetcher
    }

    fn script(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    pub(crate) fn respond(&self, url: &str, status: u16, kind: ResponseKind, body: &str) {
        self.script(
            url,
            Script::Respond {
                status,
                kind,
                headers: Vec::new(),
                body: Bytes::from(body.to_string()),
            },
        );
    }

    pub(crate) fn respond_with_headers(
        &self,
        url: &str,
        status: u16,
        headers: &[(&str, &str)],
        body: &str,
    ) {
        self.script(
            url,
            Script::Respond {
                status,
                kind: ResponseKind::Basic,
                headers: headers
                    .iter()
                    .map(|(n, v)| (n.to_string(), v.to_string()))
                    .collect(),
                body: Bytes::from(body.to_string()),
            },
        );
    }

    /// Keeps the scripted body but changes the status
    pub(crate) fn respond_status(&self, url: &str, status: u16) {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(Script::Respond { status: s, .. }) => *s = status,
            _ => {
                scripts.insert(
                    url.to_string(),
                    Script::Respond {
                        status,
                        kind: ResponseKind::Basic,
                        headers: Vec::new(),
                        body: Bytes::new(),
                    },
                );
            }
        }
    }

    pub(crate) fn fail(&self, url: &str) {
        self.script(url, Script::Fail);
    }

    pub(crate) fn hang(&self, url: &str) {
        self.script(url, Script::Hang);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, CacheError> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());
        let script = self.scripts.lock().unwrap().get(&url).cloned();

        match script {
            Some(Script::Respond {
                status,
                kind,
                headers,
                body,
            }) => Ok(Response::new(status, kind, body).with_headers(headers)),
            Some(Script::Hang) => futures::future::pending().await,
            Some(Script::Fail) | None => {
                Err(CacheError::Network(format!("connection refused: {}", url)))
            }
        }
    }
}

/// Memory storage with switchable failures and call counters
#[derive(Default)]
pub(crate) struct FlakyStorage {
    inner: MemoryCacheStorage,
    fail_puts: AtomicBool,
    fail_lookups: AtomicBool,
    fail_deletes: Mutex<HashSet<String>>,
    lookups: AtomicUsize,
    puts: AtomicUsize,
}

impl FlakyStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_delete(&self, name: &str) {
        self.fail_deletes.lock().unwrap().insert(name.to_string());
    }

    pub(crate) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Successful `put` and `put_all` calls
    pub(crate) fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CacheStorage for FlakyStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        self.inner.open(name).await
    }

    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(CacheError::Storage("injected lookup failure".to_string()));
        }
        self.inner.match_request(name, request).await
    }

    async fn put(&self, name: &str, request: &Request, response: Response) -> Result<(), CacheError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(CacheError::Storage("injected quota exceeded".to_string()));
        }
        self.inner.put(name, request, response).await?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(Request, Response)>,
    ) -> Result<(), CacheError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(CacheError::Storage("injected quota exceeded".to_string()));
        }
        self.inner.put_all(name, entries).await?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let injected = self.fail_deletes.lock().unwrap().contains(name);
        if injected {
            return Err(CacheError::Storage(format!("injected delete failure: {}", name)));
        }
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.inner.keys().await
    }

    async fn entry_count(&self, name: &str) -> Result<usize, CacheError> {
        self.inner.entry_count(name).await
    }

    async fn active_version(&self) -> Result<Option<String>, CacheError> {
        self.inner.active_version().await
    }

    async fn set_active_version(&self, version: &str) -> Result<(), CacheError> {
        self.inner.set_active_version(version).await
    }

    fn storage_type(&self) -> &str {
        "flaky"
    }
}
