//! SQLite implementation of the CacheStorage trait

use crate::offline_cache::key::{entry_key, ensure_storable, normalize_url, vary_matches, vary_snapshot};
use crate::offline_cache::{CacheError, CacheStorage, Request, Response};
use chrono::Utc;
use recipe_offline_proto::{decode_entry, encode_entry, now_millis, CachedEntry, RequestSnapshot};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// SQLite-backed implementation of CacheStorage
///
/// All stores live in one database; entries are persisted as snapshot blobs.
#[derive(Clone)]
pub struct SqliteCacheStorage {
    conn: Arc<Mutex<Connection>>,
}

/// A row ready to be written: key, method, url, blob
struct EncodedEntry {
    key: String,
    method: String,
    url: String,
    blob: Vec<u8>,
}

impl SqliteCacheStorage {
    /// Create a new SQLite cache storage
    ///
    /// If the database doesn't exist, it will be created with the required schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, CacheError> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// Storage backed by a private in-memory database
    pub fn in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<(), CacheError> {
        let conn = self.lock()?;

        // One row per named store (cache version)
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS stores (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        // Entries: request key -> encoded snapshot
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                store_name TEXT NOT NULL,
                entry_key TEXT NOT NULL,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                snapshot BLOB NOT NULL,
                stored_at TEXT NOT NULL,
                PRIMARY KEY (store_name, entry_key)
            )
            "#,
            [],
        )?;

        // Single-row table recording the active version
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS worker_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                active_version TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        info!("Offline cache database schema initialized");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Storage("sqlite connection lock poisoned".to_string()))
    }

    /// Run blocking database work off the async runtime
    async fn with_conn<F, T>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&mut Connection) -> Result<T, CacheError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = store.lock()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| CacheError::Storage(format!("database task failed: {}", e)))?
    }

    fn encode(request: &Request, response: Response) -> Result<EncodedEntry, CacheError> {
        ensure_storable(request)?;
        let vary = vary_snapshot(request, &response);
        let url = normalize_url(&request.url);
        let entry = CachedEntry {
            request: RequestSnapshot {
                method: request.method.clone(),
                url: url.clone(),
                vary,
            },
            response: response.into_snapshot(),
            stored_at: now_millis(),
        };
        let blob = encode_entry(&entry).map_err(|e| CacheError::Snapshot(e.to_string()))?;

        Ok(EncodedEntry {
            key: entry_key(request),
            method: request.method.clone(),
            url,
            blob,
        })
    }
}

fn store_exists(conn: &Connection, name: &str) -> Result<bool, CacheError> {
    let found = conn
        .query_row("SELECT 1 FROM stores WHERE name = ?1", params![name], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn insert_entry(conn: &Connection, name: &str, entry: &EncodedEntry, now: &str) -> Result<(), CacheError> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO entries (store_name, entry_key, method, url, snapshot, stored_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![name, entry.key, entry.method, entry.url, entry.blob, now],
    )?;
    Ok(())
}

#[async_trait::async_trait]
impl CacheStorage for SqliteCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)",
                params![name, Utc::now().to_rfc3339()],
            )?;
            if inserted > 0 {
                debug!("Created cache store {}", name);
            }
            Ok(())
        })
        .await
    }

    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        let name = name.to_string();
        let key = entry_key(request);
        let blob: Option<Vec<u8>> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT snapshot FROM entries WHERE store_name = ?1 AND entry_key = ?2",
                        params![name, key],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        let Some(blob) = blob else {
            return Ok(None);
        };
        let entry = decode_entry(&blob).map_err(|e| CacheError::Snapshot(e.to_string()))?;

        if !vary_matches(&entry.request.vary, request) {
            return Ok(None);
        }
        Ok(Some(Response::from_snapshot(entry.response)))
    }

    async fn put(&self, name: &str, request: &Request, response: Response) -> Result<(), CacheError> {
        let encoded = Self::encode(request, response)?;
        let name = name.to_string();
        self.with_conn(move |conn| {
            if !store_exists(conn, &name)? {
                return Err(CacheError::StoreNotFound(name));
            }
            insert_entry(conn, &name, &encoded, &Utc::now().to_rfc3339())?;
            debug!("Stored {} {} in {} ({} bytes)", encoded.method, encoded.url, name, encoded.blob.len());
            Ok(())
        })
        .await
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(Request, Response)>,
    ) -> Result<(), CacheError> {
        let encoded = entries
            .into_iter()
            .map(|(request, response)| Self::encode(&request, response))
            .collect::<Result<Vec<_>, _>>()?;
        let name = name.to_string();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if !store_exists(&tx, &name)? {
                return Err(CacheError::StoreNotFound(name));
            }
            let now = Utc::now().to_rfc3339();
            for entry in &encoded {
                insert_entry(&tx, &name, entry, &now)?;
            }
            tx.commit()?;
            debug!("Stored {} entries in {}", encoded.len(), name);
            Ok(())
        })
        .await
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM entries WHERE store_name = ?1", params![name])?;
            let removed = tx.execute("DELETE FROM stores WHERE name = ?1", params![name])?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY seq")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn entry_count(&self, name: &str) -> Result<usize, CacheError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entries WHERE store_name = ?1",
                params![name],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn active_version(&self) -> Result<Option<String>, CacheError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT active_version FROM worker_state WHERE id = 1", [], |row| {
                    row.get::<_, String>(0)
                })
                .optional()?)
        })
        .await
    }

    async fn set_active_version(&self, version: &str) -> Result<(), CacheError> {
        let version = version.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO worker_state (id, active_version, updated_at)
                VALUES (1, ?1, ?2)
                ON CONFLICT(id) DO UPDATE SET
                    active_version = ?1,
                    updated_at = ?2
                "#,
                params![version, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    fn storage_type(&self) -> &str {
        "sqlite"
    }
}
