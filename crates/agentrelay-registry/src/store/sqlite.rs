//! Durable store on SQLite
//!
//! One table keyed by `(namespace, key)`. Conditional writes run inside a
//! transaction on a single writer connection, so the version check and the
//! write commit together.

use super::{Expect, RegistryStore, Versioned};
use agentrelay_core::{Error, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS registry_records (
        namespace  TEXT    NOT NULL,
        key        TEXT    NOT NULL,
        version    INTEGER NOT NULL,
        body       BLOB    NOT NULL,
        updated_at TEXT    NOT NULL,
        PRIMARY KEY (namespace, key)
    );
";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(Error::storage)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .map_err(Error::storage)?;
        let store = Self::from_connection(conn)?;
        info!("Opened registry store at {}", path.display());
        Ok(store)
    }

    /// Private in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::storage)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(Error::storage)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::storage("registry store connection poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::Internal(format!("store task failed: {}", e)))?
    }
}

fn current_version(conn: &Connection, namespace: &str, key: &str) -> Result<Option<u64>> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT version FROM registry_records WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::storage)?;
    Ok(version.map(|v| v as u64))
}

#[async_trait]
impl RegistryStore for SqliteStore {
    async fn put(&self, namespace: &str, key: &str, bytes: Vec<u8>, expect: Expect) -> Result<u64> {
        let (namespace, key) = (namespace.to_string(), key.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(Error::storage)?;
            let current = current_version(&tx, &namespace, &key)?;
            expect.check(&namespace, &key, current)?;
            let version = current.unwrap_or(0) + 1;
            tx.execute(
                "INSERT INTO registry_records (namespace, key, version, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(namespace, key) DO UPDATE SET
                     version = excluded.version,
                     body = excluded.body,
                     updated_at = excluded.updated_at",
                params![namespace, key, version as i64, bytes, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(Error::storage)?;
            tx.commit().map_err(Error::storage)?;
            Ok(version)
        })
        .await
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Versioned> {
        let (namespace, key) = (namespace.to_string(), key.to_string());
        self.with_conn(move |conn| {
            let row: Option<(i64, Vec<u8>)> = conn
                .query_row(
                    "SELECT version, body FROM registry_records WHERE namespace = ?1 AND key = ?2",
                    params![namespace, key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(Error::storage)?;
            row.map(|(version, bytes)| Versioned {
                version: version as u64,
                bytes,
            })
            .ok_or(Error::NotFound(key))
        })
        .await
    }

    async fn scan(&self, namespace: &str) -> Result<Vec<(String, Versioned)>> {
        let namespace = namespace.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT key, version, body FROM registry_records
                     WHERE namespace = ?1 ORDER BY key",
                )
                .map_err(Error::storage)?;
            let rows = stmt
                .query_map(params![namespace], |row| {
                    let version: i64 = row.get(1)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        Versioned {
                            version: version as u64,
                            bytes: row.get(2)?,
                        },
                    ))
                })
                .map_err(Error::storage)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::storage)
        })
        .await
    }

    async fn delete(&self, namespace: &str, key: &str, expect: Expect) -> Result<()> {
        let (namespace, key) = (namespace.to_string(), key.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(Error::storage)?;
            let Some(current) = current_version(&tx, &namespace, &key)? else {
                return Err(Error::NotFound(key));
            };
            expect.check(&namespace, &key, Some(current))?;
            tx.execute(
                "DELETE FROM registry_records WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .map_err(Error::storage)?;
            tx.commit().map_err(Error::storage)?;
            Ok(())
        })
        .await
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
