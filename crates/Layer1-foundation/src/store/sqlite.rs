//! SQLite-backed cache store
//!
//! Durable backend: entries survive process restarts and can be shared by
//! short-lived agent processes pointed at the same database file. Expiry is
//! filtered server-side on every read; reclaiming the space of expired rows
//! is a separate [`SqliteStore::purge_expired`] pass meant to run on a
//! schedule, which trades bounded storage staleness for write-path latency.
//!
//! Hit-count increments are fire-and-forget: a slow or failing accounting
//! write must never delay or fail the `get` that triggered it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use super::{now_ms, CacheEntry, CacheStore, StoreStats};
use crate::{Error, Result};

/// Database file name inside the data directory
const DB_FILE: &str = "toolcache.db";

/// Durable cache store backed by SQLite
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    /// Rows removed by purge passes; this backend's eviction figure
    purged_count: AtomicU64,
}

impl SqliteStore {
    /// Open (or create) the store under a data directory
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| Error::Storage(format!("Failed to create data directory: {}", e)))?;

        let db_path = data_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;

        let store = Self::from_connection(conn);
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to create in-memory database: {}", e)))?;

        let store = Self::from_connection(conn);
        store.initialize_schema()?;
        Ok(store)
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            purged_count: AtomicU64::new(0),
        }
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;

        conn.execute_batch(
            r#"
            -- Cached tool results, one row per cache key
            CREATE TABLE IF NOT EXISTS tool_results (
                key TEXT PRIMARY KEY,
                tool TEXT NOT NULL,
                value TEXT NOT NULL,
                stored_at INTEGER NOT NULL,
                ttl_ms INTEGER NOT NULL,
                hits INTEGER NOT NULL DEFAULT 0,
                size_bytes INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tool_results_tool
                ON tool_results(tool);
            CREATE INDEX IF NOT EXISTS idx_tool_results_expiry
                ON tool_results(stored_at + ttl_ms);
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Delete every row past its expiry. Returns the count removed.
    ///
    /// Meant to be invoked periodically rather than on every write; see
    /// [`SqliteStore::spawn_purge_task`].
    pub fn purge_expired(&self) -> Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;

        let removed = conn
            .execute(
                "DELETE FROM tool_results WHERE stored_at + ttl_ms < ?1",
                params![now_ms()],
            )
            .map_err(|e| Error::Storage(format!("Failed to purge expired entries: {}", e)))?;

        if removed > 0 {
            self.purged_count.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "purged expired cache entries");
        }
        Ok(removed)
    }

    /// Spawn a background task purging expired rows on an interval
    pub fn spawn_purge_task(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = store.purge_expired() {
                    warn!(error = %e, "scheduled cache purge failed");
                }
            }
        })
    }

    /// Best-effort, detached hit-count increment.
    ///
    /// Runs on a spawned task when a runtime is available so the read path
    /// never waits on accounting; falls back to an inline attempt otherwise.
    /// Failures are logged and dropped.
    fn bump_hits(&self, key: &str) {
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();

        let apply = move || -> Result<()> {
            let conn = conn
                .lock()
                .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;
            conn.execute(
                "UPDATE tool_results SET hits = hits + 1 WHERE key = ?1",
                params![key],
            )?;
            Ok(())
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = apply() {
                        warn!(error = %e, "hit-count update failed");
                    }
                });
            }
            Err(_) => {
                if let Err(e) = apply() {
                    warn!(error = %e, "hit-count update failed");
                }
            }
        }
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row = {
            let conn = self
                .conn
                .lock()
                .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;

            conn.query_row(
                r#"
                SELECT key, tool, value, stored_at, ttl_ms, hits, size_bytes
                FROM tool_results
                WHERE key = ?1 AND stored_at + ttl_ms >= ?2
                "#,
                params![key, now_ms()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::Storage(format!("Failed to get cache entry: {}", e)))?
        };

        match row {
            Some((key, tool, value, stored_at, ttl_ms, hits, size_bytes)) => {
                let value = serde_json::from_str(&value)?;
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                self.bump_hits(&key);
                Ok(Some(CacheEntry {
                    key,
                    tool,
                    value,
                    stored_at,
                    ttl_ms,
                    // The row reflects the pre-read count; the detached
                    // update catches the row up to what we report here.
                    hits: hits as u64 + 1,
                    size_bytes: size_bytes as usize,
                }))
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, entry: CacheEntry) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;

        let value = entry.value.to_string();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO tool_results (key, tool, value, stored_at, ttl_ms, hits, size_bytes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                entry.key,
                entry.tool,
                value,
                entry.stored_at,
                entry.ttl_ms,
                entry.hits as i64,
                entry.size_bytes as i64,
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to store cache entry: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;

        let removed = conn
            .execute("DELETE FROM tool_results WHERE key = ?1", params![key])
            .map_err(|e| Error::Storage(format!("Failed to delete cache entry: {}", e)))?;

        Ok(removed > 0)
    }

    async fn clear(&self, tool: Option<&str>) -> Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;

        let removed = match tool {
            Some(tool) => conn
                .execute("DELETE FROM tool_results WHERE tool = ?1", params![tool])
                .map_err(|e| Error::Storage(format!("Failed to clear tool entries: {}", e)))?,
            None => conn
                .execute("DELETE FROM tool_results", [])
                .map_err(|e| Error::Storage(format!("Failed to clear cache: {}", e)))?,
        };

        Ok(removed)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;

        // One round trip: per-tool rows plus a grand-total row whose NULL
        // tool discriminates it from real tools.
        let mut stmt = conn
            .prepare(
                r#"
                SELECT tool, COUNT(*), COALESCE(SUM(size_bytes), 0)
                FROM tool_results GROUP BY tool
                UNION ALL
                SELECT NULL, COUNT(*), COALESCE(SUM(size_bytes), 0)
                FROM tool_results
                "#,
            )
            .map_err(|e| Error::Storage(format!("Failed to prepare stats query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(|e| Error::Storage(format!("Failed to query stats: {}", e)))?;

        let mut stats = StoreStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            eviction_count: self.purged_count.load(Ordering::Relaxed),
            ..Default::default()
        };

        let mut entries_by_tool = HashMap::new();
        for row in rows {
            let (tool, count, size_bytes) =
                row.map_err(|e| Error::Storage(format!("Failed to read stats row: {}", e)))?;
            match tool {
                Some(tool) => {
                    entries_by_tool.insert(tool, count as usize);
                }
                None => {
                    stats.total_entries = count as usize;
                    stats.total_size_bytes = size_bytes as usize;
                }
            }
        }
        stats.entries_by_tool = entries_by_tool;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(key: &str, tool: &str, ttl_ms: i64) -> CacheEntry {
        CacheEntry::new(key, tool, json!({"out": key.to_string()}), ttl_ms)
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();
        store.set(entry("read:1", "read", 60_000)).await.unwrap();

        let got = store.get("read:1").await.unwrap().unwrap();
        assert_eq!(got.key, "read:1");
        assert_eq!(got.tool, "read");
        assert_eq!(got.value, json!({"out": "read:1"}));
        assert_eq!(got.hits, 1);
    }

    #[tokio::test]
    async fn test_hit_accounting_is_eventually_applied() {
        let store = SqliteStore::in_memory().unwrap();
        store.set(entry("read:1", "read", 60_000)).await.unwrap();

        store.get("read:1").await.unwrap();
        // The detached accounting write lands shortly after the read returns
        tokio::time::sleep(Duration::from_millis(100)).await;

        let got = store.get("read:1").await.unwrap().unwrap();
        assert_eq!(got.hits, 2);
    }

    #[tokio::test]
    async fn test_expired_row_filtered_server_side() {
        let store = SqliteStore::in_memory().unwrap();
        let mut e = entry("read:1", "read", 1000);
        e.stored_at = now_ms() - 2000;
        store.set(e).await.unwrap();

        assert!(store.get("read:1").await.unwrap().is_none());

        // The row is still physically present until purged
        assert_eq!(store.stats().await.unwrap().total_entries, 1);
        let purged = store.purge_expired().unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.stats().await.unwrap().total_entries, 0);
        assert_eq!(store.stats().await.unwrap().eviction_count, 1);
    }

    #[tokio::test]
    async fn test_set_replaces_and_resets_hits() {
        let store = SqliteStore::in_memory().unwrap();
        store.set(entry("read:1", "read", 60_000)).await.unwrap();
        store.get("read:1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        store.set(entry("read:1", "read", 60_000)).await.unwrap();
        let got = store.get("read:1").await.unwrap().unwrap();
        assert_eq!(got.hits, 1);

        assert_eq!(store.stats().await.unwrap().total_entries, 1);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = SqliteStore::in_memory().unwrap();
        store.set(entry("read:1", "read", 60_000)).await.unwrap();
        store.set(entry("read:2", "read", 60_000)).await.unwrap();
        store.set(entry("glob:1", "glob", 60_000)).await.unwrap();

        assert!(store.delete("read:1").await.unwrap());
        assert!(!store.delete("read:1").await.unwrap());

        assert_eq!(store.clear(Some("read")).await.unwrap(), 1);
        assert!(store.get("glob:1").await.unwrap().is_some());
        assert_eq!(store.clear(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_grouped_stats() {
        let store = SqliteStore::in_memory().unwrap();
        store.set(entry("read:1", "read", 60_000)).await.unwrap();
        store.set(entry("read:2", "read", 60_000)).await.unwrap();
        store.set(entry("glob:1", "glob", 60_000)).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_entries, 3);
        assert!(stats.total_size_bytes > 0);
        assert_eq!(stats.entries_by_tool.get("read"), Some(&2));
        assert_eq!(stats.entries_by_tool.get("glob"), Some(&1));
    }

    #[tokio::test]
    async fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = SqliteStore::new(dir.path()).unwrap();
            store.set(entry("read:1", "read", 60_000)).await.unwrap();
        }

        let store = SqliteStore::new(dir.path()).unwrap();
        let got = store.get("read:1").await.unwrap().unwrap();
        assert_eq!(got.value, json!({"out": "read:1"}));
    }

    #[tokio::test]
    async fn test_scheduled_purge() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let mut e = entry("read:1", "read", 10);
        e.stored_at = now_ms() - 1000;
        store.set(e).await.unwrap();

        let handle = Arc::clone(&store).spawn_purge_task(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.abort();

        assert_eq!(store.stats().await.unwrap().total_entries, 0);
    }
}
