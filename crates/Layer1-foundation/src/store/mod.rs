//! Cache store contract and implementations
//!
//! A store is a key -> entry mapping with time-based expiry. Two backends
//! implement the same contract: [`MemoryStore`] (single-process, LRU with a
//! byte ceiling) and [`SqliteStore`] (durable, survives restarts, purged on
//! a schedule instead of evicted on write). Given identical call sequences
//! and wall-clock progression they answer identically, modulo the SQLite
//! backend's relaxed hit-count accounting.

pub mod memory;
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Current time as milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One cached tool result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache key; globally unique within a store
    pub key: String,
    /// Producing tool's name, for bulk clearing and per-tool statistics
    pub tool: String,
    /// The tool's output payload, opaque to this layer
    pub value: Value,
    /// When the entry was written, in ms since epoch
    pub stored_at: i64,
    /// Time-to-live in milliseconds
    pub ttl_ms: i64,
    /// Times served from cache since creation
    pub hits: u64,
    /// Serialized size of the cached value
    pub size_bytes: usize,
}

impl CacheEntry {
    /// Build a freshly-stored entry for a tool output
    pub fn new(key: impl Into<String>, tool: impl Into<String>, value: Value, ttl_ms: i64) -> Self {
        let size_bytes = value.to_string().len();
        Self {
            key: key.into(),
            tool: tool.into(),
            value,
            stored_at: now_ms(),
            ttl_ms,
            hits: 0,
            size_bytes,
        }
    }

    /// Whether the entry is logically expired at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        now - self.stored_at > self.ttl_ms
    }
}

/// Aggregate store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Live entries currently resident
    pub total_entries: usize,
    /// Sum of resident entry sizes in bytes
    pub total_size_bytes: usize,
    /// Reads served from cache since construction
    pub hit_count: u64,
    /// Reads that found nothing (or only an expired entry)
    pub miss_count: u64,
    /// Entries removed to reclaim space
    pub eviction_count: u64,
    /// Resident entry count per tool
    pub entries_by_tool: HashMap<String, usize>,
}

/// The key -> entry mapping both backends implement.
///
/// Expired entries are never returned by `get`; implementations may delete
/// them lazily on read or in bulk, but must treat them as absent either way.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a live entry. An expired entry is a miss.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Write an entry, replacing any existing entry for its key. The stored
    /// hit counter is reset to the value carried by `entry`.
    async fn set(&self, entry: CacheEntry) -> Result<()>;

    /// Remove an entry. Returns whether one existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove all entries, or only one tool's entries. Returns the count
    /// removed.
    async fn clear(&self, tool: Option<&str>) -> Result<usize>;

    /// Aggregate statistics
    async fn stats(&self) -> Result<StoreStats>;
}
