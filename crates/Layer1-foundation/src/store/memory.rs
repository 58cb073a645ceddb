//! In-memory cache store
//!
//! Single-process backing store with least-recently-used eviction against a
//! byte ceiling. TTL is checked lazily on `get`; an expired entry's space is
//! reclaimed the next time it is touched, not by a background sweep.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::{now_ms, CacheEntry, CacheStore, StoreStats};
use crate::{Error, Result};

/// Default capacity ceiling: 50 MiB
pub const DEFAULT_MAX_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    last_access: u64,
}

#[derive(Debug)]
struct Inner {
    entries: HashMap<String, Slot>,
    max_bytes: usize,
    /// Monotonic access counter for LRU ordering
    access_counter: u64,
    current_bytes: usize,
    hit_count: u64,
    miss_count: u64,
    eviction_count: u64,
}

impl Inner {
    /// Evict the least-recently-accessed entry. Returns whether one existed.
    fn evict_lru(&mut self) -> bool {
        let lru_key = self
            .entries
            .iter()
            .min_by_key(|(_, slot)| slot.last_access)
            .map(|(k, _)| k.clone());

        match lru_key {
            Some(key) => {
                if let Some(slot) = self.entries.remove(&key) {
                    self.current_bytes = self.current_bytes.saturating_sub(slot.entry.size_bytes);
                    self.eviction_count += 1;
                    debug!(key = %key, tool = %slot.entry.tool, "evicted LRU cache entry");
                }
                true
            }
            None => false,
        }
    }
}

/// Volatile in-process store with LRU eviction
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Store with the default byte ceiling
    pub fn new() -> Self {
        Self::with_max_bytes(DEFAULT_MAX_BYTES)
    }

    /// Store with a custom byte ceiling
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                max_bytes,
                access_counter: 0,
                current_bytes: 0,
                hit_count: 0,
                miss_count: 0,
                eviction_count: 0,
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))
    }

    /// Resident bytes, for capacity assertions
    pub fn current_bytes(&self) -> usize {
        self.inner.lock().map(|i| i.current_bytes).unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let mut inner = self.lock()?;
        let now = now_ms();

        let expired = match inner.entries.get(key) {
            Some(slot) => slot.entry.is_expired(now),
            None => {
                inner.miss_count += 1;
                return Ok(None);
            }
        };

        if expired {
            // Lazy reclaim: the expired entry's space is freed on touch
            if let Some(slot) = inner.entries.remove(key) {
                inner.current_bytes = inner.current_bytes.saturating_sub(slot.entry.size_bytes);
            }
            inner.miss_count += 1;
            return Ok(None);
        }

        inner.access_counter += 1;
        inner.hit_count += 1;
        let counter = inner.access_counter;
        match inner.entries.get_mut(key) {
            Some(slot) => {
                slot.last_access = counter;
                slot.entry.hits += 1;
                Ok(Some(slot.entry.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, entry: CacheEntry) -> Result<()> {
        let mut inner = self.lock()?;

        if entry.size_bytes > inner.max_bytes {
            debug!(
                key = %entry.key,
                size = entry.size_bytes,
                ceiling = inner.max_bytes,
                "cache entry larger than capacity ceiling, not stored"
            );
            return Ok(());
        }

        // Writes replace, never append
        if let Some(old) = inner.entries.remove(&entry.key) {
            inner.current_bytes = inner.current_bytes.saturating_sub(old.entry.size_bytes);
        }

        while inner.current_bytes + entry.size_bytes > inner.max_bytes {
            if !inner.evict_lru() {
                break;
            }
        }

        inner.access_counter += 1;
        inner.current_bytes += entry.size_bytes;
        let slot = Slot {
            last_access: inner.access_counter,
            entry,
        };
        inner.entries.insert(slot.entry.key.clone(), slot);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.entries.remove(key) {
            Some(slot) => {
                inner.current_bytes = inner.current_bytes.saturating_sub(slot.entry.size_bytes);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear(&self, tool: Option<&str>) -> Result<usize> {
        let mut inner = self.lock()?;
        match tool {
            Some(tool) => {
                let keys: Vec<String> = inner
                    .entries
                    .iter()
                    .filter(|(_, slot)| slot.entry.tool == tool)
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in &keys {
                    if let Some(slot) = inner.entries.remove(key) {
                        inner.current_bytes =
                            inner.current_bytes.saturating_sub(slot.entry.size_bytes);
                    }
                }
                Ok(keys.len())
            }
            None => {
                let count = inner.entries.len();
                inner.entries.clear();
                inner.current_bytes = 0;
                Ok(count)
            }
        }
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.lock()?;
        let mut entries_by_tool: HashMap<String, usize> = HashMap::new();
        for slot in inner.entries.values() {
            *entries_by_tool.entry(slot.entry.tool.clone()).or_default() += 1;
        }

        Ok(StoreStats {
            total_entries: inner.entries.len(),
            total_size_bytes: inner.current_bytes,
            hit_count: inner.hit_count,
            miss_count: inner.miss_count,
            eviction_count: inner.eviction_count,
            entries_by_tool,
        })
    }
}
