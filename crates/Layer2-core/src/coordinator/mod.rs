//! Interception coordinator
//!
//! The orchestration layer the agent runtime calls at its two interception
//! points. Pre-execution decides whether a cached value can be surfaced;
//! post-execution stores cacheable results and fans out invalidation for
//! mutators. The two sides of one lookup are correlated through the
//! runtime-supplied invocation identifier, never by call/return pairing:
//! the runtime may interleave any number of invocations, including the same
//! tool with the same input, and completions may arrive out of order.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use toolcache_foundation::config::CacheConfig;
use toolcache_foundation::key::derive_key;
use toolcache_foundation::policy::{PolicyRegistry, ToolCachePolicy};
use toolcache_foundation::store::{CacheEntry, CacheStore, MemoryStore, StoreStats};
use toolcache_foundation::Result;

use crate::invalidation::{extract_paths, InvalidationEngine, InvalidationMap, PathIndex};

// ============================================================================
// Events - what the runtime hands to each interception point
// ============================================================================

/// A tool invocation about to execute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseEvent {
    /// Runtime-supplied identifier for this invocation
    pub invocation_id: String,
    /// Tool name
    pub tool: String,
    /// Tool input (JSON)
    pub input: Value,
}

impl ToolUseEvent {
    pub fn new(invocation_id: impl Into<String>, tool: impl Into<String>, input: Value) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            tool: tool.into(),
            input,
        }
    }
}

/// A tool invocation that finished executing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultEvent {
    /// Runtime-supplied identifier, matching the pre-execution event
    pub invocation_id: String,
    /// Tool name
    pub tool: String,
    /// Tool input (JSON)
    pub input: Value,
    /// Tool output, absent when execution failed before producing one
    pub output: Option<Value>,
    /// Whether the tool execution succeeded
    pub success: bool,
}

impl ToolResultEvent {
    pub fn succeeded(
        invocation_id: impl Into<String>,
        tool: impl Into<String>,
        input: Value,
        output: Value,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            tool: tool.into(),
            input,
            output: Some(output),
            success: true,
        }
    }

    pub fn failed(
        invocation_id: impl Into<String>,
        tool: impl Into<String>,
        input: Value,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            tool: tool.into(),
            input,
            output: None,
            success: false,
        }
    }
}

/// Pre-execution decision returned to the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum PreDecision {
    /// Proceed; this invocation will not be cached
    Bypass,
    /// Proceed; report the result back so it can be cached
    Miss,
    /// A live cached value exists. The runtime chooses whether to skip
    /// execution or run anyway and use this as supplementary context; the
    /// layer only surfaces the hit.
    Hit {
        value: Value,
        /// Times this entry has been served, including this read
        hits: u64,
    },
}

/// Correlation record between the two interception points of one invocation.
///
/// Created on a miss at pre-execution, consumed exactly once at
/// post-execution. Held only in memory: an abandoned lookup (crash, hung
/// tool) dies with the process.
#[derive(Debug, Clone)]
struct PendingLookup {
    key: String,
    tool: String,
}

/// Hook callables usable as the runtime's interception points
pub type PreHook = Box<dyn Fn(ToolUseEvent) -> BoxFuture<'static, PreDecision> + Send + Sync>;
pub type PostHook = Box<dyn Fn(ToolResultEvent) -> BoxFuture<'static, ()> + Send + Sync>;

// ============================================================================
// CacheLayer
// ============================================================================

/// Tool-result caching and invalidation layer.
///
/// # Usage
///
/// ```rust,ignore
/// let layer = Arc::new(CacheLayer::new());
/// let (pre, post) = Arc::clone(&layer).hooks();
///
/// // At the runtime's pre-execution point:
/// match pre(ToolUseEvent::new(&call_id, "read", input.clone())).await {
///     PreDecision::Hit { value, .. } => return value,
///     _ => {}
/// }
/// // ... tool executes ...
/// post(ToolResultEvent::succeeded(&call_id, "read", input, output)).await;
/// ```
pub struct CacheLayer {
    config: CacheConfig,
    policies: PolicyRegistry,
    store: Arc<dyn CacheStore>,
    invalidation: InvalidationEngine,
    path_index: Arc<PathIndex>,
    /// In-flight lookups keyed by invocation id
    pending: Mutex<HashMap<String, PendingLookup>>,
    /// Per-tool insertion order, for enforcing each tool's capacity share
    tool_keys: Mutex<HashMap<String, VecDeque<String>>>,
}

impl CacheLayer {
    /// Layer with default configuration and the in-memory store
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Layer with custom configuration and the in-memory store
    pub fn with_config(config: CacheConfig) -> Self {
        let store: Arc<dyn CacheStore> =
            Arc::new(MemoryStore::with_max_bytes(config.max_total_bytes));
        Self::with_store(store, config)
    }

    /// Layer with a pluggable store (e.g. [`SqliteStore`] for durability)
    ///
    /// [`SqliteStore`]: toolcache_foundation::store::SqliteStore
    pub fn with_store(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        let policies = PolicyRegistry::with_overrides(&config.policies);
        let path_index = Arc::new(PathIndex::new());
        let map = InvalidationMap::with_overrides(&config.invalidations);
        let invalidation =
            InvalidationEngine::new(map, Arc::clone(&store), Arc::clone(&path_index));

        Self {
            config,
            policies,
            store,
            invalidation,
            path_index,
            pending: Mutex::new(HashMap::new()),
            tool_keys: Mutex::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Interception points
    // =========================================================================

    /// Pre-execution interception point
    pub async fn on_pre_tool_use(
        &self,
        invocation_id: &str,
        tool: &str,
        input: &Value,
    ) -> PreDecision {
        let policy = self.policies.resolve(tool);
        if !policy.is_cacheable() {
            trace!(tool = %tool, "cache bypass (policy)");
            return PreDecision::Bypass;
        }

        let key = match derive_key(tool, input, &policy.exclude_from_key, policy.key_fn.as_ref())
        {
            Ok(key) => key,
            Err(e) => {
                // Underivable inputs proceed uncached, never fail the tool
                debug!(tool = %tool, error = %e, "key derivation failed, proceeding uncached");
                return PreDecision::Bypass;
            }
        };

        match self.store.get(&key).await {
            Ok(Some(entry)) => {
                if self.config.verbose {
                    debug!(tool = %tool, key = %key, hits = entry.hits, "cache hit");
                }
                PreDecision::Hit {
                    value: entry.value,
                    hits: entry.hits,
                }
            }
            Ok(None) => {
                if self.config.verbose {
                    debug!(tool = %tool, key = %key, "cache miss");
                }
                self.pending.lock().insert(
                    invocation_id.to_string(),
                    PendingLookup {
                        key,
                        tool: tool.to_string(),
                    },
                );
                PreDecision::Miss
            }
            Err(e) => {
                // Store unavailability degrades to a miss; still record the
                // pending lookup so the result gets a chance to be stored.
                warn!(tool = %tool, error = %e, "cache read failed, treating as miss");
                self.pending.lock().insert(
                    invocation_id.to_string(),
                    PendingLookup {
                        key,
                        tool: tool.to_string(),
                    },
                );
                PreDecision::Miss
            }
        }
    }

    /// Post-execution interception point
    pub async fn on_post_tool_use(
        &self,
        invocation_id: &str,
        tool: &str,
        input: &Value,
        output: Option<&Value>,
        success: bool,
    ) {
        let pending = self.pending.lock().remove(invocation_id);

        if let Some(pending) = pending {
            if success {
                if let Some(output) = output {
                    self.store_result(&pending, input, output).await;
                }
            }
        }

        // Mutators invalidate dependents whether or not a lookup was pending
        // (their own policy is typically `never`, so none is).
        if self.invalidation.map().is_mutator(tool) {
            self.invalidation.on_mutation(tool, input).await;
        }
    }

    /// Store a completed result under its pending lookup's key
    async fn store_result(&self, pending: &PendingLookup, input: &Value, output: &Value) {
        let policy = self.policies.resolve(&pending.tool);
        let entry = CacheEntry::new(
            pending.key.clone(),
            pending.tool.clone(),
            output.clone(),
            policy.ttl_ms as i64,
        );

        if let Err(e) = self.store.set(entry).await {
            // Caching is best-effort; the tool already has its result
            warn!(tool = %pending.tool, error = %e, "cache write failed");
            return;
        }
        if self.config.verbose {
            debug!(tool = %pending.tool, key = %pending.key, "cached tool result");
        }

        // Remember which paths this entry referenced, for invalidation
        for path in extract_paths(input) {
            self.path_index.record(&path, &pending.key, &pending.tool);
        }

        self.enforce_tool_share(&pending.tool, &pending.key, policy.max_entries)
            .await;
    }

    /// Keep a tool within its configured entry share, oldest keys first.
    ///
    /// Enforced here rather than in the stores so both backends observe the
    /// same bound.
    async fn enforce_tool_share(&self, tool: &str, key: &str, max_entries: usize) {
        let overflow: Vec<String> = {
            let mut tool_keys = self.tool_keys.lock();
            let ring = tool_keys.entry(tool.to_string()).or_default();
            ring.retain(|k| k != key);
            ring.push_back(key.to_string());

            let mut overflow = Vec::new();
            while ring.len() > max_entries {
                if let Some(oldest) = ring.pop_front() {
                    overflow.push(oldest);
                }
            }
            overflow
        };

        for stale in overflow {
            match self.store.delete(&stale).await {
                Ok(_) => {}
                Err(e) => warn!(key = %stale, error = %e, "tool-share delete failed"),
            }
            self.path_index.remove_key(&stale);
        }
    }

    // =========================================================================
    // Runtime-facing surface
    // =========================================================================

    /// The pre/post interception callables, for handing to the runtime
    pub fn hooks(self: Arc<Self>) -> (PreHook, PostHook) {
        let layer = Arc::clone(&self);
        let pre: PreHook = Box::new(move |event: ToolUseEvent| {
            let layer = Arc::clone(&layer);
            Box::pin(async move {
                layer
                    .on_pre_tool_use(&event.invocation_id, &event.tool, &event.input)
                    .await
            })
        });

        let layer = self;
        let post: PostHook = Box::new(move |event: ToolResultEvent| {
            let layer = Arc::clone(&layer);
            Box::pin(async move {
                layer
                    .on_post_tool_use(
                        &event.invocation_id,
                        &event.tool,
                        &event.input,
                        event.output.as_ref(),
                        event.success,
                    )
                    .await
            })
        });

        (pre, post)
    }

    /// Aggregate statistics from the backing store
    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }

    /// Clear everything, or one tool's entries. Returns the count removed.
    pub async fn clear(&self, tool: Option<&str>) -> Result<usize> {
        let removed = self.store.clear(tool).await?;
        match tool {
            Some(tool) => {
                self.path_index.remove_tool(tool);
                self.tool_keys.lock().remove(tool);
            }
            None => {
                self.path_index.clear();
                self.tool_keys.lock().clear();
            }
        }
        Ok(removed)
    }

    /// Remove one entry by key. Returns whether it existed.
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let existed = self.store.delete(key).await?;
        self.path_index.remove_key(key);
        Ok(existed)
    }

    /// Remove every entry, across all path-aware tools, whose recorded input
    /// referenced this path. Returns the count removed.
    pub async fn invalidate_by_path(&self, path: &str) -> Result<usize> {
        let mut removed = 0;
        for (key, _tool) in self.path_index.keys_for(path) {
            if self.store.delete(&key).await? {
                removed += 1;
            }
            self.path_index.remove_key(&key);
        }
        Ok(removed)
    }

    /// The resolved policy for a tool, if one is configured
    pub fn get_policy(&self, tool: &str) -> Option<&ToolCachePolicy> {
        self.policies.get(tool)
    }

    /// In-flight pending lookups (for monitoring)
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// The active configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl Default for CacheLayer {
    fn default() -> Self {
        Self::new()
    }
}
