//! # toolcache-core
//!
//! Core runtime for ToolCache:
//! - Coordinator: the `CacheLayer` invoked at the runtime's pre/post
//!   tool-execution interception points
//! - Invalidation: mutating-tool fan-out to dependent tools' cached entries
//!
//! ## Control flow
//!
//! ```text
//! runtime ──► CacheLayer::on_pre_tool_use(id, tool, input)
//!               ├── policy `never`            → Bypass
//!               ├── store hit                 → Hit { value, hits }
//!               └── store miss                → Miss (+ PendingLookup[id])
//!           tool executes outside this layer
//! runtime ──► CacheLayer::on_post_tool_use(id, tool, input, output)
//!               ├── PendingLookup[id] + ok    → Store.set(entry)
//!               └── tool is a mutator         → InvalidationEngine fan-out
//! ```

pub mod coordinator;
pub mod invalidation;

// ============================================================================
// Coordinator
// ============================================================================
pub use coordinator::{
    CacheLayer, PostHook, PreDecision, PreHook, ToolResultEvent, ToolUseEvent,
};

// ============================================================================
// Invalidation
// ============================================================================
pub use invalidation::{
    extract_paths, extract_target_path, InvalidationEngine, InvalidationMap, PathIndex,
    PATH_FIELDS,
};

// Re-export the foundation surface so consumers need one dependency
pub use toolcache_foundation::{
    CacheConfig, CacheEntry, CacheStore, CacheStrategy, Error, MemoryStore, PolicyRegistry,
    Result, SqliteStore, StoreStats, ToolCachePolicy, ToolPolicyOverride,
};
