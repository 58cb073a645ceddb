//! # toolcache-foundation
//!
//! Foundation layer for ToolCache:
//! - Error: central error type (non-fatal by design; the cache is additive)
//! - Key: deterministic cache-key derivation from tool inputs
//! - Policy: per-tool caching strategy, TTL, capacity share, key exclusions
//! - Store: the `CacheStore` contract with in-memory and SQLite backends
//! - Config: construction-time configuration (TOML-loadable)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Layer2-core (CacheLayer)                               │
//! │  ├── pre/post tool-use interception                     │
//! │  └── invalidation fan-out                               │
//! │                     │                                   │
//! │                     ▼                                   │
//! │  Layer1-foundation (this layer)                         │
//! │  ├── PolicyRegistry (strategy / TTL / exclusions)       │
//! │  ├── derive_key ("{tool}:{hash}")                       │
//! │  └── CacheStore ── MemoryStore (LRU, byte ceiling)      │
//! │                 └─ SqliteStore (durable, purged)        │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod key;
pub mod policy;
pub mod store;
pub mod strings;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Key derivation
// ============================================================================
pub use key::{canonical_form, derive_key, KeyFn};

// ============================================================================
// Policy
// ============================================================================
pub use policy::{CacheStrategy, PolicyRegistry, ToolCachePolicy, ToolPolicyOverride};

// ============================================================================
// Store
// ============================================================================
pub use store::{
    now_ms, CacheEntry, CacheStore, MemoryStore, SqliteStore, StoreStats,
};

// ============================================================================
// Config
// ============================================================================
pub use config::CacheConfig;

// ============================================================================
// Tool name constants
// ============================================================================
pub use strings::{
    builtin_tool_name, TOOL_BASH, TOOL_EDIT, TOOL_GLOB, TOOL_GREP, TOOL_READ, TOOL_TASK,
    TOOL_WEB_FETCH, TOOL_WEB_SEARCH, TOOL_WRITE,
};
