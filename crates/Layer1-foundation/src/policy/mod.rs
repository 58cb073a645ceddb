//! Tool caching policies
//!
//! Maps each tool name to a caching policy. Built-in defaults cover the
//! well-known tool set; caller overrides are shallow-merged on top at
//! construction time and the table is immutable afterward. Unknown tool
//! names resolve to `never`: caching is opt-in for anything whose
//! side-effect profile this layer cannot know.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::KeyFn;
use crate::strings::{
    TOOL_BASH, TOOL_EDIT, TOOL_GLOB, TOOL_GREP, TOOL_READ, TOOL_TASK, TOOL_WEB_FETCH,
    TOOL_WEB_SEARCH, TOOL_WRITE,
};

// Default TTLs. Local reads are minutes-scale, listing/search shorter
// (directory contents churn faster than single files), web fetches an order
// of magnitude longer than local reads.
const TTL_READ_MS: u64 = 5 * 60 * 1000;
const TTL_LISTING_MS: u64 = 2 * 60 * 1000;
const TTL_WEB_FETCH_MS: u64 = 60 * 60 * 1000;
const TTL_WEB_SEARCH_MS: u64 = 10 * 60 * 1000;

/// Caching strategy for one tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    /// Cache unconditionally
    Always,
    /// Cache; results are read-like and may legitimately drift over time
    Idempotent,
    /// Bypass the cache entirely
    Never,
}

// Unrecognized strategy values deserialize to Never (fail closed: when in
// doubt, do not cache).
impl<'de> Deserialize<'de> for CacheStrategy {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "always" => CacheStrategy::Always,
            "idempotent" => CacheStrategy::Idempotent,
            _ => CacheStrategy::Never,
        })
    }
}

/// Caching policy for one tool name
#[derive(Clone, Serialize, Deserialize)]
pub struct ToolCachePolicy {
    /// Caching strategy
    pub strategy: CacheStrategy,
    /// Time-to-live for entries, in milliseconds
    pub ttl_ms: u64,
    /// This tool's share of cache capacity; 0 makes the policy a hard no-op
    pub max_entries: usize,
    /// Input field names ignored during key derivation
    #[serde(default)]
    pub exclude_from_key: Vec<String>,
    /// Custom key-derivation function overriding the default canonicalization
    #[serde(skip)]
    pub key_fn: Option<KeyFn>,
}

impl ToolCachePolicy {
    /// A policy that never caches
    pub fn never() -> Self {
        Self {
            strategy: CacheStrategy::Never,
            ttl_ms: 0,
            max_entries: 0,
            exclude_from_key: Vec::new(),
            key_fn: None,
        }
    }

    /// An idempotent-read policy with the given bounds
    pub fn idempotent(ttl_ms: u64, max_entries: usize) -> Self {
        Self {
            strategy: CacheStrategy::Idempotent,
            ttl_ms,
            max_entries,
            exclude_from_key: Vec::new(),
            key_fn: None,
        }
    }

    /// Whether this policy permits writing entries at all
    pub fn is_cacheable(&self) -> bool {
        self.strategy != CacheStrategy::Never && self.max_entries > 0
    }
}

impl fmt::Debug for ToolCachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCachePolicy")
            .field("strategy", &self.strategy)
            .field("ttl_ms", &self.ttl_ms)
            .field("max_entries", &self.max_entries)
            .field("exclude_from_key", &self.exclude_from_key)
            .field("key_fn", &self.key_fn.as_ref().map(|_| "<custom>"))
            .finish()
    }
}

/// Partial policy record, shallow-merged onto a tool's default policy
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPolicyOverride {
    pub strategy: Option<CacheStrategy>,
    pub ttl_ms: Option<u64>,
    pub max_entries: Option<usize>,
    pub exclude_from_key: Option<Vec<String>>,
    #[serde(skip)]
    pub key_fn: Option<KeyFn>,
}

impl ToolPolicyOverride {
    /// Merge this override onto a base policy
    fn apply(&self, base: &ToolCachePolicy) -> ToolCachePolicy {
        ToolCachePolicy {
            strategy: self.strategy.unwrap_or(base.strategy),
            ttl_ms: self.ttl_ms.unwrap_or(base.ttl_ms),
            max_entries: self.max_entries.unwrap_or(base.max_entries),
            exclude_from_key: self
                .exclude_from_key
                .clone()
                .unwrap_or_else(|| base.exclude_from_key.clone()),
            key_fn: self.key_fn.clone().or_else(|| base.key_fn.clone()),
        }
    }
}

impl fmt::Debug for ToolPolicyOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolPolicyOverride")
            .field("strategy", &self.strategy)
            .field("ttl_ms", &self.ttl_ms)
            .field("max_entries", &self.max_entries)
            .field("exclude_from_key", &self.exclude_from_key)
            .field("key_fn", &self.key_fn.as_ref().map(|_| "<custom>"))
            .finish()
    }
}

/// Per-tool policy table, immutable after construction
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: HashMap<String, ToolCachePolicy>,
    fallback: ToolCachePolicy,
}

impl PolicyRegistry {
    /// Registry seeded with the built-in defaults only
    pub fn new() -> Self {
        Self::with_overrides(&HashMap::new())
    }

    /// Registry with caller overrides shallow-merged onto the defaults.
    ///
    /// An override for an unknown tool name starts from the `never` fallback,
    /// so opting an external tool in requires an explicit strategy.
    pub fn with_overrides(overrides: &HashMap<String, ToolPolicyOverride>) -> Self {
        let mut policies = Self::builtin_defaults();
        let fallback = ToolCachePolicy::never();

        for (tool, over) in overrides {
            let base = policies.get(tool).unwrap_or(&fallback);
            let merged = over.apply(base);
            policies.insert(tool.clone(), merged);
        }

        Self { policies, fallback }
    }

    fn builtin_defaults() -> HashMap<String, ToolCachePolicy> {
        let mut policies = HashMap::new();

        policies.insert(
            TOOL_READ.to_string(),
            ToolCachePolicy::idempotent(TTL_READ_MS, 100),
        );
        policies.insert(
            TOOL_GLOB.to_string(),
            ToolCachePolicy::idempotent(TTL_LISTING_MS, 50),
        );
        policies.insert(
            TOOL_GREP.to_string(),
            ToolCachePolicy::idempotent(TTL_LISTING_MS, 50),
        );
        policies.insert(
            TOOL_WEB_FETCH.to_string(),
            ToolCachePolicy::idempotent(TTL_WEB_FETCH_MS, 25),
        );
        policies.insert(
            TOOL_WEB_SEARCH.to_string(),
            ToolCachePolicy::idempotent(TTL_WEB_SEARCH_MS, 25),
        );

        // Anything that mutates state or has side effects is never cached
        for tool in [TOOL_WRITE, TOOL_EDIT, TOOL_BASH, TOOL_TASK] {
            policies.insert(tool.to_string(), ToolCachePolicy::never());
        }

        policies
    }

    /// Get the configured policy for a tool, if one exists
    pub fn get(&self, tool: &str) -> Option<&ToolCachePolicy> {
        self.policies.get(tool)
    }

    /// Resolve a tool name to its policy; unknown tools resolve to `never`
    pub fn resolve(&self, tool: &str) -> &ToolCachePolicy {
        self.policies.get(tool).unwrap_or(&self.fallback)
    }

    /// Tool names with a configured policy
    pub fn tools(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(|s| s.as_str())
    }

    /// Cacheable tool names (those a mutation could leave stale)
    pub fn cacheable_tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = self
            .policies
            .iter()
            .filter(|(_, p)| p.is_cacheable())
            .map(|(t, _)| t.clone())
            .collect();
        tools.sort();
        tools
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
