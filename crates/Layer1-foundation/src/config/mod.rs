//! Cache layer configuration
//!
//! Construction-time configuration: snapshotted once, merged onto defaults,
//! never mutated afterward. Loadable from a TOML file or built in code.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::policy::ToolPolicyOverride;
use crate::Result;

/// Cache layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Capacity ceiling for the in-memory store, in bytes
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: usize,

    /// Log every hit and miss at debug level
    #[serde(default)]
    pub verbose: bool,

    /// Per-tool policy overrides, shallow-merged onto the built-in defaults
    #[serde(default)]
    pub policies: HashMap<String, ToolPolicyOverride>,

    /// Invalidation map overrides: mutating tool -> dependent tools.
    /// Merged onto the default map per mutating-tool name.
    #[serde(default)]
    pub invalidations: HashMap<String, Vec<String>>,
}

// Default value functions
fn default_max_total_bytes() -> usize {
    50 * 1024 * 1024
} // 50 MiB

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_total_bytes: default_max_total_bytes(),
            verbose: false,
            policies: HashMap::new(),
            invalidations: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| crate::Error::Config(format!("Invalid cache config: {}", e)))
    }

    /// A small-footprint config for resource-constrained environments
    pub fn minimal() -> Self {
        Self {
            max_total_bytes: 8 * 1024 * 1024, // 8 MiB
            ..Default::default()
        }
    }

    /// An aggressive caching config for performance
    pub fn performance() -> Self {
        Self {
            max_total_bytes: 200 * 1024 * 1024, // 200 MiB
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::CacheStrategy;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_total_bytes, 50 * 1024 * 1024);
        assert!(!config.verbose);
        assert!(config.policies.is_empty());
    }

    #[test]
    fn test_toml_roundtrip() {
        let raw = r#"
            max_total_bytes = 1048576
            verbose = true

            [policies.read]
            ttl_ms = 1000

            [policies.my_tool]
            strategy = "idempotent"
            ttl_ms = 5000
            max_entries = 10

            [invalidations]
            my_writer = ["my_tool"]
        "#;

        let config = CacheConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.max_total_bytes, 1_048_576);
        assert!(config.verbose);
        assert_eq!(config.policies["read"].ttl_ms, Some(1000));
        assert_eq!(
            config.policies["my_tool"].strategy,
            Some(CacheStrategy::Idempotent)
        );
        assert_eq!(config.invalidations["my_writer"], vec!["my_tool"]);
    }

    #[test]
    fn test_unknown_strategy_in_config_fails_closed() {
        let raw = r#"
            [policies.read]
            strategy = "aggressive"
        "#;
        let config = CacheConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.policies["read"].strategy, Some(CacheStrategy::Never));
    }

    #[test]
    fn test_presets() {
        assert!(CacheConfig::minimal().max_total_bytes < CacheConfig::default().max_total_bytes);
        assert!(
            CacheConfig::performance().max_total_bytes > CacheConfig::default().max_total_bytes
        );
    }
}
