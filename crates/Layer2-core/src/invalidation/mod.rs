//! Cross-tool invalidation
//!
//! When a mutating tool completes, entries cached for dependent read-like
//! tools may be stale. The engine removes them at two granularities: if the
//! mutation's input names a recognizable target path, only dependent entries
//! recorded against that exact path are deleted; otherwise the dependent
//! tool's cache is cleared wholesale. Over-invalidating costs a future miss;
//! under-invalidating serves stale data, so the coarse fallback errs wide.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use toolcache_foundation::store::CacheStore;
use toolcache_foundation::strings::{
    TOOL_BASH, TOOL_EDIT, TOOL_GLOB, TOOL_GREP, TOOL_READ, TOOL_TASK, TOOL_WRITE,
};

/// Input field names recognized as a mutation's target path, checked in order
pub const PATH_FIELDS: &[&str] = &["path", "file_path", "filepath", "target_path", "file"];

/// First recognized target-path field on an input, if any
pub fn extract_target_path(input: &Value) -> Option<String> {
    let obj = input.as_object()?;
    for field in PATH_FIELDS {
        if let Some(Value::String(path)) = obj.get(*field) {
            return Some(path.clone());
        }
    }
    None
}

/// Every recognized path referenced by an input (for index recording)
pub fn extract_paths(input: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    if let Some(obj) = input.as_object() {
        for field in PATH_FIELDS {
            if let Some(Value::String(path)) = obj.get(*field) {
                if !paths.contains(path) {
                    paths.push(path.clone());
                }
            }
        }
    }
    paths
}

/// Static mutating-tool -> dependent-tools map
#[derive(Debug, Clone)]
pub struct InvalidationMap {
    map: HashMap<String, Vec<String>>,
}

impl InvalidationMap {
    /// The default wiring for the built-in tool set.
    ///
    /// `write` and `edit` target single files; `bash` and `task` may have
    /// touched anything, including files that match cached globs.
    pub fn new() -> Self {
        Self::with_overrides(&HashMap::new())
    }

    /// Default map with caller overrides merged per mutating-tool name
    pub fn with_overrides(overrides: &HashMap<String, Vec<String>>) -> Self {
        let mut map = Self::defaults();
        for (tool, dependents) in overrides {
            map.insert(tool.clone(), dependents.clone());
        }
        Self { map }
    }

    fn defaults() -> HashMap<String, Vec<String>> {
        let read_like = || vec![TOOL_READ.to_string(), TOOL_GLOB.to_string(), TOOL_GREP.to_string()];
        let mut map = HashMap::new();
        map.insert(TOOL_WRITE.to_string(), read_like());
        map.insert(
            TOOL_EDIT.to_string(),
            vec![TOOL_READ.to_string(), TOOL_GREP.to_string()],
        );
        map.insert(TOOL_BASH.to_string(), read_like());
        map.insert(TOOL_TASK.to_string(), read_like());
        map
    }

    /// Dependent cacheable tools for a mutating tool, if it is one
    pub fn dependents(&self, tool: &str) -> Option<&[String]> {
        self.map.get(tool).map(|v| v.as_slice())
    }

    /// Whether this tool is a recognized mutator
    pub fn is_mutator(&self, tool: &str) -> bool {
        self.map.contains_key(tool)
    }
}

impl Default for InvalidationMap {
    fn default() -> Self {
        Self::new()
    }
}

/// In-process record of which cache keys referenced which paths.
///
/// Populated when entries are stored, consulted for path-specific
/// invalidation. Purely bookkeeping: a key listed here may already have been
/// evicted or expired by the store, in which case deleting it is a no-op.
#[derive(Debug, Default)]
pub struct PathIndex {
    /// path -> (key -> tool)
    inner: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a stored key with a path it referenced
    pub fn record(&self, path: &str, key: &str, tool: &str) {
        self.inner
            .lock()
            .entry(path.to_string())
            .or_default()
            .insert(key.to_string(), tool.to_string());
    }

    /// Keys recorded against a path, with their tools
    pub fn keys_for(&self, path: &str) -> Vec<(String, String)> {
        self.inner
            .lock()
            .get(path)
            .map(|keys| keys.iter().map(|(k, t)| (k.clone(), t.clone())).collect())
            .unwrap_or_default()
    }

    /// Keys a given tool recorded against a path
    pub fn keys_for_tool(&self, path: &str, tool: &str) -> Vec<String> {
        self.inner
            .lock()
            .get(path)
            .map(|keys| {
                keys.iter()
                    .filter(|(_, t)| t.as_str() == tool)
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop a key from every path it was recorded under
    pub fn remove_key(&self, key: &str) {
        let mut inner = self.inner.lock();
        for keys in inner.values_mut() {
            keys.remove(key);
        }
        inner.retain(|_, keys| !keys.is_empty());
    }

    /// Drop all keys recorded for one tool
    pub fn remove_tool(&self, tool: &str) {
        let mut inner = self.inner.lock();
        for keys in inner.values_mut() {
            keys.retain(|_, t| t != tool);
        }
        inner.retain(|_, keys| !keys.is_empty());
    }

    /// Drop everything
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

/// Fans a completed mutation out to the dependent tools' cached entries
pub struct InvalidationEngine {
    map: InvalidationMap,
    store: Arc<dyn CacheStore>,
    path_index: Arc<PathIndex>,
}

impl InvalidationEngine {
    pub fn new(map: InvalidationMap, store: Arc<dyn CacheStore>, path_index: Arc<PathIndex>) -> Self {
        Self {
            map,
            store,
            path_index,
        }
    }

    pub fn map(&self) -> &InvalidationMap {
        &self.map
    }

    /// Invalidate dependents of a completed mutation. Returns entries removed.
    ///
    /// Store failures are logged and swallowed; a failed delete only means a
    /// future read may miss where it could have hit.
    pub async fn on_mutation(&self, tool: &str, input: &Value) -> usize {
        let Some(dependents) = self.map.dependents(tool) else {
            return 0;
        };

        let mut removed = 0;
        match extract_target_path(input) {
            Some(path) => {
                // Path-specific: only entries recorded against this exact path
                for dependent in dependents {
                    for key in self.path_index.keys_for_tool(&path, dependent) {
                        match self.store.delete(&key).await {
                            Ok(true) => removed += 1,
                            Ok(false) => {}
                            Err(e) => warn!(key = %key, error = %e, "invalidation delete failed"),
                        }
                        self.path_index.remove_key(&key);
                    }
                }
                debug!(tool = %tool, path = %path, removed, "path-specific invalidation");
            }
            None => {
                // Coarse: no target to correlate, clear each dependent tool
                for dependent in dependents {
                    match self.store.clear(Some(dependent)).await {
                        Ok(count) => removed += count,
                        Err(e) => {
                            warn!(tool = %dependent, error = %e, "invalidation clear failed")
                        }
                    }
                    self.path_index.remove_tool(dependent);
                }
                debug!(tool = %tool, removed, "coarse invalidation");
            }
        }
        removed
    }
}
