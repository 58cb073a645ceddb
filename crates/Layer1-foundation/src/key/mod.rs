//! Cache key derivation
//!
//! Converts a tool invocation's input into a deterministic, comparable cache
//! key. Two logically-identical inputs (same fields in any order, excluded
//! fields varying freely) always derive the same key; logically-different
//! inputs collide only with hash-collision probability, which is acceptable
//! for a cache lookup.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_json::Value;

use crate::{Error, Result};

/// Custom key-derivation function: `(tool_name, input) -> key`
///
/// Overrides the default canonicalization for a tool when the default would
/// either over-split (caching the same logical operation under many keys) or
/// over-merge (ignoring a field that does matter).
pub type KeyFn = Arc<dyn Fn(&str, &Value) -> String + Send + Sync>;

/// Serialize a JSON value into a canonical, whitespace-free textual form.
///
/// Object fields are sorted by name; fields named in `exclude` are dropped
/// at the top level only (exclusions are input *field* names, not paths).
pub fn canonical_form(input: &Value, exclude: &[String]) -> String {
    let mut out = String::new();
    write_canonical(input, exclude, true, &mut out);
    out
}

fn write_canonical(value: &Value, exclude: &[String], top_level: bool, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            // serde_json's escaping keeps the form unambiguous
            out.push_str(&Value::String(s.clone()).to_string());
        }
        Value::Array(arr) => {
            out.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, exclude, false, out);
            }
            out.push(']');
        }
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj
                .keys()
                .filter(|k| !(top_level && exclude.iter().any(|e| e == *k)))
                .collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&obj[*key], exclude, false, out);
            }
            out.push('}');
        }
    }
}

/// Hash a canonical form with a fast non-cryptographic hasher
fn hash_canonical(canonical: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    hasher.finish()
}

/// Derive the cache key for one `(tool, input)` pair.
///
/// A custom key function, when supplied, wins outright; otherwise the key is
/// `"{tool}:{hash}"` over the canonical form with `exclude` fields dropped.
pub fn derive_key(
    tool: &str,
    input: &Value,
    exclude: &[String],
    key_fn: Option<&KeyFn>,
) -> Result<String> {
    if let Some(f) = key_fn {
        let key = f(tool, input);
        if key.is_empty() {
            return Err(Error::key_derivation(tool, "custom key function returned an empty key"));
        }
        return Ok(key);
    }

    if tool.is_empty() {
        return Err(Error::key_derivation(tool, "empty tool name"));
    }

    let canonical = canonical_form(input, exclude);
    Ok(format!("{}:{:016x}", tool, hash_canonical(&canonical)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_independent() {
        let a = json!({"path": "/a.txt", "limit": 10});
        let b = json!({"limit": 10, "path": "/a.txt"});

        assert_eq!(
            derive_key("read", &a, &[], None).unwrap(),
            derive_key("read", &b, &[], None).unwrap()
        );
    }

    #[test]
    fn test_excluded_fields_ignored() {
        let exclude = vec!["description".to_string()];
        let a = json!({"path": "/a.txt", "description": "first look"});
        let b = json!({"path": "/a.txt", "description": "second look"});
        let c = json!({"path": "/a.txt"});

        let ka = derive_key("read", &a, &exclude, None).unwrap();
        let kb = derive_key("read", &b, &exclude, None).unwrap();
        let kc = derive_key("read", &c, &exclude, None).unwrap();
        assert_eq!(ka, kb);
        assert_eq!(ka, kc);
    }

    #[test]
    fn test_different_inputs_differ() {
        let a = json!({"path": "/a.txt"});
        let b = json!({"path": "/b.txt"});

        assert_ne!(
            derive_key("read", &a, &[], None).unwrap(),
            derive_key("read", &b, &[], None).unwrap()
        );
    }

    #[test]
    fn test_tool_name_prefixes_key() {
        let input = json!({"path": "/a.txt"});
        let key = derive_key("read", &input, &[], None).unwrap();
        assert!(key.starts_with("read:"));
    }

    #[test]
    fn test_exclusion_is_top_level_only() {
        let exclude = vec!["path".to_string()];
        let a = json!({"path": "/a.txt", "nested": {"path": "/x"}});
        let b = json!({"path": "/b.txt", "nested": {"path": "/y"}});

        // Top-level "path" is dropped, nested one still distinguishes
        assert_ne!(
            derive_key("read", &a, &exclude, None).unwrap(),
            derive_key("read", &b, &exclude, None).unwrap()
        );
    }

    #[test]
    fn test_custom_key_fn_wins() {
        let key_fn: KeyFn = Arc::new(|tool, input| {
            format!("{}@{}", tool, input["path"].as_str().unwrap_or("?"))
        });
        let input = json!({"path": "/a.txt", "noise": 42});

        let key = derive_key("read", &input, &[], Some(&key_fn)).unwrap();
        assert_eq!(key, "read@/a.txt");
    }

    #[test]
    fn test_empty_custom_key_is_an_error() {
        let key_fn: KeyFn = Arc::new(|_, _| String::new());
        let err = derive_key("read", &json!({}), &[], Some(&key_fn)).unwrap_err();
        assert!(matches!(err, Error::KeyDerivation { .. }));
    }

    #[test]
    fn test_canonical_form_is_whitespace_free() {
        let input = json!({"b": [1, 2], "a": "x"});
        assert_eq!(canonical_form(&input, &[]), r#"{"a":"x","b":[1,2]}"#);
    }
}
