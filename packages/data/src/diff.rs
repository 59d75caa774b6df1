//! Sparse structural diff between two JSON values.
//!
//! A changed leaf is `{"from": a, "to": b}`; a side that is absent is left
//! out. Objects recurse over the union of their keys and only changed keys
//! appear. Arrays and mismatched kinds are compared as leaves.

use serde_json::{Map, Value};

/// Patch from `from` to `to`. Equal inputs give an empty object.
pub fn diff(from: &Value, to: &Value) -> Value {
    Value::Object(diff_values(Some(from), Some(to)).unwrap_or_default())
}

/// Whether a patch produced by [`diff`] records no change
pub fn is_empty(patch: &Value) -> bool {
    patch.as_object().is_some_and(Map::is_empty)
}

fn diff_values(from: Option<&Value>, to: Option<&Value>) -> Option<Map<String, Value>> {
    match (from, to) {
        (Some(a), Some(b)) if a == b => None,
        (Some(Value::Object(a)), Some(Value::Object(b))) => {
            let mut patch = Map::new();
            for key in a.keys().chain(b.keys().filter(|k| !a.contains_key(*k))) {
                if let Some(change) = diff_values(a.get(key), b.get(key)) {
                    patch.insert(key.clone(), Value::Object(change));
                }
            }
            (!patch.is_empty()).then_some(patch)
        }
        (None, None) => None,
        (a, b) => {
            let mut leaf = Map::new();
            if let Some(a) = a {
                leaf.insert("from".to_string(), a.clone());
            }
            if let Some(b) = b {
                leaf.insert("to".to_string(), b.clone());
            }
            Some(leaf)
        }
    }
}
