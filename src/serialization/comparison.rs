//! Comparing serialized DAGs while ignoring load-time fields.

use super::encoding::VAR;
use serde_json::Value;
use std::collections::BTreeSet;

/// Fields that change every time a definition is loaded
const VOLATILE_FIELDS: &[&str] = &["last_loaded", "fileloc"];

/// Copy of a serialized DAG with volatile fields removed
pub fn normalize_for_comparison(payload: &Value) -> Value {
    let mut normalized = payload.clone();
    if let Some(fields) = normalized.get_mut(VAR).and_then(Value::as_object_mut) {
        for field in VOLATILE_FIELDS {
            fields.remove(*field);
        }
    }
    normalized
}

/// JSON-pointer style path of the first place `left` and `right` differ
pub fn first_difference(left: &Value, right: &Value) -> Option<String> {
    diff_at(left, right, String::new())
}

fn diff_at(left: &Value, right: &Value, path: String) -> Option<String> {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let keys: BTreeSet<&String> = l.keys().chain(r.keys()).collect();
            keys.into_iter().find_map(|key| {
                let child = format!("{path}/{key}");
                match (l.get(key), r.get(key)) {
                    (Some(a), Some(b)) => diff_at(a, b, child),
                    _ => Some(child),
                }
            })
        }
        (Value::Array(l), Value::Array(r)) => {
            if l.len() != r.len() {
                return Some(rooted(path));
            }
            l.iter()
                .zip(r)
                .enumerate()
                .find_map(|(i, (a, b))| diff_at(a, b, format!("{path}/{i}")))
        }
        _ if left == right => None,
        _ => Some(rooted(path)),
    }
}

fn rooted(path: String) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path
    }
}
