//! Dotted-path access into nested values
//!
//! Used for `loop` resolution inside the `{evaluations, lookups}`
//! namespace. Both failure modes are explicit: a missing path and a path
//! that resolves to something that cannot be iterated.

use serde_json::Value;

use crate::error::{Result, VariableError};

/// Resolve a dotted path (`evaluations.envs`, `lookups.teams.0`)
pub fn lookup<'a>(namespace: &'a Value, path: &str) -> Result<&'a Value> {
    let mut cursor = namespace;
    for segment in path.split('.') {
        cursor = match cursor {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        }
        .ok_or_else(|| VariableError::NotFound(path.to_string()))?;
    }
    Ok(cursor)
}

/// Resolve a dotted path to an iterable and return its items
pub fn iterable(namespace: &Value, path: &str) -> Result<Vec<Value>> {
    match lookup(namespace, path)? {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(VariableError::NotIterable(path.to_string()).into()),
    }
}
