//! Structural differ
//!
//! A pure deep comparison of two serialized resources. Mappings are
//! compared key by key; lists are compared as multisets (order-insensitive,
//! repetition reported), which fits Grafana panel arrays. Every event is
//! normalized to a dotted path and one of added / removed / changed (type
//! changes fold into changed).

use std::collections::BTreeMap;

use serde_json::Value;

/// One per-field outcome at a dotted path
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    Added { value: Value },
    Removed { value: Value },
    Changed { old: Value, new: Value },
}

/// Deep diff of two serialized documents, keyed by dotted path
pub fn diff_documents(current: &Value, desired: &Value) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();
    walk("", current, desired, &mut changes);
    changes
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

fn walk(path: &str, current: &Value, desired: &Value, changes: &mut BTreeMap<String, FieldChange>) {
    match (current, desired) {
        (Value::Object(current_map), Value::Object(desired_map)) => {
            for (key, current_value) in current_map {
                match desired_map.get(key) {
                    Some(desired_value) => {
                        walk(&join(path, key), current_value, desired_value, changes)
                    }
                    None => {
                        changes.insert(
                            join(path, key),
                            FieldChange::Removed {
                                value: current_value.clone(),
                            },
                        );
                    }
                }
            }
            for (key, desired_value) in desired_map {
                if !current_map.contains_key(key) {
                    changes.insert(
                        join(path, key),
                        FieldChange::Added {
                            value: desired_value.clone(),
                        },
                    );
                }
            }
        }
        (Value::Array(current_items), Value::Array(desired_items)) => {
            diff_multiset(path, current_items, desired_items, changes);
        }
        (current_value, desired_value) => {
            if current_value != desired_value {
                changes.insert(
                    path.to_string(),
                    FieldChange::Changed {
                        old: current_value.clone(),
                        new: desired_value.clone(),
                    },
                );
            }
        }
    }
}

/// Order-insensitive list comparison. Each element on one side consumes an
/// equal element on the other; the surplus is reported at its own index, so
/// repetition differences show up too.
fn diff_multiset(
    path: &str,
    current_items: &[Value],
    desired_items: &[Value],
    changes: &mut BTreeMap<String, FieldChange>,
) {
    let mut desired_budget: Vec<(&Value, usize)> = Vec::new();
    for item in desired_items {
        match desired_budget.iter().position(|(value, _)| *value == item) {
            Some(slot) => desired_budget[slot].1 += 1,
            None => desired_budget.push((item, 1)),
        }
    }

    let mut current_budget: Vec<(&Value, usize)> = Vec::new();
    for (index, item) in current_items.iter().enumerate() {
        let slot = desired_budget
            .iter()
            .position(|(value, count)| *value == item && *count > 0);
        match slot {
            Some(slot) => {
                desired_budget[slot].1 -= 1;
                match current_budget.iter().position(|(value, _)| *value == item) {
                    Some(matched) => current_budget[matched].1 += 1,
                    None => current_budget.push((item, 1)),
                }
            }
            None => {
                changes.insert(
                    join(path, &index.to_string()),
                    FieldChange::Removed {
                        value: item.clone(),
                    },
                );
            }
        }
    }

    for (index, item) in desired_items.iter().enumerate() {
        let consumed = current_budget
            .iter()
            .position(|(value, count)| *value == item && *count > 0);
        match consumed {
            Some(slot) => current_budget[slot].1 -= 1,
            None => {
                let key = join(path, &index.to_string());
                // An element removed and added at the same index is one change
                match changes.remove(&key) {
                    Some(FieldChange::Removed { value: old }) => {
                        changes.insert(
                            key,
                            FieldChange::Changed {
                                old,
                                new: item.clone(),
                            },
                        );
                    }
                    _ => {
                        changes.insert(
                            key,
                            FieldChange::Added {
                                value: item.clone(),
                            },
                        );
                    }
                }
            }
        }
    }
}
