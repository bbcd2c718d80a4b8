//! Persisted state
//!
//! The state store keeps only resource meta (`{uid, grafana, kind}`) per
//! group, never the full model. The live model is refetched from Grafana
//! at plan time. Incompatible `state_version` values are refused outright;
//! there is no upgrade path from v1.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::resource::{Resource, ResourceKind};
use crate::error::{Result, StateError};

pub const STATE_VERSION: i64 = 2;

/// Minimal pointer into live Grafana
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub uid: String,
    pub grafana: String,
    pub kind: ResourceKind,
}

/// Resource name → meta, for one state group
pub type ResourceGroupMeta = BTreeMap<String, ResourceMeta>;

/// One persisted state group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub grafana: String,
    pub kind: ResourceKind,
    pub resource_meta: ResourceGroupMeta,
    pub state_version: i64,
}

impl State {
    pub fn new(grafana: &str, kind: ResourceKind, resource_meta: ResourceGroupMeta) -> Self {
        Self {
            grafana: grafana.to_string(),
            kind,
            resource_meta,
            state_version: STATE_VERSION,
        }
    }

    /// Build the group state from its resources; `None` when the group is empty
    pub fn from_resources(resources: &BTreeMap<String, Resource>) -> Option<Self> {
        let first = resources.values().next()?;
        let grafana = first.grafana().to_string();
        let kind = first.kind();
        let resource_meta = resources
            .iter()
            .map(|(name, resource)| (name.clone(), resource.meta()))
            .collect();
        Some(Self {
            grafana,
            kind,
            resource_meta,
            state_version: STATE_VERSION,
        })
    }

    /// Parse a state document read from the store
    pub fn from_document(name: &str, document: Value) -> Result<Self> {
        let found = document
            .get("state_version")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if found != STATE_VERSION {
            return Err(StateError::VersionIncompatible {
                found,
                expected: STATE_VERSION,
            }
            .into());
        }
        let state: State = serde_json::from_value(document)
            .map_err(|e| StateError::Corrupted(format!("{}: {}", name, e)))?;
        Ok(state)
    }

    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).expect("state serialization is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> State {
        let mut meta = ResourceGroupMeta::new();
        meta.insert(
            "folders/main".to_string(),
            ResourceMeta {
                uid: "gdbt_abc".to_string(),
                grafana: "gr".to_string(),
                kind: ResourceKind::Folder,
            },
        );
        State::new("gr", ResourceKind::Folder, meta)
    }

    #[test]
    fn test_serialized_payload_format() {
        let serialized = serde_json::to_string_pretty(&sample().to_document()).unwrap();
        let expected = r#"{
  "grafana": "gr",
  "kind": "folder",
  "resource_meta": {
    "folders/main": {
      "grafana": "gr",
      "kind": "folder",
      "uid": "gdbt_abc"
    }
  },
  "state_version": 2
}"#;
        assert_eq!(serialized, expected);
    }

    #[test]
    fn test_version_mismatch_is_refused() {
        let document = json!({
            "grafana": "gr",
            "kind": "folder",
            "resource_meta": {},
            "state_version": 1
        });
        let err = State::from_document("group", document).unwrap_err();
        assert_eq!(err.code(), "ERR_STATE_VERSION_INCOMPATIBLE");
    }

    #[test]
    fn test_document_round_trip() {
        let state = sample();
        let loaded = State::from_document("group", state.to_document()).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_from_resources_empty_group() {
        assert!(State::from_resources(&BTreeMap::new()).is_none());
    }
}
