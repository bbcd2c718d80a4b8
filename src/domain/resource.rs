//! Grafana resources
//!
//! A resource is the desired or live form of one Grafana object. The
//! `id`, `uid` and `version` keys inside a model are Grafana-assigned and
//! never persisted, diffed or sent back verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::state::ResourceMeta;

/// Model keys managed by Grafana itself
pub const IGNORED_MODEL_KEYS: [&str; 3] = ["id", "uid", "version"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Dashboard,
    Folder,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Dashboard => "dashboard",
            ResourceKind::Folder => "folder",
        }
    }

    /// Capitalized form for display
    pub fn title(&self) -> &'static str {
        match self {
            ResourceKind::Dashboard => "Dashboard",
            ResourceKind::Folder => "Folder",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Resource {
    Dashboard(DashboardResource),
    Folder(FolderResource),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardResource {
    pub grafana: String,
    pub uid: String,
    pub model: Map<String, Value>,
    /// Uid of the parent folder
    pub folder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderResource {
    pub grafana: String,
    pub uid: String,
    pub model: Map<String, Value>,
}

impl Resource {
    pub fn dashboard(
        grafana: &str,
        uid: &str,
        model: Map<String, Value>,
        folder: impl Into<String>,
    ) -> Self {
        Resource::Dashboard(DashboardResource {
            grafana: grafana.to_string(),
            uid: uid.to_string(),
            model: Self::model_strip(&model),
            folder: folder.into(),
        })
    }

    pub fn folder(grafana: &str, uid: &str, model: Map<String, Value>) -> Self {
        Resource::Folder(FolderResource {
            grafana: grafana.to_string(),
            uid: uid.to_string(),
            model: Self::model_strip(&model),
        })
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Dashboard(_) => ResourceKind::Dashboard,
            Resource::Folder(_) => ResourceKind::Folder,
        }
    }

    pub fn grafana(&self) -> &str {
        match self {
            Resource::Dashboard(r) => &r.grafana,
            Resource::Folder(r) => &r.grafana,
        }
    }

    pub fn uid(&self) -> &str {
        match self {
            Resource::Dashboard(r) => &r.uid,
            Resource::Folder(r) => &r.uid,
        }
    }

    pub fn model(&self) -> &Map<String, Value> {
        match self {
            Resource::Dashboard(r) => &r.model,
            Resource::Folder(r) => &r.model,
        }
    }

    /// Remove the Grafana-managed keys from a model
    pub fn model_strip(model: &Map<String, Value>) -> Map<String, Value> {
        let mut stripped = model.clone();
        for key in IGNORED_MODEL_KEYS {
            stripped.remove(key);
        }
        stripped
    }

    /// Serialized comparison form: the input to the differ
    pub fn serialized(&self) -> Value {
        let mut document = Map::new();
        document.insert(
            "kind".to_string(),
            Value::String(self.kind().as_str().to_string()),
        );
        document.insert(
            "grafana".to_string(),
            Value::String(self.grafana().to_string()),
        );
        document.insert("uid".to_string(), Value::String(self.uid().to_string()));
        document.insert(
            "model".to_string(),
            Value::Object(Self::model_strip(self.model())),
        );
        if let Resource::Dashboard(dashboard) = self {
            document.insert("folder".to_string(), Value::String(dashboard.folder.clone()));
        }
        Value::Object(document)
    }

    pub fn meta(&self) -> ResourceMeta {
        ResourceMeta {
            uid: self.uid().to_string(),
            grafana: self.grafana().to_string(),
            kind: self.kind(),
        }
    }
}

/// Derive the stable uid for a resource name
pub fn format_uid(name: &str) -> String {
    format!("gdbt_{:x}", md5::compute(name.as_bytes()))
}
