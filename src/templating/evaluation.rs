//! Dynamic evaluations and the evaluation lock
//!
//! An evaluation queries a live system to yield template variables. Its
//! identity hash covers the source provider, the kind and every query
//! parameter, so any edit to the evaluation invalidates cached results.
//!
//! The lock file caches results on disk per template group. It is
//! single-process by design; concurrent applies on the same group are
//! unsupported.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{GdbtError, ProviderError, Result};
use crate::infrastructure::ProviderRegistry;

/// Evaluation kinds understood by the stencil loader
pub const EVALUATION_KINDS: [&str; 1] = ["prometheus"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Evaluation {
    Prometheus(PrometheusEvaluation),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusEvaluation {
    /// Name of the evaluation provider to query
    pub source: String,
    pub metric: String,
    pub label: String,
}

impl Evaluation {
    /// Stable identity hash over source, kind and parameters
    pub fn hash(&self) -> String {
        let identity = match self {
            Evaluation::Prometheus(e) => {
                format!("{}|prometheus|{}|{}", e.source, e.metric, e.label)
            }
        };
        format!("{:x}", md5::compute(identity.as_bytes()))
    }

    /// Run the evaluation against its provider
    pub async fn evaluate(&self, registry: &ProviderRegistry) -> Result<Value> {
        match self {
            Evaluation::Prometheus(evaluation) => {
                let provider = crate::infrastructure::evaluation(registry, &evaluation.source)?;
                let series = provider.query(&evaluation.metric).await?;
                // $[*].metric.<label>
                let values: Vec<Value> = series
                    .iter()
                    .filter_map(|item| item.get("metric"))
                    .filter_map(|metric| metric.get(&evaluation.label))
                    .cloned()
                    .collect();
                Ok(Value::Array(values))
            }
        }
    }
}

/// On-disk cache of evaluation results for one template group
pub struct EvaluationLock {
    path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct LockEntry {
    data: Value,
    hash: String,
}

impl EvaluationLock {
    pub fn new(base: &Path, group: &str) -> Self {
        Self {
            path: base.join(format!("{}.lock", group)),
        }
    }

    /// Return the cached value only when the stored hash matches
    pub fn load(&self, name: &str, hash: &str) -> Option<Value> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let entries: BTreeMap<String, LockEntry> = match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "discarding unreadable lock file");
                return None;
            }
        };
        let entry = entries.get(name)?;
        if entry.hash != hash || is_falsy(&entry.data) {
            return None;
        }
        Some(entry.data.clone())
    }

    /// Rewrite the whole lock file; entries with falsy data are omitted
    pub fn dump(
        &self,
        evaluations: &BTreeMap<String, Value>,
        hashes: &BTreeMap<String, String>,
    ) -> Result<()> {
        let entries: BTreeMap<&String, LockEntry> = evaluations
            .iter()
            .filter(|(_, value)| !is_falsy(value))
            .filter_map(|(name, value)| {
                hashes.get(name).map(|hash| {
                    (
                        name,
                        LockEntry {
                            data: value.clone(),
                            hash: hash.clone(),
                        },
                    )
                })
            })
            .collect();
        if entries.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProviderError::from_io(&e, &parent.display().to_string()))?;
        }
        let content = serde_json::to_string_pretty(&entries)
            .map_err(|e| GdbtError::Data(e.to_string()))?;
        std::fs::write(&self.path, content)
            .map_err(|e| ProviderError::from_io(&e, &self.path.display().to_string()))?;
        Ok(())
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
