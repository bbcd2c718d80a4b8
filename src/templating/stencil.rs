//! Stencil definitions and loading
//!
//! Every `**/*.yaml` under the scope is one stencil; the file's path
//! relative to the scope (extension stripped) becomes the stencil tag,
//! which is also the state-group name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use walkdir::WalkDir;

use crate::error::{ConfigError, GdbtError, Result};
use crate::templating::evaluation::{Evaluation, EVALUATION_KINDS};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Stencil {
    Dashboard(DashboardStencil),
    Folder(FolderStencil),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardStencil {
    /// Grafana provider name
    pub provider: String,
    /// Folder reference (a folder stencil tag)
    pub folder: String,
    #[serde(rename = "loop", default)]
    pub loop_path: Option<String>,
    pub model: String,
    #[serde(default)]
    pub evaluations: BTreeMap<String, Evaluation>,
    #[serde(default)]
    pub lookups: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolderStencil {
    pub provider: String,
    #[serde(rename = "loop", default)]
    pub loop_path: Option<String>,
    pub model: String,
    #[serde(default)]
    pub evaluations: BTreeMap<String, Evaluation>,
    #[serde(default)]
    pub lookups: BTreeMap<String, Value>,
}

impl Stencil {
    pub fn provider(&self) -> &str {
        match self {
            Stencil::Dashboard(s) => &s.provider,
            Stencil::Folder(s) => &s.provider,
        }
    }

    pub fn loop_path(&self) -> Option<&str> {
        match self {
            Stencil::Dashboard(s) => s.loop_path.as_deref(),
            Stencil::Folder(s) => s.loop_path.as_deref(),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Stencil::Dashboard(s) => &s.model,
            Stencil::Folder(s) => &s.model,
        }
    }

    pub fn evaluations(&self) -> &BTreeMap<String, Evaluation> {
        match self {
            Stencil::Dashboard(s) => &s.evaluations,
            Stencil::Folder(s) => &s.evaluations,
        }
    }

    pub fn lookups(&self) -> &BTreeMap<String, Value> {
        match self {
            Stencil::Dashboard(s) => &s.lookups,
            Stencil::Folder(s) => &s.lookups,
        }
    }
}

/// Loads every stencil under a scope directory
pub struct StencilLoader {
    path: PathBuf,
}

impl StencilLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn list_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some("yaml"))
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }

    fn tag(&self, file: &Path) -> String {
        let relative = file.strip_prefix(&self.path).unwrap_or(file);
        relative
            .with_extension("")
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn load(&self) -> Result<BTreeMap<String, Stencil>> {
        let mut stencils = BTreeMap::new();
        for file in self.list_files() {
            let raw = std::fs::read_to_string(&file).map_err(|e| {
                GdbtError::Config(ConfigError::FormatInvalid(format!(
                    "{}: {}",
                    file.display(),
                    e
                )))
            })?;
            let document: serde_yaml::Value = serde_yaml::from_str(&raw).map_err(|e| {
                GdbtError::Config(ConfigError::FormatInvalid(format!(
                    "{}: {}",
                    file.display(),
                    e
                )))
            })?;
            check_evaluation_kinds(&document)?;
            let stencil: Stencil = serde_yaml::from_value(document).map_err(|e| {
                GdbtError::Config(ConfigError::FormatInvalid(format!(
                    "{}: {}",
                    file.display(),
                    e
                )))
            })?;
            stencils.insert(self.tag(&file), stencil);
        }
        Ok(stencils)
    }
}

/// Reject unknown evaluation kinds with a dedicated error before the typed
/// parse turns them into a generic deserialization failure.
fn check_evaluation_kinds(document: &serde_yaml::Value) -> Result<()> {
    let Some(evaluations) = document.get("evaluations").and_then(|e| e.as_mapping()) else {
        return Ok(());
    };
    for (_, evaluation) in evaluations {
        let kind = evaluation
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or_default();
        if !EVALUATION_KINDS.contains(&kind) {
            return Err(ConfigError::EvaluationKindNotFound(kind.to_string()).into());
        }
    }
    Ok(())
}

/// Load all stencils under a scope
pub fn load(scope: impl Into<PathBuf>) -> Result<BTreeMap<String, Stencil>> {
    StencilLoader::new(scope).load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    const FOLDER_STENCIL: &str = r#"
kind: folder
provider: grafana-main
model: |
  {"title": "Main"}
"#;

    const DASHBOARD_STENCIL: &str = r#"
kind: dashboard
provider: grafana-main
folder: folders/main
loop: evaluations.envs
model: |
  {"title": "Web ({$ loop.item $})"}
evaluations:
  envs:
    kind: prometheus
    source: prom
    metric: up
    label: env
"#;

    #[test]
    fn test_load_tags_files_relative_to_scope() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "folders/main.yaml", FOLDER_STENCIL);
        write_file(dir.path(), "dashboards/web.yaml", DASHBOARD_STENCIL);

        let stencils = load(dir.path()).unwrap();
        assert_eq!(stencils.len(), 2);
        assert!(matches!(
            stencils.get("folders/main"),
            Some(Stencil::Folder(_))
        ));
        match stencils.get("dashboards/web") {
            Some(Stencil::Dashboard(dashboard)) => {
                assert_eq!(dashboard.folder, "folders/main");
                assert_eq!(dashboard.loop_path.as_deref(), Some("evaluations.envs"));
                assert!(dashboard.evaluations.contains_key("envs"));
            }
            other => panic!("unexpected stencil: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "bad.yaml", "kind: folder\n  broken: [");
        let err = load(dir.path()).unwrap_err();
        assert_eq!(err.code(), "ERR_CONFIG_FORMAT_INVALID");
    }

    #[test]
    fn test_unknown_evaluation_kind() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "bad.yaml",
            r#"
kind: folder
provider: grafana-main
model: "{}"
evaluations:
  envs:
    kind: graphite
    source: g
"#,
        );
        let err = load(dir.path()).unwrap_err();
        assert_eq!(err.code(), "ERR_CONFIG_EVALUATION_KIND_INVALID");
    }

    #[test]
    fn test_unknown_stencil_kind_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "bad.yaml", "kind: alert\nprovider: g\nmodel: '{}'");
        let err = load(dir.path()).unwrap_err();
        assert_eq!(err.code(), "ERR_CONFIG_FORMAT_INVALID");
    }
}
