//! Template resolver
//!
//! Expands every stencil into concrete resources: resolves evaluations
//! through the lock file, resolves lookups, expands the loop, renders the
//! model and derives stable uids.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::domain::resource::{format_uid, Resource};
use crate::error::{GdbtError, Result};
use crate::infrastructure::ProviderRegistry;
use crate::templating::evaluation::EvaluationLock;
use crate::templating::{path, renderer, Stencil};

/// Desired resources per state group
pub type ResourceGroups = BTreeMap<String, BTreeMap<String, Resource>>;

pub struct TemplateResolver<'a> {
    registry: &'a ProviderRegistry,
    base: PathBuf,
    update: bool,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(registry: &'a ProviderRegistry, base: impl Into<PathBuf>, update: bool) -> Self {
        Self {
            registry,
            base: base.into(),
            update,
        }
    }

    /// Resolve every stencil into its group of resources
    pub async fn resolve_all(
        &self,
        stencils: &BTreeMap<String, Stencil>,
    ) -> Result<ResourceGroups> {
        let mut groups = ResourceGroups::new();
        for (name, stencil) in stencils {
            let resources = self.resolve(name, stencil).await?;
            groups.insert(name.clone(), resources);
        }
        Ok(groups)
    }

    /// Resolve one stencil into `{resource_name → Resource}`
    pub async fn resolve(
        &self,
        name: &str,
        stencil: &Stencil,
    ) -> Result<BTreeMap<String, Resource>> {
        // Make sure the target Grafana provider exists before doing any work
        crate::infrastructure::grafana(self.registry, stencil.provider())?;

        let evaluations = self.resolve_evaluations(name, stencil).await?;
        let lookups = stencil.lookups().clone();

        let mut resources = BTreeMap::new();
        for item in self.loop_items(stencil, &evaluations, &lookups)? {
            let resource_name = match &item {
                Some(item) => format!("{}:{}", name, item_suffix(item)),
                None => name.to_string(),
            };
            let uid = format_uid(&resource_name);
            let rendered = renderer::render(
                stencil.model(),
                self.registry,
                &evaluations,
                &lookups,
                item.as_ref(),
            )?;
            let resource = make_resource(stencil, &uid, &rendered)?;
            resources.insert(resource_name, resource);
        }
        Ok(resources)
    }

    /// Resolve evaluations, serving from the lock when hashes match and
    /// `update` was not requested. The lock is rewritten whole whenever any
    /// evaluation actually ran.
    async fn resolve_evaluations(
        &self,
        name: &str,
        stencil: &Stencil,
    ) -> Result<BTreeMap<String, Value>> {
        let lock = EvaluationLock::new(&self.base, name);
        let mut resolved = BTreeMap::new();
        let mut hashes = BTreeMap::new();
        let mut dirty = false;

        for (evaluation_name, evaluation) in stencil.evaluations() {
            let hash = evaluation.hash();
            let cached = if self.update {
                None
            } else {
                lock.load(evaluation_name, &hash)
            };
            let value = match cached {
                Some(value) => {
                    debug!(group = name, evaluation = %evaluation_name, "served from lock");
                    value
                }
                None => {
                    debug!(group = name, evaluation = %evaluation_name, "evaluating");
                    dirty = true;
                    evaluation.evaluate(self.registry).await?
                }
            };
            resolved.insert(evaluation_name.clone(), value);
            hashes.insert(evaluation_name.clone(), hash);
        }

        if dirty {
            lock.dump(&resolved, &hashes)?;
        }
        Ok(resolved)
    }

    /// Loop items for the stencil; a single `None` when there is no loop
    fn loop_items(
        &self,
        stencil: &Stencil,
        evaluations: &BTreeMap<String, Value>,
        lookups: &BTreeMap<String, Value>,
    ) -> Result<Vec<Option<Value>>> {
        let Some(loop_path) = stencil.loop_path() else {
            return Ok(vec![None]);
        };
        let namespace = json!({
            "evaluations": evaluations,
            "lookups": lookups,
        });
        let items = path::iterable(&namespace, loop_path)?;
        Ok(items.into_iter().map(Some).collect())
    }
}

fn make_resource(stencil: &Stencil, uid: &str, rendered: &str) -> Result<Resource> {
    let model = parse_model(rendered)?;
    match stencil {
        Stencil::Dashboard(dashboard) => {
            let folder_uid = format_uid(&dashboard.folder);
            Ok(Resource::dashboard(
                &dashboard.provider,
                uid,
                model,
                folder_uid,
            ))
        }
        Stencil::Folder(folder) => Ok(Resource::folder(&folder.provider, uid, model)),
    }
}

fn parse_model(rendered: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(rendered).map_err(|e| {
        GdbtError::Data(format!(
            "Invalid JSON in rendered model: {}. Offending text:\n{}",
            e, rendered
        ))
    })?;
    match value {
        Value::Object(model) => Ok(model),
        other => Err(GdbtError::Data(format!(
            "Rendered model is not a JSON object: {}",
            other
        ))),
    }
}

fn item_suffix(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{FileProvider, GrafanaProvider, Provider};
    use crate::templating;

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.insert(
            "grafana-main".to_string(),
            Provider::Grafana(GrafanaProvider {
                endpoint: "http://grafana:3000".to_string(),
                token: None,
            }),
        );
        registry.insert(
            "statefile".to_string(),
            Provider::File(FileProvider {
                path: "/tmp/state".into(),
            }),
        );
        registry
    }

    fn stencil(yaml: &str) -> Stencil {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_loop_expansion_produces_distinct_resources() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let resolver = TemplateResolver::new(&registry, dir.path(), false);

        let stencil = stencil(
            r#"
kind: dashboard
provider: grafana-main
folder: folders/main
loop: lookups.envs
model: |
  {"title": "Web ({$ loop.item $})"}
lookups:
  envs: ["stg", "prd"]
"#,
        );

        let resources = resolver.resolve("dashboards/web", &stencil).await.unwrap();
        assert_eq!(resources.len(), 2);
        let stg = &resources["dashboards/web:stg"];
        let prd = &resources["dashboards/web:prd"];
        assert_ne!(stg.uid(), prd.uid());
        assert_eq!(stg.uid(), format_uid("dashboards/web:stg"));
        assert_eq!(stg.model()["title"], serde_json::json!("Web (stg)"));
    }

    #[tokio::test]
    async fn test_no_loop_resolves_once() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let resolver = TemplateResolver::new(&registry, dir.path(), false);

        let stencil = stencil(
            r#"
kind: folder
provider: grafana-main
model: |
  {"title": "Main"}
"#,
        );

        let resources = resolver.resolve("folders/main", &stencil).await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(
            resources["folders/main"].uid(),
            format_uid("folders/main")
        );
    }

    #[tokio::test]
    async fn test_dashboard_folder_uid_derived_from_reference() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let resolver = TemplateResolver::new(&registry, dir.path(), false);

        let stencil = stencil(
            r#"
kind: dashboard
provider: grafana-main
folder: folders/main
model: |
  {"title": "Web"}
"#,
        );

        let resources = resolver.resolve("dashboards/web", &stencil).await.unwrap();
        match &resources["dashboards/web"] {
            Resource::Dashboard(dashboard) => {
                assert_eq!(dashboard.folder, format_uid("folders/main"));
            }
            other => panic!("unexpected resource: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_loop_variable() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let resolver = TemplateResolver::new(&registry, dir.path(), false);

        let stencil = stencil(
            r#"
kind: folder
provider: grafana-main
loop: lookups.missing
model: "{}"
"#,
        );

        let err = resolver.resolve("folders/main", &stencil).await.unwrap_err();
        assert_eq!(err.code(), "ERR_VARIABLE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_non_iterable_loop_variable() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let resolver = TemplateResolver::new(&registry, dir.path(), false);

        let stencil = stencil(
            r#"
kind: folder
provider: grafana-main
loop: lookups.team
model: "{}"
lookups:
  team: sre
"#,
        );

        let err = resolver.resolve("folders/main", &stencil).await.unwrap_err();
        assert_eq!(err.code(), "ERR_VARIABLE_NOT_ITERABLE");
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProviderRegistry::new();
        let resolver = TemplateResolver::new(&registry, dir.path(), false);

        let stencil = stencil(
            r#"
kind: folder
provider: grafana-main
model: "{}"
"#,
        );

        let err = resolver.resolve("folders/main", &stencil).await.unwrap_err();
        assert_eq!(err.code(), "ERR_PROVIDER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalid_rendered_json_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let resolver = TemplateResolver::new(&registry, dir.path(), false);

        let stencil = stencil(
            r#"
kind: folder
provider: grafana-main
model: |
  {"title": "Main"
"#,
        );

        let err = resolver.resolve("folders/main", &stencil).await.unwrap_err();
        assert_eq!(err.code(), "ERR_DATA");
        // The offending text is part of the diagnostics
        assert!(err.to_string().contains(r#"{"title": "Main""#));
    }

    #[tokio::test]
    async fn test_model_strip_on_construction() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let resolver = TemplateResolver::new(&registry, dir.path(), false);

        let stencil = stencil(
            r#"
kind: folder
provider: grafana-main
model: |
  {"title": "Main", "id": 7, "uid": "user-pinned", "version": 2}
"#,
        );

        let resources = resolver.resolve("folders/main", &stencil).await.unwrap();
        let model = resources["folders/main"].model();
        assert!(model.get("id").is_none());
        assert!(model.get("uid").is_none());
        assert!(model.get("version").is_none());
    }

    // Lock behavior is covered in templating::evaluation; this exercises the
    // dirty-group rewrite path end to end with a static stencil
    #[tokio::test]
    async fn test_resolve_without_evaluations_writes_no_lock() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let resolver = TemplateResolver::new(&registry, dir.path(), false);

        let stencil = templating::stencil::load(dir.path()).unwrap();
        assert!(stencil.is_empty());

        let folder = self::stencil(
            r#"
kind: folder
provider: grafana-main
model: "{\"title\": \"Main\"}"
"#,
        );
        resolver.resolve("folders/main", &folder).await.unwrap();
        assert!(!dir.path().join("folders/main.lock").exists());
    }
}
