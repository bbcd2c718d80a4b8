//! Grafana provider and resource operations
//!
//! A thin typed client over the Grafana HTTP API plus the four resource
//! operations (create/get/update/delete) for dashboards and folders.
//!
//! Status mapping:
//! - 404 → `GrafanaResourceNotFound`
//! - 412 on folder create → already exists, not an error
//! - 429/500/503/504 → `GrafanaServerError`, retried with decorrelated
//!   exponential backoff (cumulative budget ~60 s)
//! - anything else → `GrafanaError`
//!
//! The `get` that confirms a just-created resource also retries 404, to
//! tolerate Grafana's eventual consistency after a write.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::domain::resource::{Resource, ResourceKind};
use crate::error::{GdbtError, ProviderError, Result};
use crate::infrastructure::ProviderRegistry;

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_MAX_SLEEP: Duration = Duration::from_secs(10);
const BACKOFF_BUDGET: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrafanaProvider {
    pub endpoint: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl GrafanaProvider {
    pub fn client(&self) -> Result<GrafanaClient> {
        GrafanaClient::new(self)
    }
}

/// Typed client over the Grafana HTTP API
pub struct GrafanaClient {
    http: reqwest::Client,
    base: url::Url,
}

#[derive(Debug, Deserialize)]
pub struct FolderPayload {
    pub id: i64,
    pub uid: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct DashboardPayload {
    pub dashboard: Value,
    pub meta: DashboardMeta,
}

#[derive(Debug, Deserialize)]
pub struct DashboardMeta {
    #[serde(rename = "folderId")]
    pub folder_id: i64,
}

impl GrafanaClient {
    fn new(provider: &GrafanaProvider) -> Result<Self> {
        let base = url::Url::parse(&provider.endpoint)
            .map_err(|e| ProviderError::Grafana(format!("{}: {}", provider.endpoint, e)))?;

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10));
        if let Some(token) = &provider.token {
            let mut headers = reqwest::header::HeaderMap::new();
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ProviderError::Grafana(e.to_string()))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }
        let http = builder
            .build()
            .map_err(|e| ProviderError::Grafana(e.to_string()))?;
        Ok(Self { http, base })
    }

    fn url(&self, path: &str) -> Result<url::Url> {
        self.base
            .join(path)
            .map_err(|e| ProviderError::Grafana(e.to_string()).into())
    }

    async fn check(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::status_error(status, context, &body).into())
    }

    fn status_error(status: StatusCode, context: &str, body: &str) -> ProviderError {
        match status {
            StatusCode::NOT_FOUND => ProviderError::GrafanaResourceNotFound(context.to_string()),
            StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => {
                ProviderError::GrafanaServer(format!("{}: status {}", context, status))
            }
            _ => ProviderError::Grafana(format!("{}: status {}: {}", context, status, body)),
        }
    }

    pub async fn get_folder(&self, uid: &str) -> Result<FolderPayload> {
        let url = self.url(&format!("api/folders/{}", uid))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Grafana(e.to_string()))?;
        let response = Self::check(response, uid).await?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::Grafana(e.to_string()).into())
    }

    pub async fn get_folder_by_id(&self, id: i64) -> Result<FolderPayload> {
        let url = self.url(&format!("api/folders/id/{}", id))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Grafana(e.to_string()))?;
        let response = Self::check(response, &format!("folder id {}", id)).await?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::Grafana(e.to_string()).into())
    }

    /// Create a folder; a 412 means it already exists and is not an error
    pub async fn create_folder(&self, uid: &str, title: &str) -> Result<()> {
        let url = self.url("api/folders")?;
        let response = self
            .http
            .post(url)
            .json(&json!({"uid": uid, "title": title}))
            .send()
            .await
            .map_err(|e| ProviderError::Grafana(e.to_string()))?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            debug!(uid, "folder already exists");
            return Ok(());
        }
        Self::check(response, uid).await?;
        Ok(())
    }

    pub async fn update_folder(&self, uid: &str, title: &str) -> Result<()> {
        let url = self.url(&format!("api/folders/{}", uid))?;
        let response = self
            .http
            .put(url)
            .json(&json!({"title": title, "overwrite": true}))
            .send()
            .await
            .map_err(|e| ProviderError::Grafana(e.to_string()))?;
        Self::check(response, uid).await?;
        Ok(())
    }

    /// Delete a folder; a 404 means it is already gone
    pub async fn delete_folder(&self, uid: &str) -> Result<()> {
        let url = self.url(&format!("api/folders/{}", uid))?;
        let response = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(|e| ProviderError::Grafana(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response, uid).await?;
        Ok(())
    }

    pub async fn get_dashboard(&self, uid: &str) -> Result<DashboardPayload> {
        let url = self.url(&format!("api/dashboards/uid/{}", uid))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Grafana(e.to_string()))?;
        let response = Self::check(response, uid).await?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::Grafana(e.to_string()).into())
    }

    /// Post a dashboard envelope (`{dashboard, folderId, overwrite}`)
    pub async fn post_dashboard(&self, envelope: &Value, context: &str) -> Result<()> {
        let url = self.url("api/dashboards/db")?;
        let response = self
            .http
            .post(url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| ProviderError::Grafana(e.to_string()))?;
        Self::check(response, context).await?;
        Ok(())
    }

    /// Delete a dashboard; a 404 means it is already gone
    pub async fn delete_dashboard(&self, uid: &str) -> Result<()> {
        let url = self.url(&format!("api/dashboards/uid/{}", uid))?;
        let response = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(|e| ProviderError::Grafana(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response, uid).await?;
        Ok(())
    }
}

/// Retry an operation on Grafana server errors, with decorrelated
/// exponential backoff bounded by a cumulative budget. When
/// `retry_not_found` is set, 404s are retried as well.
pub async fn with_retry<T, F, Fut>(retry_not_found: bool, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut elapsed = Duration::ZERO;
    let mut previous = BACKOFF_BASE;
    loop {
        match op().await {
            Err(GdbtError::Provider(ref e))
                if is_retryable(e, retry_not_found) && elapsed < BACKOFF_BUDGET =>
            {
                let sleep = decorrelated_sleep(previous);
                warn!(error = %e, delay_ms = sleep.as_millis() as u64, "retrying Grafana call");
                tokio::time::sleep(sleep).await;
                elapsed += sleep;
                previous = sleep;
            }
            other => return other,
        }
    }
}

fn is_retryable(error: &ProviderError, retry_not_found: bool) -> bool {
    match error {
        ProviderError::GrafanaServer(_) => true,
        ProviderError::GrafanaResourceNotFound(_) => retry_not_found,
        _ => false,
    }
}

fn decorrelated_sleep(previous: Duration) -> Duration {
    let upper = (previous * 3).clamp(BACKOFF_BASE, BACKOFF_MAX_SLEEP);
    rand::thread_rng().gen_range(BACKOFF_BASE..=upper)
}

/// Resource operations against Grafana, dispatched by kind
pub struct ResourceAdapter<'a> {
    registry: &'a ProviderRegistry,
}

impl<'a> ResourceAdapter<'a> {
    pub fn new(registry: &'a ProviderRegistry) -> Self {
        Self { registry }
    }

    fn client_for(&self, grafana: &str) -> Result<GrafanaClient> {
        crate::infrastructure::grafana(self.registry, grafana)?.client()
    }

    /// Fetch the live resource. A 404 surfaces immediately as
    /// `GrafanaResourceNotFound`; server errors are retried.
    pub async fn get(&self, kind: ResourceKind, grafana: &str, uid: &str) -> Result<Resource> {
        let client = self.client_for(grafana)?;
        with_retry(false, || self.fetch(&client, kind, grafana, uid)).await
    }

    /// Fetch a resource that was just written; 404s are retried too
    async fn get_created(&self, kind: ResourceKind, grafana: &str, uid: &str) -> Result<Resource> {
        let client = self.client_for(grafana)?;
        with_retry(true, || self.fetch(&client, kind, grafana, uid)).await
    }

    pub async fn exists(&self, kind: ResourceKind, grafana: &str, uid: &str) -> Result<bool> {
        match self.get(kind, grafana, uid).await {
            Ok(_) => Ok(true),
            Err(GdbtError::Provider(ProviderError::GrafanaResourceNotFound(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn fetch(
        &self,
        client: &GrafanaClient,
        kind: ResourceKind,
        grafana: &str,
        uid: &str,
    ) -> Result<Resource> {
        match kind {
            ResourceKind::Folder => {
                let payload = client.get_folder(uid).await?;
                let mut model = Map::new();
                model.insert("title".to_string(), Value::String(payload.title));
                Ok(Resource::folder(grafana, uid, model))
            }
            ResourceKind::Dashboard => {
                let payload = client.get_dashboard(uid).await?;
                let model = match payload.dashboard {
                    Value::Object(model) => model,
                    other => {
                        return Err(GdbtError::Data(format!(
                            "dashboard {} model is not an object: {}",
                            uid, other
                        )))
                    }
                };
                let folder = client.get_folder_by_id(payload.meta.folder_id).await?.uid;
                Ok(Resource::dashboard(grafana, uid, model, folder))
            }
        }
    }

    /// Create the resource and return its live form
    pub async fn create(&self, resource: &Resource) -> Result<Resource> {
        let client = self.client_for(resource.grafana())?;
        match resource {
            Resource::Folder(folder) => {
                let title = folder_title(&folder.model, &folder.uid)?;
                with_retry(false, || client.create_folder(&folder.uid, title)).await?;
            }
            Resource::Dashboard(dashboard) => {
                let folder_id =
                    with_retry(false, || client.get_folder(&dashboard.folder)).await?.id;
                let mut model = Resource::model_strip(&dashboard.model);
                model.insert("id".to_string(), Value::Null);
                model.insert("uid".to_string(), Value::String(dashboard.uid.clone()));
                model.insert("version".to_string(), json!(1));
                let envelope = json!({
                    "dashboard": Value::Object(model),
                    "folderId": folder_id,
                    "overwrite": true,
                });
                with_retry(false, || client.post_dashboard(&envelope, &dashboard.uid)).await?;
            }
        }
        self.get_created(resource.kind(), resource.grafana(), resource.uid())
            .await
    }

    /// Overwrite the live resource with a new model
    pub async fn update(&self, current: &Resource, model: &Map<String, Value>) -> Result<()> {
        let client = self.client_for(current.grafana())?;
        match current {
            Resource::Folder(folder) => {
                let title = folder_title(model, &folder.uid)?;
                with_retry(false, || client.update_folder(&folder.uid, title)).await
            }
            Resource::Dashboard(dashboard) => {
                let live = with_retry(false, || client.get_dashboard(&dashboard.uid)).await?;
                let version = live
                    .dashboard
                    .get("version")
                    .and_then(Value::as_i64)
                    .map(|v| v + 1)
                    .unwrap_or(1);
                let id = live.dashboard.get("id").cloned().unwrap_or(Value::Null);
                let folder_id =
                    with_retry(false, || client.get_folder(&dashboard.folder)).await?.id;

                let mut model = Resource::model_strip(model);
                model.insert("id".to_string(), id);
                model.insert("uid".to_string(), Value::String(dashboard.uid.clone()));
                model.insert("version".to_string(), json!(version));
                let envelope = json!({
                    "dashboard": Value::Object(model),
                    "folderId": folder_id,
                    "overwrite": true,
                });
                with_retry(false, || client.post_dashboard(&envelope, &dashboard.uid)).await
            }
        }
    }

    /// Delete by kind and uid; already-gone resources are a success
    pub async fn delete(&self, kind: ResourceKind, grafana: &str, uid: &str) -> Result<()> {
        let client = self.client_for(grafana)?;
        match kind {
            ResourceKind::Folder => with_retry(false, || client.delete_folder(uid)).await,
            ResourceKind::Dashboard => with_retry(false, || client.delete_dashboard(uid)).await,
        }
    }
}

fn folder_title<'m>(model: &'m Map<String, Value>, uid: &str) -> Result<&'m str> {
    model
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| GdbtError::Data(format!("Folder model missing 'title' key: {}", uid)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::Provider;

    fn registry(endpoint: &str) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.insert(
            "gr".to_string(),
            Provider::Grafana(GrafanaProvider {
                endpoint: endpoint.to_string(),
                token: None,
            }),
        );
        registry
    }

    #[tokio::test]
    async fn test_get_folder_maps_404() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/folders/gdbt_missing")
            .with_status(404)
            .create_async()
            .await;

        let registry = registry(&server.url());
        let adapter = ResourceAdapter::new(&registry);
        let err = adapter
            .get(ResourceKind::Folder, "gr", "gdbt_missing")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ERR_GRAFANA_RESOURCE_NOT_FOUND");

        // exists() folds the 404 into a boolean
        assert!(!adapter
            .exists(ResourceKind::Folder, "gr", "gdbt_missing")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_get_dashboard_resolves_parent_folder() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/dashboards/uid/gdbt_dash")
            .with_status(200)
            .with_body(
                r#"{"dashboard": {"uid": "gdbt_dash", "title": "Web", "id": 7, "version": 3},
                    "meta": {"folderId": 12}}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/folders/id/12")
            .with_status(200)
            .with_body(r#"{"id": 12, "uid": "gdbt_folder", "title": "Main"}"#)
            .create_async()
            .await;

        let registry = registry(&server.url());
        let adapter = ResourceAdapter::new(&registry);
        let resource = adapter
            .get(ResourceKind::Dashboard, "gr", "gdbt_dash")
            .await
            .unwrap();

        match &resource {
            Resource::Dashboard(dashboard) => {
                assert_eq!(dashboard.folder, "gdbt_folder");
                // Grafana-managed keys never survive a fetch
                let serialized = resource.serialized();
                let model = serialized.get("model").unwrap();
                assert!(model.get("id").is_none());
                assert!(model.get("version").is_none());
                assert_eq!(model.get("title").unwrap(), "Web");
            }
            other => panic!("unexpected resource: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_tolerates_404() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/api/dashboards/uid/gdbt_gone")
            .with_status(404)
            .create_async()
            .await;

        let registry = registry(&server.url());
        let adapter = ResourceAdapter::new(&registry);
        adapter
            .delete(ResourceKind::Dashboard, "gr", "gdbt_gone")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_folder_412_is_already_exists() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/folders")
            .with_status(412)
            .create_async()
            .await;
        server
            .mock("GET", "/api/folders/gdbt_f")
            .with_status(200)
            .with_body(r#"{"id": 3, "uid": "gdbt_f", "title": "Main"}"#)
            .create_async()
            .await;

        let registry = registry(&server.url());
        let adapter = ResourceAdapter::new(&registry);
        let mut model = Map::new();
        model.insert("title".to_string(), Value::String("Main".to_string()));
        let created = adapter
            .create(&Resource::folder("gr", "gdbt_f", model))
            .await
            .unwrap();
        assert_eq!(created.uid(), "gdbt_f");
    }
}
