//! State store facade
//!
//! One entry point over the state-capable provider kinds. Documents are
//! JSON objects; a missing object reads back as `None`, malformed JSON
//! surfaces as `StateCorrupted`. `lock`/`unlock` are kept as seams: no
//! backend implements a real lease yet.

use serde_json::Value;
use tracing::debug;

use crate::error::{GdbtError, ProviderError, Result, StateError};
use crate::infrastructure::{ConsulProvider, FileProvider, HttpProvider, Provider, S3Provider};

enum Backend<'a> {
    File(&'a FileProvider),
    S3(&'a S3Provider),
    Consul(&'a ConsulProvider),
    Http(&'a HttpProvider),
}

pub struct StateStore<'a> {
    backend: Backend<'a>,
}

impl<'a> StateStore<'a> {
    /// Open a store over a provider; `None` if the provider has no state capability
    pub fn open(provider: &'a Provider) -> Option<Self> {
        let backend = match provider {
            Provider::File(p) => Backend::File(p),
            Provider::S3(p) => Backend::S3(p),
            Provider::Consul(p) => Backend::Consul(p),
            Provider::Http(p) => Backend::Http(p),
            Provider::Grafana(_) | Provider::Prometheus(_) => return None,
        };
        Some(Self { backend })
    }

    /// Enumerate persisted state-group names under `subdir`
    pub async fn list(&self, subdir: &str) -> Result<Vec<String>> {
        match &self.backend {
            Backend::File(p) => p.list(subdir).await,
            Backend::S3(p) => p.list(subdir).await,
            Backend::Consul(p) => p.list(subdir).await,
            Backend::Http(p) => p.list(subdir).await,
        }
    }

    /// Read a state group; absent objects read back as `None`
    pub async fn get(&self, name: &str) -> Result<Option<Value>> {
        let content = match self.read(name).await {
            Ok(content) => content,
            Err(GdbtError::Provider(
                ProviderError::FileNotFound(_)
                | ProviderError::S3ObjectNotFound(_)
                | ProviderError::ConsulKeyNotFound(_),
            )) => None,
            Err(e) => return Err(e),
        };
        let Some(content) = content else {
            return Ok(None);
        };
        let document: Value = serde_json::from_str(&content)
            .map_err(|e| GdbtError::State(StateError::Corrupted(format!("{}: {}", name, e))))?;
        Ok(Some(document))
    }

    /// Atomically write or replace a state group
    pub async fn put(&self, name: &str, document: &Value) -> Result<()> {
        // Object keys are BTreeMap-backed, so pretty output is sorted and
        // 2-space indented
        let content = serde_json::to_string_pretty(document)
            .map_err(|e| GdbtError::State(StateError::Corrupted(e.to_string())))?;
        match &self.backend {
            Backend::File(p) => p.write(name, &content).await,
            Backend::S3(p) => p.write(name, &content).await,
            Backend::Consul(p) => p.write(name, &content).await,
            Backend::Http(p) => p.write(name, &content).await,
        }
    }

    /// Idempotent delete of a state group
    pub async fn remove(&self, name: &str) -> Result<()> {
        match &self.backend {
            Backend::File(p) => p.remove(name).await,
            Backend::S3(p) => p.remove(name).await,
            Backend::Consul(p) => p.remove(name).await,
            Backend::Http(p) => p.remove(name).await,
        }
    }

    pub async fn lock(&self, name: &str) -> Result<()> {
        debug!(group = name, "state lock requested (no-op)");
        Ok(())
    }

    pub async fn unlock(&self, name: &str) -> Result<()> {
        debug!(group = name, "state unlock requested (no-op)");
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Option<String>> {
        match &self.backend {
            Backend::File(p) => p.read(name).await,
            Backend::S3(p) => p.read(name).await,
            Backend::Consul(p) => p.read(name).await,
            Backend::Http(p) => p.read(name).await,
        }
    }
}
