//! Provider implementations
//!
//! A provider is a named external system instance declared in
//! `config.toml`. Three capabilities exist: resource backends (Grafana),
//! evaluation providers (Prometheus) and state backends (file, S3, Consul,
//! HTTP). The `Provider` sum is closed and discriminated by `kind`.

pub mod consul;
pub mod file;
pub mod grafana;
pub mod http;
pub mod prometheus;
pub mod s3;
pub mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};

pub use consul::ConsulProvider;
pub use file::FileProvider;
pub use grafana::GrafanaProvider;
pub use http::HttpProvider;
pub use prometheus::PrometheusProvider;
pub use s3::S3Provider;
pub use store::StateStore;

/// A configured provider instance, identity given by its registry name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Provider {
    File(FileProvider),
    S3(S3Provider),
    Consul(ConsulProvider),
    Http(HttpProvider),
    Grafana(GrafanaProvider),
    Prometheus(PrometheusProvider),
}

impl Provider {
    pub fn is_state_capable(&self) -> bool {
        matches!(
            self,
            Provider::File(_) | Provider::S3(_) | Provider::Consul(_) | Provider::Http(_)
        )
    }
}

/// All providers declared in the configuration, keyed by name
pub type ProviderRegistry = BTreeMap<String, Provider>;

/// Look up a provider by name
pub fn lookup<'a>(registry: &'a ProviderRegistry, name: &str) -> Result<&'a Provider> {
    registry
        .get(name)
        .ok_or_else(|| ProviderError::NotFound(name.to_string()).into())
}

/// Look up a Grafana provider by name
pub fn grafana<'a>(registry: &'a ProviderRegistry, name: &str) -> Result<&'a GrafanaProvider> {
    match lookup(registry, name)? {
        Provider::Grafana(provider) => Ok(provider),
        _ => Err(ProviderError::NotFound(name.to_string()).into()),
    }
}

/// Look up an evaluation-capable provider by name
pub fn evaluation<'a>(
    registry: &'a ProviderRegistry,
    name: &str,
) -> Result<&'a PrometheusProvider> {
    match lookup(registry, name)? {
        Provider::Prometheus(provider) => Ok(provider),
        _ => Err(ProviderError::NotFound(name.to_string()).into()),
    }
}

/// Open the state store backed by the named provider
pub fn state_store<'a>(registry: &'a ProviderRegistry, name: &str) -> Result<StateStore<'a>> {
    let provider = lookup(registry, name)?;
    StateStore::open(provider).ok_or_else(|| ProviderError::NotFound(name.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.insert(
            "gr".to_string(),
            Provider::Grafana(GrafanaProvider {
                endpoint: "http://grafana:3000".to_string(),
                token: None,
            }),
        );
        registry.insert(
            "st".to_string(),
            Provider::File(FileProvider {
                path: "/tmp/state".into(),
            }),
        );
        registry
    }

    #[test]
    fn test_lookup_missing_provider() {
        let err = lookup(&registry(), "nope").unwrap_err();
        assert_eq!(err.code(), "ERR_PROVIDER_NOT_FOUND");
    }

    #[test]
    fn test_grafana_lookup_rejects_wrong_kind() {
        assert!(grafana(&registry(), "gr").is_ok());
        assert!(grafana(&registry(), "st").is_err());
    }

    #[test]
    fn test_state_capability() {
        let registry = registry();
        assert!(registry.get("st").unwrap().is_state_capable());
        assert!(!registry.get("gr").unwrap().is_state_capable());
    }

    #[test]
    fn test_provider_deserialization_by_tag() {
        let provider: Provider = serde_json::from_value(serde_json::json!({
            "kind": "prometheus",
            "endpoint": "http://prom:9090",
            "timeout": "30s",
        }))
        .unwrap();
        match provider {
            Provider::Prometheus(prometheus) => assert_eq!(prometheus.timeout, 30.0),
            other => panic!("unexpected provider: {:?}", other),
        }
    }
}
