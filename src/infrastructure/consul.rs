//! Consul K/V state backend
//!
//! Talks to the Consul HTTP API directly. Values come back base64-encoded
//! in the K/V read response; the raw decoded value is the state JSON.

use std::time::Duration;

use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsulProvider {
    pub endpoint: String,
    /// Key prefix inside the K/V store
    pub path: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub datacenter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KvEntry {
    #[serde(rename = "Value")]
    value: Option<String>,
}

impl ConsulProvider {
    fn key(&self, name: &str) -> String {
        format!("{}/{}", self.path.trim_matches('/'), name)
    }

    fn kv_url(&self, key: &str) -> Result<url::Url> {
        let base = url::Url::parse(&self.endpoint)
            .map_err(|e| ProviderError::Consul(format!("{}: {}", self.endpoint, e)))?;
        let mut url = base
            .join(&format!("v1/kv/{}", key))
            .map_err(|e| ProviderError::Consul(e.to_string()))?;
        if let Some(datacenter) = &self.datacenter {
            url.query_pairs_mut().append_pair("dc", datacenter);
        }
        Ok(url)
    }

    fn client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(30));
        if let Some(token) = &self.token {
            let mut headers = reqwest::header::HeaderMap::new();
            let value = reqwest::header::HeaderValue::from_str(token)
                .map_err(|e| ProviderError::Consul(e.to_string()))?;
            headers.insert("X-Consul-Token", value);
            builder = builder.default_headers(headers);
        }
        builder
            .build()
            .map_err(|e| ProviderError::Consul(e.to_string()).into())
    }

    pub async fn list(&self, subdir: &str) -> Result<Vec<String>> {
        let prefix = if subdir.is_empty() {
            self.path.trim_matches('/').to_string()
        } else {
            self.key(subdir.trim_matches('/'))
        };
        let mut url = self.kv_url(&format!("{}/", prefix))?;
        url.query_pairs_mut().append_pair("keys", "true");

        let response = self
            .client()?
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Consul(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(ProviderError::Consul(format!("status {}", response.status())).into());
        }

        let keys: Vec<String> = response
            .json()
            .await
            .map_err(|e| ProviderError::Consul(e.to_string()))?;
        let base_prefix = format!("{}/", self.path.trim_matches('/'));
        let mut names: Vec<String> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(&base_prefix))
            .map(|name| name.to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    pub async fn read(&self, name: &str) -> Result<Option<String>> {
        let key = self.key(name);
        let url = self.kv_url(&key)?;

        let response = self
            .client()?
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Consul(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::ConsulKeyNotFound(key).into());
        }
        if !response.status().is_success() {
            return Err(ProviderError::Consul(format!("status {}", response.status())).into());
        }

        let entries: Vec<KvEntry> = response
            .json()
            .await
            .map_err(|e| ProviderError::Consul(e.to_string()))?;
        let Some(encoded) = entries.into_iter().next().and_then(|entry| entry.value) else {
            return Err(ProviderError::ConsulKeyNotFound(key).into());
        };
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ProviderError::Consul(format!("{}: {}", key, e)))?;
        let content = String::from_utf8(decoded)
            .map_err(|e| ProviderError::Consul(format!("{}: {}", key, e)))?;
        Ok(Some(content))
    }

    pub async fn write(&self, name: &str, content: &str) -> Result<()> {
        let key = self.key(name);
        let url = self.kv_url(&key)?;

        let response = self
            .client()?
            .put(url)
            .body(content.to_string())
            .send()
            .await
            .map_err(|e| ProviderError::Consul(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::Consul(format!("status {}", response.status())).into());
        }
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let key = self.key(name);
        let url = self.kv_url(&key)?;

        let response = self
            .client()?
            .delete(url)
            .send()
            .await
            .map_err(|e| ProviderError::Consul(e.to_string()))?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(ProviderError::Consul(format!("status {}", response.status())).into());
        }
        Ok(())
    }
}
