//! Plain HTTP state backend
//!
//! GET/PUT/DELETE of the state JSON at `{endpoint}/{name}.json`. Listing
//! expects the endpoint to answer `GET {endpoint}/{subdir}` with a JSON
//! array of group names.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProvider {
    pub endpoint: String,
}

impl HttpProvider {
    fn object_url(&self, name: &str) -> String {
        format!("{}/{}.json", self.endpoint.trim_end_matches('/'), name)
    }

    fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()).into())
    }

    pub async fn list(&self, subdir: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            subdir.trim_matches('/')
        );
        let response = self
            .client()?
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(ProviderError::Http(format!("status {}", response.status())).into());
        }
        let mut names: Vec<String> = response
            .json()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        names.sort();
        Ok(names)
    }

    pub async fn read(&self, name: &str) -> Result<Option<String>> {
        let response = self
            .client()?
            .get(self.object_url(name))
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Http(format!("status {}", response.status())).into());
        }
        let content = response
            .text()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        Ok(Some(content))
    }

    pub async fn write(&self, name: &str, content: &str) -> Result<()> {
        let response = self
            .client()?
            .put(self.object_url(name))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(content.to_string())
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::Http(format!("status {}", response.status())).into());
        }
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let response = self
            .client()?
            .delete(self.object_url(name))
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(ProviderError::Http(format!("status {}", response.status())).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_through_mock_endpoint() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/state/dashboards/web.json")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("GET", "/state/dashboards/web.json")
            .with_status(200)
            .with_body("{\"a\": 1}")
            .create_async()
            .await;

        let provider = HttpProvider {
            endpoint: format!("{}/state", server.url()),
        };
        provider.write("dashboards/web", "{\"a\": 1}").await.unwrap();
        let content = provider.read("dashboards/web").await.unwrap();
        assert_eq!(content.as_deref(), Some("{\"a\": 1}"));
    }

    #[tokio::test]
    async fn test_read_missing_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/state/absent.json")
            .with_status(404)
            .create_async()
            .await;

        let provider = HttpProvider {
            endpoint: format!("{}/state", server.url()),
        };
        assert!(provider.read("absent").await.unwrap().is_none());
    }
}
