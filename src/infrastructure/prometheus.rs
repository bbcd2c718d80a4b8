//! Prometheus evaluation provider
//!
//! Runs instant queries against `/api/v1/query` and hands back the raw
//! result series. HTTP(S)_PROXY environment variables are honored through
//! the client's default system-proxy behavior.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ProviderError, Result};

const DEFAULT_TIMEOUT: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusProvider {
    pub endpoint: String,
    /// Query timeout in seconds; accepts a bare number or a human-readable
    /// duration such as "30s"
    #[serde(default = "default_timeout", deserialize_with = "deserialize_timeout")]
    pub timeout: f64,
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    data: QueryData,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    result: Vec<Value>,
}

impl PrometheusProvider {
    /// Run an instant query and return the result series
    pub async fn query(&self, query: &str) -> Result<Vec<Value>> {
        let url = format!("{}/api/v1/query", self.endpoint.trim_end_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(self.timeout))
            .build()
            .map_err(|e| ProviderError::Other(e.to_string()))?;

        let response = client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| ProviderError::Other(format!("Prometheus query failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(ProviderError::Other(format!(
                "Prometheus query failed: status {}",
                response.status()
            ))
            .into());
        }

        let payload: QueryResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("Prometheus response invalid: {}", e)))?;
        Ok(payload.data.result)
    }
}

/// Accept `30`, `30.0` or `"30s"` / `"1m 30s"` for a duration in seconds
fn deserialize_timeout<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    struct TimeoutVisitor;

    impl serde::de::Visitor<'_> for TimeoutVisitor {
        type Value = f64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number of seconds or a human-readable duration")
        }

        fn visit_f64<E: serde::de::Error>(self, value: f64) -> std::result::Result<f64, E> {
            Ok(value)
        }

        fn visit_i64<E: serde::de::Error>(self, value: i64) -> std::result::Result<f64, E> {
            Ok(value as f64)
        }

        fn visit_u64<E: serde::de::Error>(self, value: u64) -> std::result::Result<f64, E> {
            Ok(value as f64)
        }

        fn visit_str<E: serde::de::Error>(self, value: &str) -> std::result::Result<f64, E> {
            if let Ok(seconds) = value.parse::<f64>() {
                return Ok(seconds);
            }
            humantime::parse_duration(value)
                .map(|duration| duration.as_secs_f64())
                .map_err(serde::de::Error::custom)
        }
    }

    deserializer.deserialize_any(TimeoutVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timeout_accepts_numbers_and_durations() {
        let provider: PrometheusProvider =
            serde_json::from_value(json!({"endpoint": "http://prom:9090"})).unwrap();
        assert_eq!(provider.timeout, 5.0);

        let provider: PrometheusProvider =
            serde_json::from_value(json!({"endpoint": "http://prom:9090", "timeout": 15}))
                .unwrap();
        assert_eq!(provider.timeout, 15.0);

        let provider: PrometheusProvider =
            serde_json::from_value(json!({"endpoint": "http://prom:9090", "timeout": "1m 30s"}))
                .unwrap();
        assert_eq!(provider.timeout, 90.0);
    }

    #[tokio::test]
    async fn test_query_returns_result_series() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(mockito::Matcher::UrlEncoded("query".into(), "up".into()))
            .with_status(200)
            .with_body(
                r#"{"status": "success",
                    "data": {"resultType": "vector",
                             "result": [{"metric": {"env": "stg"}, "value": [0, "1"]},
                                        {"metric": {"env": "prd"}, "value": [0, "1"]}]}}"#,
            )
            .create_async()
            .await;

        let provider = PrometheusProvider {
            endpoint: server.url(),
            timeout: 5.0,
        };
        let series = provider.query("up").await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0]["metric"]["env"], json!("stg"));
    }

    #[tokio::test]
    async fn test_query_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let provider = PrometheusProvider {
            endpoint: server.url(),
            timeout: 5.0,
        };
        let err = provider.query("up").await.unwrap_err();
        assert_eq!(err.code(), "ERR_PROVIDER");
    }
}
