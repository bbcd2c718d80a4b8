//! S3 state backend
//!
//! State groups are stored as `s3://{bucket}/{path}/{name}.json`. AWS
//! error codes are mapped onto the provider error kinds so the CLI can
//! distinguish a missing bucket from a permissions problem.

use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Provider {
    pub bucket: String,
    /// Key prefix inside the bucket
    pub path: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

impl S3Provider {
    fn object_key(&self, name: &str) -> String {
        format!("{}/{}.json", self.path.trim_end_matches('/'), name)
    }

    async fn client(&self) -> aws_sdk_s3::Client {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &self.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let (Some(key), Some(secret)) = (&self.access_key_id, &self.secret_access_key) {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                "gdbt-config",
            ));
        }
        let config = loader.load().await;
        aws_sdk_s3::Client::new(&config)
    }

    fn map_error<E>(&self, err: &E, key: &str) -> ProviderError
    where
        E: ProvideErrorMetadata + std::fmt::Display,
    {
        match err.code() {
            Some("NoSuchBucket") => ProviderError::S3BucketNotFound(self.bucket.clone()),
            Some("NoSuchKey") | Some("NotFound") => ProviderError::S3ObjectNotFound(key.to_string()),
            Some("AccessDenied") => ProviderError::S3AccessDenied(self.bucket.clone()),
            _ => ProviderError::S3(err.message().unwrap_or(&err.to_string()).to_string()),
        }
    }

    pub async fn list(&self, subdir: &str) -> Result<Vec<String>> {
        let base_prefix = format!("{}/", self.path.trim_end_matches('/'));
        let prefix = if subdir.is_empty() {
            base_prefix.clone()
        } else {
            format!("{}{}/", base_prefix, subdir.trim_matches('/'))
        };

        let output = self
            .client()
            .await
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .send()
            .await
            .map_err(|e| self.map_error(&e.into_service_error(), &prefix))?;

        let mut names = Vec::new();
        for object in output.contents() {
            let Some(key) = object.key() else { continue };
            let Some(relative) = key.strip_prefix(&base_prefix) else {
                continue;
            };
            if let Some(name) = relative.strip_suffix(".json") {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn read(&self, name: &str) -> Result<Option<String>> {
        let key = self.object_key(name);
        let output = self
            .client()
            .await
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| self.map_error(&e.into_service_error(), &key))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| ProviderError::S3(e.to_string()))?
            .into_bytes();
        let content = String::from_utf8(bytes.to_vec())
            .map_err(|e| ProviderError::S3(format!("{}: {}", key, e)))?;
        Ok(Some(content))
    }

    pub async fn write(&self, name: &str, content: &str) -> Result<()> {
        let key = self.object_key(name);
        self.client()
            .await
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(content.as_bytes().to_vec()))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| self.map_error(&e.into_service_error(), &key))?;
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let key = self.object_key(name);
        self.client()
            .await
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| self.map_error(&e.into_service_error(), &key))?;
        Ok(())
    }
}
