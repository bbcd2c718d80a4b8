//! Local filesystem state backend
//!
//! State groups are stored as `{path}/{name}.json`. Writes go through a
//! temporary file in the target directory followed by a rename, so a
//! crashed process never leaves a half-written state file behind.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{ProviderError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileProvider {
    pub path: PathBuf,
}

impl FileProvider {
    fn object_path(&self, name: &str) -> PathBuf {
        self.path.join(format!("{}.json", name))
    }

    pub async fn list(&self, subdir: &str) -> Result<Vec<String>> {
        let root = if subdir.is_empty() {
            self.path.clone()
        } else {
            self.path.join(subdir)
        };
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(name) = relative_name(entry.path(), &self.path) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.object_path(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                ProviderError::FileNotFound(path.display().to_string()).into(),
            ),
            Err(e) => Err(ProviderError::from_io(&e, &path.display().to_string()).into()),
        }
    }

    pub async fn write(&self, name: &str, content: &str) -> Result<()> {
        let path = self.object_path(name);
        let parent = path.parent().unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ProviderError::from_io(&e, &parent.display().to_string()))?;

        let temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| ProviderError::from_io(&e, &parent.display().to_string()))?;
        std::fs::write(temp.path(), content)
            .map_err(|e| ProviderError::from_io(&e, &path.display().to_string()))?;
        temp.persist(&path)
            .map_err(|e| ProviderError::from_io(&e.error, &path.display().to_string()))?;
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let path = self.object_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProviderError::from_io(&e, &path.display().to_string()).into()),
        }
    }
}

fn relative_name(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let without_ext = relative.with_extension("");
    let name = without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(dir: &Path) -> FileProvider {
        FileProvider {
            path: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = provider(dir.path());

        backend.write("dashboards/web", "{\"a\": 1}").await.unwrap();
        let content = backend.read("dashboards/web").await.unwrap();
        assert_eq!(content.as_deref(), Some("{\"a\": 1}"));
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = provider(dir.path()).read("absent").await.unwrap_err();
        assert_eq!(err.code(), "ERR_FILE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_list_strips_extension_and_nests() {
        let dir = tempfile::tempdir().unwrap();
        let backend = provider(dir.path());

        backend.write("folders/main", "{}").await.unwrap();
        backend.write("dashboards/web", "{}").await.unwrap();

        let names = backend.list("").await.unwrap();
        assert_eq!(names, vec!["dashboards/web", "folders/main"]);

        let names = backend.list("folders").await.unwrap();
        assert_eq!(names, vec!["folders/main"]);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = provider(dir.path());

        backend.write("group", "{}").await.unwrap();
        backend.remove("group").await.unwrap();
        backend.remove("group").await.unwrap();
        assert!(backend.list("").await.unwrap().is_empty());
    }
}
