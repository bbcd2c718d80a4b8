//! # Configuration system
//!
//! Hierarchical `config.toml` discovery: starting at the scope directory,
//! every ancestor directory is searched for a `config.toml`, and the results
//! are merged with the nearest file overriding the farther ones.
//!
//! ## Sections
//!
//! 1. **`[providers.<name>]`** — provider instances, discriminated by `kind`
//!    (`grafana`, `prometheus`, `file`, `s3`, `consul`, `http`).
//! 2. **`[state]`** — `provider` (name of a state-capable provider) and an
//!    optional `lock_timeout` in seconds.
//! 3. **`[concurrency]`** — worker pool size and per-batch wait timeout.
//!
//! Environment variables are substituted into string values (`${VAR}` or
//! `$VAR`) before deserialization, so tokens never need to live in the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::error::{ConfigError, GdbtError, Result};
use crate::infrastructure::Provider;

pub const CONFIG_FILENAME: &str = "config.toml";

/// Complete merged configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    /// Provider instances keyed by the user-chosen name
    pub providers: BTreeMap<String, Provider>,

    /// State store selection
    pub state: StateConfiguration,

    /// Worker pool tuning
    #[serde(default)]
    pub concurrency: ConcurrencyConfiguration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfiguration {
    /// Name of the provider that persists state
    pub provider: String,

    /// Lock acquisition timeout in seconds
    #[serde(default)]
    pub lock_timeout: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencyConfiguration {
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Per-batch wait timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,
}

impl Default for ConcurrencyConfiguration {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            timeout: default_timeout(),
        }
    }
}

fn default_threads() -> usize {
    100
}

fn default_timeout() -> f64 {
    60.0
}

/// Loads and merges `config.toml` files from the scope upward
pub struct ConfigurationLoader {
    path: PathBuf,
}

impl ConfigurationLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// List config files from the scope upward, nearest first
    fn list_files(&self) -> Vec<PathBuf> {
        let start = self
            .path
            .canonicalize()
            .unwrap_or_else(|_| self.path.clone());

        let mut files = Vec::new();
        let mut current: Option<&Path> = Some(start.as_path());
        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_FILENAME);
            if candidate.is_file() {
                files.push(candidate);
            }
            current = dir.parent();
        }
        files
    }

    /// Substitute `${VAR}` / `$VAR` into every string value
    fn substitute_env(value: &mut toml::Value) {
        match value {
            toml::Value::String(s) => {
                *s = expand_env(s);
            }
            toml::Value::Array(items) => {
                for item in items {
                    Self::substitute_env(item);
                }
            }
            toml::Value::Table(table) => {
                for (_, item) in table.iter_mut() {
                    Self::substitute_env(item);
                }
            }
            _ => {}
        }
    }

    /// Deep-merge `overlay` onto `base`; overlay wins on conflicts
    fn merge(base: &mut toml::Value, overlay: toml::Value) {
        match (base, overlay) {
            (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
                for (key, overlay_value) in overlay_table {
                    let mergeable = overlay_value.is_table()
                        && base_table.get(&key).is_some_and(toml::Value::is_table);
                    if mergeable {
                        if let Some(base_value) = base_table.get_mut(&key) {
                            Self::merge(base_value, overlay_value);
                        }
                    } else {
                        base_table.insert(key, overlay_value);
                    }
                }
            }
            (base_slot, overlay_value) => *base_slot = overlay_value,
        }
    }

    pub fn load(&self) -> Result<Configuration> {
        let files = self.list_files();
        if files.is_empty() {
            return Err(ConfigError::FileNotFound.into());
        }

        // Farthest ancestor first, so nearer files override
        let mut merged = toml::Value::Table(toml::map::Map::new());
        for file in files.iter().rev() {
            let raw = std::fs::read_to_string(file).map_err(|e| {
                GdbtError::Config(ConfigError::FormatInvalid(format!(
                    "{}: {}",
                    file.display(),
                    e
                )))
            })?;
            let parsed: toml::Value = raw.parse().map_err(|e| {
                GdbtError::Config(ConfigError::FormatInvalid(format!(
                    "{}: {}",
                    file.display(),
                    e
                )))
            })?;
            Self::merge(&mut merged, parsed);
        }

        match &merged {
            toml::Value::Table(table) if table.is_empty() => {
                return Err(ConfigError::Empty.into());
            }
            _ => {}
        }

        Self::substitute_env(&mut merged);

        let configuration: Configuration = merged
            .try_into()
            .map_err(|e| GdbtError::Config(ConfigError::FormatInvalid(e.to_string())))?;
        Ok(configuration)
    }
}

fn expand_env(input: &str) -> String {
    // ${VAR} or bare $VAR; unset variables expand to an empty string
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("static regex");
    pattern
        .replace_all(input, |caps: &regex::Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            std::env::var(name).unwrap_or_default()
        })
        .into_owned()
}

/// Load the merged configuration for a scope directory
pub fn load(scope: impl Into<PathBuf>) -> Result<Configuration> {
    ConfigurationLoader::new(scope).load()
}
