//! Centralized error types for gdbt
//!
//! Uses thiserror for typed errors that can be matched on. Every error
//! carries a stable machine-readable code, printed by the CLI as
//! `[ERROR] [code]: message`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GdbtError>;

/// Top-level error type for gdbt operations
#[derive(Error, Debug)]
pub enum GdbtError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Variable error: {0}")]
    Variable(#[from] VariableError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Invalid data: {0}")]
    Data(String),
}

impl GdbtError {
    /// Stable error code for CLI output
    pub fn code(&self) -> &'static str {
        match self {
            GdbtError::Provider(e) => e.code(),
            GdbtError::Variable(e) => e.code(),
            GdbtError::Config(e) => e.code(),
            GdbtError::State(e) => e.code(),
            GdbtError::Data(_) => "ERR_DATA",
        }
    }
}

/// Provider errors (Grafana, Prometheus, state backends)
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider error: {0}")]
    Other(String),

    #[error("Provider not found: {0}")]
    NotFound(String),

    #[error("Grafana API error: {0}")]
    Grafana(String),

    #[error("Grafana server error: {0}")]
    GrafanaServer(String),

    #[error("Grafana resource not found: {0}")]
    GrafanaResourceNotFound(String),

    #[error("File error: {0}")]
    File(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File access denied: {0}")]
    FileAccessDenied(String),

    #[error("Consul error: {0}")]
    Consul(String),

    #[error("Consul key not found: {0}")]
    ConsulKeyNotFound(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("S3 bucket not found: {0}")]
    S3BucketNotFound(String),

    #[error("S3 object not found: {0}")]
    S3ObjectNotFound(String),

    #[error("S3 access denied: {0}")]
    S3AccessDenied(String),

    #[error("HTTP state backend error: {0}")]
    Http(String),
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::Other(_) => "ERR_PROVIDER",
            ProviderError::NotFound(_) => "ERR_PROVIDER_NOT_FOUND",
            ProviderError::Grafana(_) => "ERR_GRAFANA",
            ProviderError::GrafanaServer(_) => "ERR_GRAFANA_SERVER",
            ProviderError::GrafanaResourceNotFound(_) => "ERR_GRAFANA_RESOURCE_NOT_FOUND",
            ProviderError::File(_) => "ERR_FILE",
            ProviderError::FileNotFound(_) => "ERR_FILE_NOT_FOUND",
            ProviderError::FileAccessDenied(_) => "ERR_FILE_ACCESS_DENIED",
            ProviderError::Consul(_) => "ERR_CONSUL",
            ProviderError::ConsulKeyNotFound(_) => "ERR_CONSUL_KEY_NOT_FOUND",
            ProviderError::S3(_) => "ERR_S3",
            ProviderError::S3BucketNotFound(_) => "ERR_S3_BUCKET_NOT_FOUND",
            ProviderError::S3ObjectNotFound(_) => "ERR_S3_OBJECT_NOT_FOUND",
            ProviderError::S3AccessDenied(_) => "ERR_S3_ACCESS_DENIED",
            ProviderError::Http(_) => "ERR_HTTP",
        }
    }

    /// Map an OS-level I/O error on `path` to the file backend error kinds.
    pub fn from_io(err: &std::io::Error, path: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ProviderError::FileNotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                ProviderError::FileAccessDenied(path.to_string())
            }
            _ => ProviderError::File(format!("{}: {}", path, err)),
        }
    }
}

/// Template variable resolution errors
#[derive(Error, Debug)]
pub enum VariableError {
    #[error("Variable not found: {0}")]
    NotFound(String),

    #[error("Variable is not iterable: {0}")]
    NotIterable(String),
}

impl VariableError {
    pub fn code(&self) -> &'static str {
        match self {
            VariableError::NotFound(_) => "ERR_VARIABLE_NOT_FOUND",
            VariableError::NotIterable(_) => "ERR_VARIABLE_NOT_ITERABLE",
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found")]
    FileNotFound,

    #[error("Configuration is empty")]
    Empty,

    #[error("Invalid configuration format: {0}")]
    FormatInvalid(String),

    #[error("Invalid kind of evaluation: {0}")]
    EvaluationKindNotFound(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::FileNotFound => "ERR_CONFIG_FILE_NOT_FOUND",
            ConfigError::Empty => "ERR_CONFIG_EMPTY",
            ConfigError::FormatInvalid(_) => "ERR_CONFIG_FORMAT_INVALID",
            ConfigError::EvaluationKindNotFound(_) => "ERR_CONFIG_EVALUATION_KIND_INVALID",
        }
    }
}

/// Persisted state errors
#[derive(Error, Debug)]
pub enum StateError {
    #[error("State version {found} is incompatible with this version of gdbt (expected {expected})")]
    VersionIncompatible { found: i64, expected: i64 },

    #[error("State is corrupted: {0}")]
    Corrupted(String),

    #[error("Failed to lock state: {0}")]
    Lock(String),

    #[error("State is already locked: {0}")]
    AlreadyLocked(String),

    #[error("Failed to unlock state: {0}")]
    Unlock(String),
}

impl StateError {
    pub fn code(&self) -> &'static str {
        match self {
            StateError::VersionIncompatible { .. } => "ERR_STATE_VERSION_INCOMPATIBLE",
            StateError::Corrupted(_) => "ERR_STATE_CORRUPTED",
            StateError::Lock(_) => "ERR_STATE_LOCK",
            StateError::AlreadyLocked(_) => "ERR_STATE_ALREADY_LOCKED",
            StateError::Unlock(_) => "ERR_STATE_UNLOCK",
        }
    }
}
