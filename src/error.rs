//! Unified error type hierarchy for the build-graph engine
//!
//! Provides structured error handling with ConfigError, GraphError, DownloadError,
//! CacheError, ToolchainMismatchError, SymbolListError and the aggregating AppError.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Unknown `target_config` keys were supplied.
///
/// Carries every offending key, not just the first one, plus the accepted set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "invalid target_config keys for {target}: [{}]; valid keys are: [{}]",
    invalid_keys.join(", "),
    valid_keys.join(", ")
)]
pub struct ConfigValidationError {
    pub target: String,
    pub invalid_keys: Vec<String>,
    pub valid_keys: Vec<&'static str>,
}

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Validation(#[from] ConfigValidationError),

    #[error("type mismatch in target_config for {target}: {}", mismatches.join("; "))]
    TypeMismatch {
        target: String,
        mismatches: Vec<String>,
    },

    #[error("unknown targets in target_configs: [{}]; known targets are: [{}]", unknown.join(", "), known.join(", "))]
    UnknownTarget {
        unknown: Vec<String>,
        known: Vec<&'static str>,
    },

    #[error("--config=local requires --cache_dir to be set")]
    CacheMisconfigured,

    #[error("malformed build number entry '{0}': expected key=value")]
    MalformedBuildNumber(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid TOML in config: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Dependency graph construction errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node '{0}' declared twice")]
    DuplicateNode(String),

    #[error("node '{node}' depends on '{dependency}', which has not been declared yet")]
    UnknownDependency { node: String, dependency: String },

    #[error("node '{node}' ({node_phase}) may not depend on '{dependency}' from the later phase {dependency_phase}")]
    PhaseInversion {
        node: String,
        node_phase: &'static str,
        dependency: String,
        dependency_phase: &'static str,
    },

    #[error("dependency cycle detected: {remaining} of {total} nodes cannot be ordered")]
    Cycle { remaining: usize, total: usize },

    #[error("node '{0}' not found")]
    NotFound(String),
}

/// Artifact download errors.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// A mandatory file could not be materialized; fatal for the repository.
    #[error("failed to download mandatory file '{file}' from {source_url}: {reason}")]
    Failed {
        file: String,
        source_url: String,
        reason: String,
    },

    #[error("mandatory file '{file}' not found under local artifact path {}", root.display())]
    LocalMissing { file: String, root: PathBuf },

    #[error("download spec error: {0}")]
    InvalidSpec(String),

    #[error("remote returned JSON without a signedUrl: {0}")]
    MissingSignedUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error during download: {0}")]
    Io(#[from] io::Error),
}

/// A failure whose reporting was deferred until the artifact is consumed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{target}: {message}")]
pub struct DeferredResolutionFailure {
    pub target: String,
    pub message: String,
}

/// Cache slot preparation errors.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("base cache tags already contain '{0}'")]
    DuplicateTag(String),

    #[error("cache tags must be a JSON object, got: {0}")]
    NotAnObject(String),

    #[error("Invalid JSON in cache tags {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error in cache dir: {0}")]
    Io(#[from] io::Error),
}

/// Execution and target platform resolved different compiler toolchains.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("toolchain version mismatch: target platform expects {expected}, execution platform has {actual}")]
pub struct ToolchainMismatchError {
    pub expected: String,
    pub actual: String,
}

/// KMI symbol list parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolListError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Missing symbol: {0}")]
    MissingSymbol(String),
}

/// Global error type for all modules
///
/// Provides unified error categorization and user-facing messages.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Deferred(#[from] DeferredResolutionFailure),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainMismatchError),

    #[error(transparent)]
    SymbolList(#[from] SymbolListError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AppError {
    /// Get a user-facing error message suitable for terminal display
    pub fn user_message(&self) -> String {
        match self {
            AppError::Config(e) => format!("Configuration error: {}", e),
            AppError::Graph(e) => format!("Build graph error: {}", e),
            AppError::Download(e) => format!("Download failed: {}", e),
            AppError::Deferred(e) => format!("Requested artifact is unavailable: {}", e),
            AppError::Cache(e) => format!("Cache error: {}", e),
            AppError::Toolchain(e) => format!("Toolchain error: {}", e),
            AppError::SymbolList(e) => format!("Symbol list error: {}", e),
            AppError::Io(e) => format!("File operation failed: {}", e),
        }
    }
}

impl From<ConfigValidationError> for AppError {
    fn from(e: ConfigValidationError) -> Self {
        AppError::Config(ConfigError::Validation(e))
    }
}

/// Top-level result type for operations that may fail.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_key() {
        let err = ConfigValidationError {
            target: "kernel_aarch64".to_string(),
            invalid_keys: vec!["bogus_key".to_string(), "other".to_string()],
            valid_keys: vec!["kmi_symbol_list", "trim_nonlisted_kmi"],
        };
        let msg = err.to_string();
        assert!(msg.contains("bogus_key"));
        assert!(msg.contains("other"));
        assert!(msg.contains("trim_nonlisted_kmi"));
    }

    #[test]
    fn test_toolchain_mismatch_display() {
        let err = ToolchainMismatchError {
            expected: "r487747c".to_string(),
            actual: "r475365b".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "toolchain version mismatch: target platform expects r487747c, execution platform has r475365b"
        );
    }

    #[test]
    fn test_user_message_wraps_config_error() {
        let err: AppError = ConfigError::CacheMisconfigured.into();
        assert_eq!(
            err.user_message(),
            "Configuration error: --config=local requires --cache_dir to be set"
        );
    }

    #[test]
    fn test_result_type_err() {
        let result: Result<i32> = Err(ConfigError::FileNotFound("x.json".into()).into());
        assert!(result.is_err());
    }
}
