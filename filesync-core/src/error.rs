//! Error types for filesync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading and resolving a sync configuration.
///
/// Every variant is fatal for a run: nothing is fetched until the whole
/// configuration resolves.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file did not exist at the expected path.
    #[error("configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Underlying I/O failure while reading a config or envs file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse or schema error - includes file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document parsed, but its root is not a mapping.
    #[error("configuration at {path} must be a mapping")]
    NotAMapping { path: PathBuf },

    /// A repository key or `repo` value does not look like `owner/name[@ref]`.
    #[error("invalid repository '{spec}': {reason}")]
    InvalidRepo { spec: String, reason: String },

    /// A ref is empty, starts with '-', or contains whitespace.
    #[error("invalid ref '{reference}' for '{spec}': {reason}")]
    InvalidRef {
        spec: String,
        reference: String,
        reason: String,
    },

    /// A ref was given both as an `@ref` suffix and as a `ref` field.
    #[error("conflicting refs for {repo}: '@{suffix}' vs ref '{field}'")]
    ConflictingRef {
        repo: String,
        suffix: String,
        field: String,
    },

    /// The same repository is listed more than once.
    #[error("repository {repo} is configured more than once")]
    DuplicateRepo { repo: String },

    /// A source or destination path is empty, absolute, or escapes its root.
    #[error("invalid path '{path}' for {repo}: {reason}")]
    InvalidPath {
        repo: String,
        path: String,
        reason: &'static str,
    },

    /// `envs_file` points at a file that does not exist.
    #[error("envs_file not found: {path}")]
    EnvsFileMissing { path: PathBuf },

    /// A substitution rule is unusable (empty name, non-scalar value).
    #[error("invalid substitution rule #{index}: {reason}")]
    InvalidRule { index: usize, reason: String },
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
