//! Error types emitted by the Firewatch CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use firewatch_core::SourceError;
use firewatch_data::{BuildError, CacheError, CoordinatorError};
use thiserror::Error;

/// Errors emitted by the Firewatch CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Flag name.
        field: &'static str,
        /// Environment variable consulted.
        env: &'static str,
    },
    /// An option could not be parsed.
    #[error("invalid {field} {value:?}: {reason}")]
    InvalidValue {
        /// Flag name.
        field: &'static str,
        /// Offending input.
        value: String,
        /// Parser message.
        reason: String,
    },
    /// The cache path exists but is not a file.
    #[error("cache path {path:?} exists but is not a file")]
    CachePathNotFile {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// The cache file a command operates on does not exist.
    #[error("cache file {path:?} does not exist")]
    MissingCacheFile {
        /// Expected location.
        path: Utf8PathBuf,
    },
    /// The cache path could not be inspected or prepared.
    #[error("failed to prepare cache path {path:?}: {source}")]
    PrepareCachePath {
        /// Offending path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The async runtime could not be started.
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Assembling the sources failed.
    #[error("failed to build sources: {0}")]
    Build(#[source] Box<BuildError>),
    /// Every source failed to refresh.
    #[error("refresh failed: {0}")]
    Refresh(#[from] CoordinatorError),
    /// The cache could not be read at startup.
    #[error("failed to load cache: {0}")]
    CacheLoad(#[source] SourceError),
    /// A cache operation failed.
    #[error("cache operation failed: {0}")]
    Cache(#[from] CacheError),
    /// Serialising command output failed.
    #[error("failed to serialise output: {0}")]
    Serialise(#[source] serde_json::Error),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}

impl From<BuildError> for CliError {
    fn from(err: BuildError) -> Self {
        Self::Build(Box::new(err))
    }
}
