//! Failures raised by the cache engine.

use firewatch_core::{RevisionStoreError, SourceError};
use thiserror::Error;

/// Errors raised while storing or loading cached result sets.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Records could not be serialised.
    #[error("failed to encode cached records: {source}")]
    Encode {
        /// Serialiser error.
        #[source]
        source: serde_json::Error,
    },
    /// The payload could not be compressed.
    #[error("failed to compress cached payload: {source}")]
    Compress {
        /// Compressor error.
        #[source]
        source: std::io::Error,
    },
    /// The payload could not be decompressed or was not UTF-8.
    #[error("failed to decompress cached payload: {source}")]
    Decompress {
        /// Decompressor error.
        #[source]
        source: std::io::Error,
    },
    /// The persistent store failed.
    #[error(transparent)]
    Store(#[from] RevisionStoreError),
    /// Nothing to store and no bounding box to describe it.
    #[error("cannot store an empty result set without a bounding box")]
    EmptyPayload,
    /// A blocking store task panicked or was cancelled.
    #[error("blocking cache task failed: {message}")]
    Join {
        /// Join error description.
        message: String,
    },
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Join {
            message: error.to_string(),
        }
    }
}

impl From<CacheError> for SourceError {
    fn from(error: CacheError) -> Self {
        Self::error(error.to_string())
    }
}
