use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How badly a source failed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Transient and auto-recoverable, e.g. a single probe timeout.
    Warning,
    /// The operation failed; retry or fallback may succeed.
    Error,
    /// The source is unusable until a later operation succeeds.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        })
    }
}

/// Error reported by a source through its shared error channel.
///
/// # Examples
/// ```
/// use firewatch_core::{Severity, SourceError};
///
/// let err = SourceError::critical("reconnect attempts exhausted");
/// assert_eq!(err.severity, Severity::Critical);
/// assert!(!err.recoverable);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{severity}: {message}")]
pub struct SourceError {
    /// Human-readable description.
    pub message: String,
    /// Classification.
    pub severity: Severity,
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
    /// Whether retry or fallback may succeed without intervention.
    pub recoverable: bool,
}

impl SourceError {
    /// Construct an error stamped with the current time.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
            timestamp: Utc::now(),
            recoverable: severity != Severity::Critical,
        }
    }

    /// Transient failure.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Failed operation.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Source judged unusable.
    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, message)
    }

    /// Whether the error marks its source unhealthy.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}
