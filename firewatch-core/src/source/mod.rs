//! The contract every upstream strategy implements.
//!
//! A source turns [`QueryParams`] into [`EventRecord`] values and reports its
//! progress through a shared [`SourceState`]: loading flag, current error,
//! connection status, and refresh statistics. The coordinator only ever
//! talks to sources through [`EventSource`], so strategies can be swapped or
//! stubbed freely.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{EventRecord, QueryParams};

mod error;
mod state;

pub use error::{Severity, SourceError};
pub use state::{ConnectionStatus, SourceCapabilities, SourceSnapshot, SourceState, SourceStats};

/// Identifier of one of the four upstream strategies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// One-shot remote query.
    Remote,
    /// Persistent push channel.
    Push,
    /// Same-network peer server.
    Peer,
    /// Local two-tier cache.
    Cache,
}

impl SourceKind {
    /// Every kind in default fallback order.
    pub const ALL: [Self; 4] = [Self::Remote, Self::Push, Self::Peer, Self::Cache];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Push => "push",
            Self::Peer => "peer",
            Self::Cache => "cache",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| format!("unknown source {value:?}"))
    }
}

/// Upstream strategy supplying event records.
///
/// Implementations hold their state behind interior mutability so a single
/// instance can be shared as `Arc<dyn EventSource>`. Overlapping `refresh`
/// calls are allowed and must not leak resources.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use firewatch_core::{
///     EventRecord, EventSource, QueryParams, SourceCapabilities, SourceError, SourceKind,
///     SourceSnapshot, SourceState,
/// };
///
/// struct Empty {
///     state: SourceState,
///     capabilities: SourceCapabilities,
/// }
///
/// #[async_trait]
/// impl EventSource for Empty {
///     fn kind(&self) -> SourceKind {
///         SourceKind::Remote
///     }
///
///     fn capabilities(&self) -> &SourceCapabilities {
///         &self.capabilities
///     }
///
///     async fn init(&self) -> Result<(), SourceError> {
///         Ok(())
///     }
///
///     async fn refresh(&self, _params: &QueryParams) -> Result<Vec<EventRecord>, SourceError> {
///         self.state.begin_refresh();
///         self.state.finish_ok(0);
///         Ok(Vec::new())
///     }
///
///     async fn destroy(&self) {}
///
///     async fn health_check(&self) -> bool {
///         true
///     }
///
///     fn state(&self) -> SourceSnapshot {
///         self.state.snapshot()
///     }
/// }
/// ```
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Which strategy this is.
    fn kind(&self) -> SourceKind;

    /// Static capability declaration.
    fn capabilities(&self) -> &SourceCapabilities;

    /// Prepare the source for use. Calling it twice is harmless.
    async fn init(&self) -> Result<(), SourceError>;

    /// Fetch events matching `params`.
    ///
    /// Implementations clear any stale error before doing work and report
    /// the outcome through their state.
    async fn refresh(&self, params: &QueryParams) -> Result<Vec<EventRecord>, SourceError>;

    /// Abort in-flight work, cancel timers, and release connections.
    async fn destroy(&self);

    /// Probe whether the source is currently usable.
    async fn health_check(&self) -> bool;

    /// Observable state.
    fn state(&self) -> SourceSnapshot;

    /// Latest refresh statistics.
    fn stats(&self) -> SourceStats {
        self.state().stats
    }
}
