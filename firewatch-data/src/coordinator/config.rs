//! Coordinator policy knobs.

use std::time::Duration;

use firewatch_core::SourceKind;
use serde::{Deserialize, Serialize};

/// Configuration for [`super::SourceCoordinator`].
///
/// # Examples
///
/// ```
/// use firewatch_core::SourceKind;
/// use firewatch_data::CoordinatorConfig;
///
/// let config = CoordinatorConfig::default().with_preferred(SourceKind::Peer);
/// assert_eq!(config.preferred, Some(SourceKind::Peer));
/// assert_eq!(config.fallback_order.len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Source pinned regardless of network condition.
    pub preferred: Option<SourceKind>,
    /// Whether the push channel may be used.
    pub push_enabled: bool,
    /// Order in which sources are tried after the active one fails.
    pub fallback_order: Vec<SourceKind>,
    /// Period of the health sweep; zero disables it.
    pub health_interval: Duration,
    /// Whether successful upstream results are written to the cache.
    pub cache_results: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            preferred: None,
            push_enabled: true,
            fallback_order: SourceKind::ALL.to_vec(),
            health_interval: Duration::from_secs(30),
            cache_results: true,
        }
    }
}

impl CoordinatorConfig {
    /// Pin `kind` as the active source.
    #[must_use]
    pub const fn with_preferred(mut self, kind: SourceKind) -> Self {
        self.preferred = Some(kind);
        self
    }

    /// Allow or forbid the push channel.
    #[must_use]
    pub const fn with_push_enabled(mut self, enabled: bool) -> Self {
        self.push_enabled = enabled;
        self
    }

    /// Replace the fallback order.
    #[must_use]
    pub fn with_fallback_order(mut self, order: Vec<SourceKind>) -> Self {
        self.fallback_order = order;
        self
    }

    /// Set the health sweep period.
    #[must_use]
    pub const fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Enable or disable writing results to the cache.
    #[must_use]
    pub const fn with_cache_results(mut self, enabled: bool) -> Self {
        self.cache_results = enabled;
        self
    }
}
