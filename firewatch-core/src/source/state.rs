use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SourceError;

/// Static description of what a source can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCapabilities {
    /// Receives incremental deltas over a persistent channel.
    pub supports_push: bool,
    /// Discovers peers on the local network.
    pub supports_peer_discovery: bool,
    /// Results may be written into the cache.
    pub supports_caching: bool,
    /// Applies time filtering.
    pub supports_filtering: bool,
    /// Applies bounding-box filtering.
    pub supports_bounding_box: bool,
    /// Upper bound on concurrent upstream requests.
    pub max_concurrent_requests: usize,
    /// Suggested refresh cadence.
    pub update_interval: Duration,
}

/// Connection health as reported by the owning source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Whether the upstream is currently reachable.
    pub connected: bool,
    /// Identifier of the upstream endpoint in use.
    pub endpoint: Option<String>,
    /// Last time a connection or request succeeded.
    pub last_connected: Option<DateTime<Utc>>,
    /// Failures since the last success.
    pub consecutive_errors: u32,
}

/// Record count and freshness of the latest successful refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    /// Records returned by the latest successful refresh.
    pub count: usize,
    /// Completion time of the latest successful refresh.
    pub last_update: Option<DateTime<Utc>>,
}

/// Consistent read-only view of a source's observable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    /// A refresh is in flight.
    pub loading: bool,
    /// Current error, cleared when the next refresh starts.
    pub error: Option<SourceError>,
    /// Connection health.
    pub connection: ConnectionStatus,
    /// Latest refresh statistics.
    pub stats: SourceStats,
    /// False after a critical error until the next success.
    pub healthy: bool,
}

#[derive(Debug)]
struct Inner {
    loading: bool,
    in_flight: usize,
    error: Option<SourceError>,
    connection: ConnectionStatus,
    stats: SourceStats,
    healthy: bool,
}

/// Mutable state embedded by every source implementation.
///
/// Refreshes may overlap, so `loading` stays set until the last in-flight
/// refresh finishes.
#[derive(Debug)]
pub struct SourceState {
    inner: Mutex<Inner>,
}

impl Default for SourceState {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                loading: false,
                in_flight: 0,
                error: None,
                connection: ConnectionStatus::default(),
                stats: SourceStats::default(),
                healthy: true,
            }),
        }
    }
}

impl SourceState {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a refresh as started and clear any stale error.
    pub fn begin_refresh(&self) {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_add(1);
        inner.loading = true;
        inner.error = None;
    }

    /// Mark a refresh as succeeded with `count` records.
    pub fn finish_ok(&self, count: usize) {
        let now = Utc::now();
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.loading = inner.in_flight > 0;
        inner.stats = SourceStats {
            count,
            last_update: Some(now),
        };
        inner.healthy = true;
        inner.connection.consecutive_errors = 0;
        inner.connection.last_connected = Some(now);
    }

    /// Mark a refresh as failed.
    pub fn finish_err(&self, error: SourceError) {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.loading = inner.in_flight > 0;
        Self::apply_error(&mut inner, error);
    }

    /// Record an error raised outside a refresh, e.g. by a background task.
    pub fn report_error(&self, error: SourceError) {
        Self::apply_error(&mut self.lock(), error);
    }

    fn apply_error(inner: &mut Inner, error: SourceError) {
        inner.connection.consecutive_errors = inner.connection.consecutive_errors.saturating_add(1);
        if error.is_critical() {
            inner.healthy = false;
        }
        inner.error = Some(error);
    }

    /// Clear the current error without touching counters.
    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    /// Record an established connection to `endpoint`.
    pub fn set_connected(&self, endpoint: impl Into<String>) {
        let mut inner = self.lock();
        inner.connection.connected = true;
        inner.connection.endpoint = Some(endpoint.into());
        inner.connection.last_connected = Some(Utc::now());
        inner.connection.consecutive_errors = 0;
        inner.healthy = true;
    }

    /// Record a lost or closed connection.
    pub fn set_disconnected(&self) {
        self.lock().connection.connected = false;
    }

    /// Overwrite the health flag, e.g. after a probe sweep.
    pub fn set_healthy(&self, healthy: bool) {
        self.lock().healthy = healthy;
    }

    /// Whether the source is currently considered usable.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.lock().healthy
    }

    /// Copy the observable state.
    #[must_use]
    pub fn snapshot(&self) -> SourceSnapshot {
        let inner = self.lock();
        SourceSnapshot {
            loading: inner.loading,
            error: inner.error.clone(),
            connection: inner.connection.clone(),
            stats: inner.stats,
            healthy: inner.healthy,
        }
    }
}
