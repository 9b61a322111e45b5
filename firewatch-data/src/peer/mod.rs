//! Same-network peers serving the remote endpoint's data contract.
//!
//! Candidates are discovered lazily whenever no peer is selected, ranked by
//! priority and response time, and revalidated by a periodic health sweep
//! that reruns discovery until a peer turns up. A refresh
//! that fails against the selected peer marks it unhealthy, reselects, and
//! retries once before giving up.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use firewatch_core::{
    EventRecord, EventSource, PeerEndpoint, QueryParams, SourceCapabilities, SourceError,
    SourceKind, SourceSnapshot, SourceState, merge_candidates, select_endpoint,
};
use futures_util::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{schedule::PeriodicTask, worker::BackgroundProcessor};

mod discovery;
mod probe;

pub use discovery::{
    ANNOUNCED_PRIORITY, AnnouncementBrowser, DiscoveryConfig, NoAnnouncements, RANGE_PRIORITY,
    ScanRange, discover,
};
pub use probe::{HttpPeerProbe, PeerProbe};

/// Configuration for [`PeerDiscoverySource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Discovery strategies.
    pub discovery: DiscoveryConfig,
    /// Period of the health sweep; zero disables it.
    pub health_interval: Duration,
    /// Bound on each events request.
    pub request_timeout: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            health_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl PeerConfig {
    /// Use `discovery`.
    #[must_use]
    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    /// Set the health sweep period.
    #[must_use]
    pub const fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }
}

struct PeerInner {
    config: PeerConfig,
    probe: Arc<dyn PeerProbe>,
    browser: Arc<dyn AnnouncementBrowser>,
    candidates: Mutex<Vec<PeerEndpoint>>,
    selected: Mutex<Option<String>>,
    state: SourceState,
}

impl PeerInner {
    async fn discover(&self) -> usize {
        let found = discover(
            &self.config.discovery,
            self.probe.as_ref(),
            self.browser.as_ref(),
        )
        .await;
        let count = {
            let mut candidates = lock(&self.candidates);
            merge_candidates(&mut candidates, found);
            candidates.len()
        };
        self.reselect();
        count
    }

    async fn discover_if_unselected(&self) {
        if self.selected().is_none() {
            self.discover().await;
        }
    }

    /// Rediscover while nothing is selected, otherwise re-probe the known
    /// candidates.
    async fn maintain(&self) {
        if self.selected().is_none() {
            self.discover().await;
        } else {
            self.sweep().await;
        }
    }

    /// Re-probe every candidate and reselect.
    async fn sweep(&self) {
        let current = lock(&self.candidates).clone();
        let timeout = self.config.discovery.probe_timeout;
        let limit = &self.config.discovery.probe_limit();
        let probed = join_all(current.into_iter().map(|candidate| {
            let capabilities = candidate.capabilities;
            async move {
                let mut checked = discovery::check(
                    self.probe.as_ref(),
                    limit,
                    candidate.url,
                    candidate.priority,
                    timeout,
                )
                .await;
                checked.capabilities = capabilities;
                checked
            }
        }))
        .await;
        {
            let mut candidates = lock(&self.candidates);
            for checked in probed {
                if let Some(existing) = candidates.iter_mut().find(|c| c.url == checked.url) {
                    *existing = checked;
                }
            }
        }
        self.reselect();
    }

    fn reselect(&self) -> Option<String> {
        let chosen = select_endpoint(&lock(&self.candidates)).map(|c| c.url.clone());
        let previous = std::mem::replace(&mut *lock(&self.selected), chosen.clone());
        match chosen.as_deref() {
            Some(url) => {
                if previous.as_deref() != Some(url) {
                    info!("selected peer {url}");
                }
                self.state.set_connected(url);
            }
            None => {
                if previous.is_some() {
                    warn!("no healthy peer remains");
                }
                self.state.set_disconnected();
            }
        }
        chosen
    }

    fn mark_unhealthy(&self, url: &str) {
        let mut candidates = lock(&self.candidates);
        if let Some(candidate) = candidates.iter_mut().find(|c| c.url == url) {
            *candidate = candidate.clone().probed_unhealthy(Utc::now());
        }
    }

    fn selected(&self) -> Option<String> {
        lock(&self.selected).clone()
    }
}

/// [`EventSource`] backed by the best same-network peer.
pub struct PeerDiscoverySource {
    inner: Arc<PeerInner>,
    processor: Arc<BackgroundProcessor>,
    capabilities: SourceCapabilities,
    sweep: Mutex<Option<PeriodicTask>>,
}

impl std::fmt::Debug for PeerDiscoverySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerDiscoverySource")
            .field("selected", &self.inner.selected())
            .field("candidates", &lock(&self.inner.candidates).len())
            .finish_non_exhaustive()
    }
}

impl PeerDiscoverySource {
    /// Build a source that discovers through `probe` and `browser`.
    #[must_use]
    pub fn new(
        config: PeerConfig,
        probe: Arc<dyn PeerProbe>,
        browser: Arc<dyn AnnouncementBrowser>,
        processor: Arc<BackgroundProcessor>,
    ) -> Self {
        Self {
            inner: Arc::new(PeerInner {
                config,
                probe,
                browser,
                candidates: Mutex::new(Vec::new()),
                selected: Mutex::new(None),
                state: SourceState::default(),
            }),
            processor,
            capabilities: SourceCapabilities {
                supports_push: false,
                supports_peer_discovery: true,
                supports_caching: true,
                supports_filtering: false,
                supports_bounding_box: true,
                max_concurrent_requests: 2,
                update_interval: Duration::from_secs(60),
            },
            sweep: Mutex::new(None),
        }
    }

    /// Run discovery now and merge the results. Returns the candidate count.
    pub async fn discover(&self) -> usize {
        self.inner.discover().await
    }

    /// Re-probe every known candidate, or rerun discovery when no peer is
    /// selected.
    pub async fn sweep_health(&self) {
        self.inner.maintain().await;
    }

    /// Copy of the ranked candidate set.
    #[must_use]
    pub fn candidates(&self) -> Vec<PeerEndpoint> {
        lock(&self.inner.candidates).clone()
    }

    /// Base URL of the selected peer.
    #[must_use]
    pub fn selected(&self) -> Option<String> {
        self.inner.selected()
    }

    async fn fetch_from(&self, url: &str, params: &QueryParams) -> Result<Vec<EventRecord>, SourceError> {
        let body = self
            .inner
            .probe
            .fetch(url, params, self.inner.config.request_timeout)
            .await?;
        let output = self
            .processor
            .process(&body, params)
            .await
            .map_err(|err| SourceError::error(format!("peer {url} returned bad payload: {err}")))?;
        Ok(output.data)
    }

    async fn fetch(&self, params: &QueryParams) -> Result<Vec<EventRecord>, SourceError> {
        self.inner.discover_if_unselected().await;
        let mut last_error = None;
        for attempt in 0..2 {
            let Some(url) = self.inner.selected() else {
                break;
            };
            match self.fetch_from(&url, params).await {
                Ok(events) => return Ok(events),
                Err(err) => {
                    warn!("peer {url} failed on attempt {}: {err}", attempt + 1);
                    self.inner.mark_unhealthy(&url);
                    self.inner.reselect();
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| SourceError::error("no healthy peer available")))
    }
}

#[async_trait]
impl EventSource for PeerDiscoverySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Peer
    }

    fn capabilities(&self) -> &SourceCapabilities {
        &self.capabilities
    }

    async fn init(&self) -> Result<(), SourceError> {
        let period = self.inner.config.health_interval;
        if period.is_zero() {
            return Ok(());
        }
        let mut sweep = lock(&self.sweep);
        if sweep.as_ref().is_none_or(PeriodicTask::is_stopped) {
            let weak: Weak<PeerInner> = Arc::downgrade(&self.inner);
            *sweep = Some(PeriodicTask::spawn("peer-health", period, move || {
                let upgraded = weak.upgrade();
                async move {
                    if let Some(inner) = upgraded {
                        inner.maintain().await;
                    }
                }
            }));
        }
        Ok(())
    }

    async fn refresh(&self, params: &QueryParams) -> Result<Vec<EventRecord>, SourceError> {
        self.inner.state.begin_refresh();
        match self.fetch(params).await {
            Ok(events) => {
                self.inner.state.finish_ok(events.len());
                Ok(events)
            }
            Err(err) => {
                self.inner.state.finish_err(err.clone());
                Err(err)
            }
        }
    }

    async fn destroy(&self) {
        if let Some(task) = lock(&self.sweep).take() {
            task.stop();
        }
        debug!("peer source destroyed");
    }

    async fn health_check(&self) -> bool {
        self.inner.discover_if_unselected().await;
        let healthy = self.inner.selected().is_some();
        self.inner.state.set_healthy(healthy);
        healthy
    }

    fn state(&self) -> SourceSnapshot {
        self.inner.state.snapshot()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
