//! Owns the four sources and decides which one answers.
//!
//! Exactly one source is active at a time. Refreshes go to the active
//! source first; on failure the fallback order is walked and the first
//! source returning records is promoted. Upstream results are written to
//! the cache so the cache can answer when everything else is unreachable.
//! State is published as a single [`CoordinatorSnapshot`] over a `watch`
//! channel.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use chrono::{DateTime, Utc};
use firewatch_core::{
    ConnectionStatus, EventRecord, EventSource, NetworkCondition, NetworkMonitor, OriginTag,
    QueryParams, SourceError, SourceKind, SourceSnapshot,
};
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::{cache::CacheEngine, schedule::PeriodicTask, worker::BackgroundProcessor};

mod config;

pub use config::CoordinatorConfig;

/// The fixed table of sources a coordinator chooses between.
#[derive(Clone)]
pub struct SourceSet {
    /// One-shot remote queries.
    pub remote: Arc<dyn EventSource>,
    /// Persistent push channel.
    pub push: Arc<dyn EventSource>,
    /// Same-network peers.
    pub peer: Arc<dyn EventSource>,
    /// Local cache; also the sink for upstream results.
    pub cache: Arc<CacheEngine>,
}

impl std::fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSet").finish_non_exhaustive()
    }
}

impl SourceSet {
    /// The source registered for `kind`.
    #[must_use]
    pub fn get(&self, kind: SourceKind) -> Arc<dyn EventSource> {
        match kind {
            SourceKind::Remote => Arc::clone(&self.remote),
            SourceKind::Push => Arc::clone(&self.push),
            SourceKind::Peer => Arc::clone(&self.peer),
            SourceKind::Cache => Arc::clone(&self.cache) as Arc<dyn EventSource>,
        }
    }

    fn all(&self) -> [Arc<dyn EventSource>; 4] {
        SourceKind::ALL.map(|kind| self.get(kind))
    }

    fn health(&self) -> BTreeMap<SourceKind, SourceHealth> {
        SourceKind::ALL
            .into_iter()
            .map(|kind| (kind, SourceHealth::from(self.get(kind).state())))
            .collect()
    }
}

/// Failure surfaced by [`SourceCoordinator::refresh`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinatorError {
    /// The active source and every fallback failed.
    #[error("all sources failed; first error: {error}")]
    AllSourcesFailed {
        /// Error raised by the source that was active.
        error: SourceError,
    },
    /// A manually selected source failed.
    #[error("{kind} source failed: {error}")]
    Source {
        /// Source that failed.
        kind: SourceKind,
        /// Its error.
        error: SourceError,
    },
}

/// Read-only health of one source, copied from its own state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHealth {
    /// Result of the last health check or critical failure.
    pub healthy: bool,
    /// Connection details, including the consecutive error count.
    pub connection: ConnectionStatus,
    /// Error from the source's last refresh, if any.
    pub error: Option<SourceError>,
}

impl From<SourceSnapshot> for SourceHealth {
    fn from(snapshot: SourceSnapshot) -> Self {
        Self {
            healthy: snapshot.healthy,
            connection: snapshot.connection,
            error: snapshot.error,
        }
    }
}

/// Consistent view of coordinator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    /// Source answering refreshes.
    pub active: SourceKind,
    /// Network condition at the last selection.
    pub network: NetworkCondition,
    /// Whether a refresh is in flight.
    pub loading: bool,
    /// Current error, if any. Kept after a successful fallback.
    pub error: Option<SourceError>,
    /// Records returned by the last successful refresh.
    pub event_count: usize,
    /// Time of the last successful refresh.
    pub last_update: Option<DateTime<Utc>>,
    /// Health of every source as of this snapshot.
    pub sources: BTreeMap<SourceKind, SourceHealth>,
}

struct Status {
    snapshot: CoordinatorSnapshot,
    in_flight: usize,
    last_params: Option<QueryParams>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    sources: SourceSet,
    monitor: Arc<dyn NetworkMonitor>,
    status: Mutex<Status>,
    published: watch::Sender<CoordinatorSnapshot>,
}

impl CoordinatorInner {
    fn update(&self, change: impl FnOnce(&mut Status)) {
        let health = self.sources.health();
        let snapshot = {
            let mut status = lock(&self.status);
            change(&mut status);
            status.snapshot.loading = status.in_flight > 0;
            status.snapshot.sources = health;
            status.snapshot.clone()
        };
        self.published.send_replace(snapshot);
    }

    fn active(&self) -> SourceKind {
        lock(&self.status).snapshot.active
    }

    fn push_allowed(&self) -> bool {
        self.config.push_enabled && self.sources.push.capabilities().supports_push
    }

    fn preference_order(&self, network: NetworkCondition) -> Vec<SourceKind> {
        let mut order = Vec::with_capacity(4);
        if network == NetworkCondition::Online {
            if self.push_allowed() {
                order.push(SourceKind::Push);
            }
            order.push(SourceKind::Remote);
        }
        if network != NetworkCondition::Offline {
            order.push(SourceKind::Peer);
        }
        order.push(SourceKind::Cache);
        order
    }

    fn select(&self) -> SourceKind {
        let network = self.monitor.current();
        let chosen = self.config.preferred.unwrap_or_else(|| {
            self.preference_order(network)
                .into_iter()
                .find(|kind| self.sources.get(*kind).state().healthy)
                .unwrap_or(SourceKind::Cache)
        });
        let previous = self.active();
        if previous != chosen {
            info!("switching active source from {previous} to {chosen} ({network:?})");
        }
        self.update(|status| {
            status.snapshot.active = chosen;
            status.snapshot.network = network;
        });
        chosen
    }

    async fn store(&self, kind: SourceKind, events: &[EventRecord], params: &QueryParams) {
        if !self.config.cache_results || events.is_empty() {
            return;
        }
        let Some(origin) = OriginTag::for_source(kind) else {
            return;
        };
        if let Err(err) = self.sources.cache.store_data(events, params.bbox, origin).await {
            warn!("failed to cache {kind} results: {err}");
        }
    }

    async fn sweep(&self) {
        let results = join_all(self.sources.all().map(|source| async move {
            (source.kind(), source.health_check().await)
        }))
        .await;
        for (kind, healthy) in &results {
            debug!("{kind} source healthy: {healthy}");
        }
        let active = self.active();
        let active_healthy = results
            .iter()
            .find(|(kind, _)| *kind == active)
            .is_some_and(|(_, healthy)| *healthy);
        let network_changed = lock(&self.status).snapshot.network != self.monitor.current();
        if !active_healthy || network_changed {
            self.select();
        } else {
            self.update(|_| {});
        }
    }

    async fn refresh(&self, params: &QueryParams) -> Result<Vec<EventRecord>, CoordinatorError> {
        let active = self.active();
        let first_error = match self.sources.get(active).refresh(params).await {
            Ok(events) => {
                self.store(active, &events, params).await;
                self.succeeded(params, events.len(), None);
                return Ok(events);
            }
            Err(err) => err,
        };
        warn!("{active} source failed: {first_error}");
        if first_error.is_critical() {
            self.select();
        }

        let mut answered = false;
        for kind in self.config.fallback_order.iter().copied() {
            if kind == active || (kind == SourceKind::Push && !self.push_allowed()) {
                continue;
            }
            match self.sources.get(kind).refresh(params).await {
                Ok(events) if !events.is_empty() => {
                    info!("{kind} source answered after {active} failed; promoting it");
                    self.store(kind, &events, params).await;
                    self.update(|status| status.snapshot.active = kind);
                    self.succeeded(params, events.len(), Some(first_error));
                    return Ok(events);
                }
                Ok(_) => {
                    debug!("{kind} fallback returned no records");
                    answered = true;
                }
                Err(err) => debug!("{kind} fallback failed: {err}"),
            }
        }

        if answered {
            self.succeeded(params, 0, Some(first_error));
            return Ok(Vec::new());
        }
        error!("every source failed: {first_error}");
        self.update(|status| status.snapshot.error = Some(first_error.clone()));
        Err(CoordinatorError::AllSourcesFailed { error: first_error })
    }

    fn succeeded(&self, params: &QueryParams, count: usize, error: Option<SourceError>) {
        self.update(|status| {
            status.last_params = Some(*params);
            status.snapshot.event_count = count;
            status.snapshot.last_update = Some(Utc::now());
            status.snapshot.error = error;
        });
    }
}

/// Chooses between the remote, push, peer, and cache sources.
pub struct SourceCoordinator {
    inner: Arc<CoordinatorInner>,
    processor: Option<Arc<BackgroundProcessor>>,
    sweep: Mutex<Option<PeriodicTask>>,
}

impl std::fmt::Debug for SourceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCoordinator")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl SourceCoordinator {
    /// Build a coordinator over `sources`. The cache is active until
    /// [`Self::init`] or [`Self::select_optimal_source`] runs.
    #[must_use]
    pub fn new(
        config: CoordinatorConfig,
        sources: SourceSet,
        monitor: Arc<dyn NetworkMonitor>,
    ) -> Self {
        let snapshot = CoordinatorSnapshot {
            active: SourceKind::Cache,
            network: monitor.current(),
            loading: false,
            error: None,
            event_count: 0,
            last_update: None,
            sources: sources.health(),
        };
        let (published, _) = watch::channel(snapshot.clone());
        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                sources,
                monitor,
                status: Mutex::new(Status {
                    snapshot,
                    in_flight: 0,
                    last_params: None,
                }),
                published,
            }),
            processor: None,
            sweep: Mutex::new(None),
        }
    }

    /// Shut `processor` down together with the sources.
    #[must_use]
    pub fn with_processor(mut self, processor: Arc<BackgroundProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// The registered sources.
    #[must_use]
    pub fn sources(&self) -> &SourceSet {
        &self.inner.sources
    }

    /// Initialise every source, select the active one, and start the
    /// health sweep.
    pub async fn init(&self) {
        if let Some(processor) = &self.processor
            && !processor.init().await
        {
            warn!("background worker unavailable; processing inline");
        }
        let results = join_all(self.inner.sources.all().map(|source| async move {
            (source.kind(), source.init().await)
        }))
        .await;
        for (kind, result) in results {
            if let Err(err) = result {
                warn!("{kind} source failed to initialise: {err}");
            }
        }
        self.select_optimal_source();

        let period = self.inner.config.health_interval;
        if period.is_zero() {
            return;
        }
        let mut sweep = lock(&self.sweep);
        if sweep.as_ref().is_none_or(PeriodicTask::is_stopped) {
            let weak: Weak<CoordinatorInner> = Arc::downgrade(&self.inner);
            *sweep = Some(PeriodicTask::spawn("source-health", period, move || {
                let upgraded = weak.upgrade();
                async move {
                    if let Some(inner) = upgraded {
                        inner.sweep().await;
                    }
                }
            }));
        }
    }

    /// Pick the active source from the network condition, capabilities,
    /// and health, unless a preference is pinned.
    pub fn select_optimal_source(&self) -> SourceKind {
        self.inner.select()
    }

    /// Refresh through the active source, falling back in order on failure.
    ///
    /// A fallback answer promotes that source and keeps the original error
    /// in the snapshot. Results from upstream sources are cached.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::AllSourcesFailed`] when no source
    /// answered.
    pub async fn refresh(&self, params: &QueryParams) -> Result<Vec<EventRecord>, CoordinatorError> {
        self.inner
            .update(|status| status.in_flight = status.in_flight.saturating_add(1));
        let result = self.inner.refresh(params).await;
        self.inner
            .update(|status| status.in_flight = status.in_flight.saturating_sub(1));
        result
    }

    /// Make `kind` active and replay the last successful query against it.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Source`] when the replay fails.
    pub async fn switch_source(&self, kind: SourceKind) -> Result<Vec<EventRecord>, CoordinatorError> {
        info!("manually switching to {kind} source");
        self.inner.update(|status| status.snapshot.active = kind);
        let Some(params) = lock(&self.inner.status).last_params else {
            return Ok(Vec::new());
        };
        self.inner
            .update(|status| status.in_flight = status.in_flight.saturating_add(1));
        let result = self.inner.sources.get(kind).refresh(&params).await;
        self.inner
            .update(|status| status.in_flight = status.in_flight.saturating_sub(1));
        match result {
            Ok(events) => {
                self.inner.store(kind, &events, &params).await;
                self.inner.succeeded(&params, events.len(), None);
                Ok(events)
            }
            Err(error) => {
                self.inner
                    .update(|status| status.snapshot.error = Some(error.clone()));
                Err(CoordinatorError::Source { kind, error })
            }
        }
    }

    /// Poll every source's health now.
    pub async fn sweep_health(&self) {
        self.inner.sweep().await;
    }

    /// Source answering refreshes.
    #[must_use]
    pub fn active_source(&self) -> SourceKind {
        self.inner.active()
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        lock(&self.inner.status).snapshot.clone()
    }

    /// Receive every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorSnapshot> {
        self.inner.published.subscribe()
    }

    /// Stop the sweep and destroy every source and the worker.
    pub async fn destroy(&self) {
        if let Some(task) = lock(&self.sweep).take() {
            task.stop();
        }
        join_all(self.inner.sources.all().map(|source| async move {
            source.destroy().await;
        }))
        .await;
        if let Some(processor) = &self.processor {
            processor.destroy();
        }
        info!("source coordinator destroyed");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::CacheConfig, worker::WorkerConfig};
    use firewatch_core::{
        BoundingBox, MemoryRevisionStore, SourceCapabilities, StaticNetworkMonitor,
        test_support::{StubSource, events_in, plain_capabilities},
    };
    use rstest::{fixture, rstest};
    use std::time::Duration;

    #[fixture]
    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build runtime")
    }

    struct Fixture {
        remote: Arc<StubSource>,
        push: Arc<StubSource>,
        peer: Arc<StubSource>,
        cache: Arc<CacheEngine>,
        monitor: StaticNetworkMonitor,
    }

    impl Fixture {
        fn new() -> Self {
            let push_capabilities = SourceCapabilities {
                supports_push: true,
                ..plain_capabilities()
            };
            Self {
                remote: Arc::new(StubSource::new(SourceKind::Remote)),
                push: Arc::new(
                    StubSource::new(SourceKind::Push).with_capabilities(push_capabilities),
                ),
                peer: Arc::new(StubSource::new(SourceKind::Peer)),
                cache: Arc::new(CacheEngine::new(
                    CacheConfig::default().with_cleanup_interval(Duration::ZERO),
                    Arc::new(MemoryRevisionStore::default()),
                    Arc::new(BackgroundProcessor::new(WorkerConfig::default().disabled())),
                )),
                monitor: StaticNetworkMonitor::default(),
            }
        }

        fn coordinator(&self, config: CoordinatorConfig) -> SourceCoordinator {
            SourceCoordinator::new(
                config.with_health_interval(Duration::ZERO),
                SourceSet {
                    remote: Arc::clone(&self.remote) as Arc<dyn EventSource>,
                    push: Arc::clone(&self.push) as Arc<dyn EventSource>,
                    peer: Arc::clone(&self.peer) as Arc<dyn EventSource>,
                    cache: Arc::clone(&self.cache),
                },
                Arc::new(self.monitor.clone()),
            )
        }
    }

    #[fixture]
    fn fixture() -> Fixture {
        Fixture::new()
    }

    #[rstest]
    #[case(NetworkCondition::Online, true, SourceKind::Push)]
    #[case(NetworkCondition::Online, false, SourceKind::Remote)]
    #[case(NetworkCondition::LocalOnly, true, SourceKind::Peer)]
    #[case(NetworkCondition::Offline, true, SourceKind::Cache)]
    fn selection_follows_network(
        fixture: Fixture,
        #[case] network: NetworkCondition,
        #[case] push_enabled: bool,
        #[case] expected: SourceKind,
    ) {
        fixture.monitor.set(network);
        let coordinator =
            fixture.coordinator(CoordinatorConfig::default().with_push_enabled(push_enabled));
        assert_eq!(coordinator.select_optimal_source(), expected);
        assert_eq!(coordinator.snapshot().network, network);
    }

    #[rstest]
    fn pinned_preference_wins(fixture: Fixture) {
        let coordinator =
            fixture.coordinator(CoordinatorConfig::default().with_preferred(SourceKind::Peer));
        assert_eq!(coordinator.select_optimal_source(), SourceKind::Peer);
    }

    #[rstest]
    fn unhealthy_sources_are_skipped(fixture: Fixture, runtime: tokio::runtime::Runtime) {
        fixture.push.set_healthy(false);
        runtime.block_on(fixture.push.health_check());
        let coordinator = fixture.coordinator(CoordinatorConfig::default());
        assert_eq!(coordinator.select_optimal_source(), SourceKind::Remote);
    }

    #[rstest]
    fn failure_falls_back_and_promotes(fixture: Fixture, runtime: tokio::runtime::Runtime) {
        let bbox = BoundingBox::new(90.0, 15.0, 100.0, 20.0).expect("bbox");
        fixture
            .remote
            .set_outcome(Err(SourceError::error("HTTP 503")));
        fixture
            .peer
            .set_outcome(Ok(events_in(3, [90.0, 15.0, 100.0, 20.0])));
        let coordinator = fixture.coordinator(
            CoordinatorConfig::default()
                .with_push_enabled(false)
                .with_preferred(SourceKind::Remote),
        );
        coordinator.select_optimal_source();

        let events = runtime
            .block_on(coordinator.refresh(&QueryParams::default().with_bbox(bbox)))
            .expect("fallback");

        assert_eq!(events.len(), 3);
        assert_eq!(coordinator.active_source(), SourceKind::Peer);
        assert_eq!(fixture.push.refresh_count(), 0);
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.event_count, 3);
        assert!(snapshot.error.is_some());
        assert!(!snapshot.loading);
        assert!(coordinator.sources().cache.find_best_revision(Some(&bbox)).is_some());
    }

    #[rstest]
    fn every_failure_is_reported(fixture: Fixture, runtime: tokio::runtime::Runtime) {
        for stub in [&fixture.remote, &fixture.push, &fixture.peer] {
            stub.set_outcome(Err(SourceError::warning("unreachable")));
        }
        let coordinator = fixture.coordinator(CoordinatorConfig::default());
        coordinator.select_optimal_source();

        let outcome = runtime.block_on(coordinator.refresh(&QueryParams::default()));

        assert!(matches!(outcome, Ok(ref events) if events.is_empty()));
        assert!(coordinator.snapshot().error.is_some());
    }

    #[rstest]
    fn all_sources_failed_when_cache_is_excluded(
        fixture: Fixture,
        runtime: tokio::runtime::Runtime,
    ) {
        for stub in [&fixture.remote, &fixture.push, &fixture.peer] {
            stub.set_outcome(Err(SourceError::warning("unreachable")));
        }
        let coordinator = fixture.coordinator(CoordinatorConfig::default().with_fallback_order(
            vec![SourceKind::Remote, SourceKind::Push, SourceKind::Peer],
        ));
        coordinator.select_optimal_source();

        let err = runtime
            .block_on(coordinator.refresh(&QueryParams::default()))
            .expect_err("nothing answers");

        assert!(matches!(err, CoordinatorError::AllSourcesFailed { .. }));
    }

    #[rstest]
    fn switch_replays_last_params(fixture: Fixture, runtime: tokio::runtime::Runtime) {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).expect("bbox");
        fixture
            .remote
            .set_outcome(Ok(events_in(2, [0.0, 0.0, 1.0, 1.0])));
        let coordinator =
            fixture.coordinator(CoordinatorConfig::default().with_push_enabled(false));
        coordinator.select_optimal_source();
        let params = QueryParams::default().with_bbox(bbox);
        runtime
            .block_on(coordinator.refresh(&params))
            .expect("refresh");

        runtime
            .block_on(coordinator.switch_source(SourceKind::Peer))
            .expect("switch");

        assert_eq!(coordinator.active_source(), SourceKind::Peer);
        assert_eq!(fixture.peer.last_params(), Some(params));
    }

    #[rstest]
    fn subscribers_see_promotions(fixture: Fixture, runtime: tokio::runtime::Runtime) {
        fixture.remote.set_outcome(Err(SourceError::error("down")));
        fixture
            .peer
            .set_outcome(Ok(events_in(1, [0.0, 0.0, 1.0, 1.0])));
        let coordinator =
            fixture.coordinator(CoordinatorConfig::default().with_push_enabled(false));
        coordinator.select_optimal_source();
        let receiver = coordinator.subscribe();

        runtime
            .block_on(coordinator.refresh(&QueryParams::default()))
            .expect("refresh");

        assert_eq!(receiver.borrow().active, SourceKind::Peer);
    }

    #[rstest]
    fn snapshot_reports_per_source_health(fixture: Fixture, runtime: tokio::runtime::Runtime) {
        fixture
            .remote
            .set_outcome(Err(SourceError::critical("certificate rejected")));
        fixture
            .peer
            .set_outcome(Ok(events_in(2, [0.0, 0.0, 1.0, 1.0])));
        let coordinator =
            fixture.coordinator(CoordinatorConfig::default().with_push_enabled(false));
        assert_eq!(coordinator.select_optimal_source(), SourceKind::Remote);
        let initial = coordinator.snapshot();
        assert_eq!(initial.sources.len(), SourceKind::ALL.len());
        assert!(initial.sources.values().all(|health| health.healthy));

        runtime
            .block_on(coordinator.refresh(&QueryParams::default()))
            .expect("fallback");

        let snapshot = coordinator.snapshot();
        assert!(snapshot.error.is_some());
        let remote = snapshot
            .sources
            .get(&SourceKind::Remote)
            .expect("remote health");
        assert!(!remote.healthy);
        assert_eq!(remote.connection.consecutive_errors, 1);
        assert!(remote.error.as_ref().is_some_and(SourceError::is_critical));
        let peer = snapshot.sources.get(&SourceKind::Peer).expect("peer health");
        assert!(peer.healthy);
        assert_eq!(peer.connection.consecutive_errors, 0);
        assert_eq!(peer.error, None);
    }

    #[rstest]
    fn health_sweep_refreshes_source_health(fixture: Fixture, runtime: tokio::runtime::Runtime) {
        let coordinator =
            fixture.coordinator(CoordinatorConfig::default().with_push_enabled(false));
        coordinator.select_optimal_source();
        let receiver = coordinator.subscribe();
        fixture.peer.set_healthy(false);

        runtime.block_on(coordinator.sweep_health());

        let published = receiver.borrow().clone();
        assert_eq!(published.active, SourceKind::Remote);
        let peer = published
            .sources
            .get(&SourceKind::Peer)
            .expect("peer health");
        assert!(!peer.healthy);
    }

    #[rstest]
    fn destroy_cascades(fixture: Fixture, runtime: tokio::runtime::Runtime) {
        let coordinator = fixture.coordinator(CoordinatorConfig::default());
        runtime.block_on(coordinator.destroy());
        assert_eq!(fixture.remote.destroy_count(), 1);
        assert_eq!(fixture.push.destroy_count(), 1);
        assert_eq!(fixture.peer.destroy_count(), 1);
    }
}
