//! Behavioural tests for source selection and fallback.

use std::{cell::RefCell, sync::Arc, time::Duration};

use firewatch_core::{
    BoundingBox, EventRecord, EventSource, MemoryRevisionStore, NetworkCondition, OriginTag,
    QueryParams, SourceError, SourceKind, StaticNetworkMonitor,
    test_support::{StubSource, events_in},
};
use firewatch_data::{
    BackgroundProcessor, CacheConfig, CacheEngine, CoordinatorConfig, CoordinatorError,
    SourceCoordinator, SourceSet, WorkerConfig,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

struct CoordinatorWorld {
    runtime: tokio::runtime::Runtime,
    monitor: StaticNetworkMonitor,
    remote: Arc<StubSource>,
    push: Arc<StubSource>,
    peer: Arc<StubSource>,
    cache: Arc<CacheEngine>,
    config: RefCell<CoordinatorConfig>,
    coordinator: RefCell<Option<SourceCoordinator>>,
    outcome: RefCell<Option<Result<Vec<EventRecord>, CoordinatorError>>>,
}

#[fixture]
fn world() -> CoordinatorWorld {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime");
    let processor = Arc::new(BackgroundProcessor::new(WorkerConfig::default().disabled()));
    CoordinatorWorld {
        runtime,
        monitor: StaticNetworkMonitor::default(),
        remote: Arc::new(StubSource::new(SourceKind::Remote)),
        push: Arc::new(StubSource::new(SourceKind::Push)),
        peer: Arc::new(StubSource::new(SourceKind::Peer)),
        cache: Arc::new(CacheEngine::new(
            CacheConfig::default()
                .with_cleanup_interval(Duration::ZERO)
                .with_clip_to_query(true),
            Arc::new(MemoryRevisionStore::default()),
            processor,
        )),
        config: RefCell::new(CoordinatorConfig::default().with_health_interval(Duration::ZERO)),
        coordinator: RefCell::new(None),
        outcome: RefCell::new(None),
    }
}

fn bbox(text: &str) -> BoundingBox {
    let values: Vec<f64> = text
        .split(',')
        .map(|part| part.trim().parse().expect("numeric corner"))
        .collect();
    let corners: [f64; 4] = values.try_into().expect("four corners");
    BoundingBox::try_from(corners).expect("valid box")
}

fn kind(name: &str) -> SourceKind {
    name.parse().expect("known source kind")
}

fn with_coordinator<T>(world: &CoordinatorWorld, action: impl FnOnce(&SourceCoordinator) -> T) -> T {
    let mut slot = world.coordinator.borrow_mut();
    let coordinator = slot.get_or_insert_with(|| {
        SourceCoordinator::new(
            world.config.borrow().clone(),
            SourceSet {
                remote: Arc::clone(&world.remote) as Arc<dyn EventSource>,
                push: Arc::clone(&world.push) as Arc<dyn EventSource>,
                peer: Arc::clone(&world.peer) as Arc<dyn EventSource>,
                cache: Arc::clone(&world.cache),
            },
            Arc::new(world.monitor.clone()),
        )
    });
    action(coordinator)
}

#[given("the push channel is disabled")]
fn given_push_disabled(world: &CoordinatorWorld) {
    let config = world.config.borrow().clone().with_push_enabled(false);
    *world.config.borrow_mut() = config;
}

#[given("the network is offline")]
fn given_offline(world: &CoordinatorWorld) {
    world.monitor.set(NetworkCondition::Offline);
}

#[given("the preferred source is \"{name}\"")]
fn given_preferred(world: &CoordinatorWorld, name: String) {
    let config = world.config.borrow().clone().with_preferred(kind(&name));
    *world.config.borrow_mut() = config;
}

#[given("the remote source fails with \"{message}\"")]
fn given_remote_fails(world: &CoordinatorWorld, message: String) {
    world.remote.set_outcome(Err(SourceError::error(message)));
}

#[given("the peer source holds {count} events over {area}")]
fn given_peer_events(world: &CoordinatorWorld, count: u32, area: String) {
    world
        .peer
        .set_outcome(Ok(events_in(count, bbox(&area).to_array())));
}

#[given("the cache already holds {count} events over {area}")]
fn given_cached(world: &CoordinatorWorld, count: u32, area: String) {
    let region = bbox(&area);
    let events = events_in(count, region.to_array());
    world
        .runtime
        .block_on(world.cache.store_data(&events, Some(region), OriginTag::Remote))
        .expect("store");
}

#[when("I refresh {area}")]
fn when_refresh(world: &CoordinatorWorld, area: String) {
    let params = QueryParams::default().with_bbox(bbox(&area));
    let outcome = with_coordinator(world, |coordinator| {
        coordinator.select_optimal_source();
        world.runtime.block_on(coordinator.refresh(&params))
    });
    *world.outcome.borrow_mut() = Some(outcome);
}

#[then("{count} events are returned")]
fn then_returned(world: &CoordinatorWorld, count: usize) {
    let outcome = world.outcome.borrow();
    let events = outcome
        .as_ref()
        .expect("refresh ran")
        .as_ref()
        .expect("refresh succeeded");
    assert_eq!(events.len(), count);
}

#[then("the active source is \"{name}\"")]
fn then_active(world: &CoordinatorWorld, name: String) {
    let active = with_coordinator(world, SourceCoordinator::active_source);
    assert_eq!(active, kind(&name));
}

#[then("the snapshot keeps the original error")]
fn then_error_kept(world: &CoordinatorWorld) {
    let snapshot = with_coordinator(world, SourceCoordinator::snapshot);
    assert!(snapshot.error.is_some());
    assert!(!snapshot.loading);
}

#[then("the snapshot has no error")]
fn then_no_error(world: &CoordinatorWorld) {
    let snapshot = with_coordinator(world, SourceCoordinator::snapshot);
    assert_eq!(snapshot.error, None);
}

#[then("the cache holds a revision over {area}")]
fn then_cached(world: &CoordinatorWorld, area: String) {
    let revision = world
        .cache
        .find_best_revision(Some(&bbox(&area)))
        .expect("revision stored");
    assert_eq!(revision.origin(), OriginTag::Peer);
}

#[scenario(path = "tests/features/coordinator.feature", index = 0)]
fn peer_fallback(world: CoordinatorWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/coordinator.feature", index = 1)]
fn offline_cache(world: CoordinatorWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/coordinator.feature", index = 2)]
fn pinned_preference(world: CoordinatorWorld) {
    let _ = world;
}
