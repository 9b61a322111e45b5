//! Behavioural tests for the two-tier cache engine.

use std::{cell::RefCell, sync::Arc, time::Duration};

use firewatch_core::{
    BoundingBox, CacheRevision, EventSource, MemoryRevisionStore, OriginTag, QueryParams,
    RevisionStore, SqliteRevisionStore, test_support::events_in,
};
use firewatch_data::{BackgroundProcessor, CacheConfig, CacheEngine, WorkerConfig};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

struct CacheWorld {
    runtime: tokio::runtime::Runtime,
    config: RefCell<CacheConfig>,
    directory: RefCell<Option<TempDir>>,
    engine: RefCell<Option<CacheEngine>>,
    stored: RefCell<Option<CacheRevision>>,
}

#[fixture]
fn world() -> CacheWorld {
    CacheWorld {
        runtime: tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build runtime"),
        config: RefCell::new(CacheConfig::default().with_cleanup_interval(Duration::ZERO)),
        directory: RefCell::new(None),
        engine: RefCell::new(None),
        stored: RefCell::new(None),
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

fn open_store(world: &CacheWorld) -> Arc<dyn RevisionStore> {
    match world.directory.borrow().as_ref() {
        Some(dir) => Arc::new(
            SqliteRevisionStore::open(dir.path().join("cache.sqlite")).expect("open sqlite"),
        ),
        None => Arc::new(MemoryRevisionStore::default()),
    }
}

fn start_engine(world: &CacheWorld) {
    let engine = CacheEngine::new(
        world.config.borrow().clone(),
        open_store(world),
        Arc::new(BackgroundProcessor::new(WorkerConfig::default().disabled())),
    );
    world.runtime.block_on(engine.init()).expect("init");
    *world.engine.borrow_mut() = Some(engine);
}

fn with_engine<T>(world: &CacheWorld, action: impl FnOnce(&CacheEngine) -> T) -> T {
    if world.engine.borrow().is_none() {
        start_engine(world);
    }
    let engine = world.engine.borrow();
    action(engine.as_ref().expect("engine started"))
}

#[given("a cache with a compression threshold of {bytes} bytes")]
fn given_threshold(world: &CacheWorld, bytes: usize) {
    let config = world
        .config
        .borrow()
        .clone()
        .with_compression_threshold(bytes);
    *world.config.borrow_mut() = config;
}

#[given("a cache backed by a SQLite file")]
fn given_sqlite(world: &CacheWorld) {
    *world.directory.borrow_mut() = Some(tempfile::tempdir().expect("tempdir"));
}

#[when("I store {count} events over {area}")]
fn when_store(world: &CacheWorld, count: u32, area: String) {
    let region = bbox(&area);
    let events = events_in(count, region.to_array());
    let revision = with_engine(world, |engine| {
        world
            .runtime
            .block_on(engine.store_data(&events, Some(region), OriginTag::Remote))
            .expect("store")
    });
    *world.stored.borrow_mut() = Some(revision);
}

#[when("the cache restarts")]
fn when_restart(world: &CacheWorld) {
    if let Some(engine) = world.engine.borrow_mut().take() {
        world.runtime.block_on(engine.destroy());
    }
    start_engine(world);
}

#[then("the stored revision is compressed")]
fn then_compressed(world: &CacheWorld) {
    let stored = world.stored.borrow();
    assert!(stored.as_ref().expect("stored").compressed());
}

#[then("a refresh over {area} returns {count} events")]
fn then_refresh(world: &CacheWorld, area: String, count: usize) {
    let params = QueryParams::default().with_bbox(bbox(&area));
    let events = with_engine(world, |engine| {
        world.runtime.block_on(engine.refresh(&params)).expect("refresh")
    });
    assert_eq!(events.len(), count);
}

#[then("the cache reports {count} persisted revision")]
fn then_persisted(world: &CacheWorld, count: u64) {
    let stats = with_engine(world, |engine| world.runtime.block_on(engine.cache_stats()));
    let persistent = stats.persistent.expect("store metadata");
    assert_eq!(persistent.revision_count, count);
    assert_eq!(u64::try_from(stats.revisions).expect("count fits"), count);
}

#[then("the cache reports {count} miss")]
fn then_misses(world: &CacheWorld, count: u64) {
    let stats = with_engine(world, |engine| world.runtime.block_on(engine.cache_stats()));
    assert_eq!(stats.misses, count);
}

#[scenario(path = "tests/features/cache.feature", index = 0)]
fn compressed_round_trip(world: CacheWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/cache.feature", index = 1)]
fn warm_start(world: CacheWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/cache.feature", index = 2)]
fn cold_miss(world: CacheWorld) {
    let _ = world;
}
