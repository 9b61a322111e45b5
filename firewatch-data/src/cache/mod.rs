//! Two-tier cache of upstream result sets.
//!
//! Every stored result set becomes an immutable [`CacheRevision`]: its
//! payload is committed to the persistent [`RevisionStore`] together with
//! the revision row, kept in a bounded in-memory tier, and indexed by
//! bounding box. Lookups pick the newest non-expired revision intersecting
//! the requested box.
//!
//! Store calls block, so they run on Tokio's blocking pool. A persistent
//! failure is reported as an `error` on the engine's state and leaves the
//! memory tier and index updated.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use firewatch_core::{
    BoundingBox, CacheRevision, EventRecord, EventSource, OriginTag, QueryParams, RevisionId,
    RevisionIndex, RevisionParts, RevisionStore, SCHEMA_VERSION, SourceCapabilities, SourceError,
    SourceKind, SourceSnapshot, SourceState, StoreMetadata,
};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::{schedule::PeriodicTask, worker::BackgroundProcessor};

mod codec;
mod error;
mod memory;

pub use error::CacheError;

use memory::{CachedPayload, MemoryTier};

/// Configuration for [`CacheEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory tier entry cap.
    pub max_memory_entries: usize,
    /// Memory tier byte cap.
    pub max_memory_bytes: usize,
    /// Age after which memory entries are purged.
    pub max_age: Duration,
    /// Lifetime of a revision.
    pub ttl: Duration,
    /// Payloads larger than this many bytes are compressed.
    pub compression_threshold: usize,
    /// Persistent byte cap; the oldest revisions go first.
    pub max_persistent_bytes: u64,
    /// Period of the expiry sweep; zero disables it.
    pub cleanup_interval: Duration,
    /// Whether cached results are clipped to the requested box.
    pub clip_to_query: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_entries: 64,
            max_memory_bytes: 32 * 1024 * 1024,
            max_age: Duration::from_secs(60 * 60),
            ttl: Duration::from_secs(24 * 60 * 60),
            compression_threshold: 16 * 1024,
            max_persistent_bytes: 256 * 1024 * 1024,
            cleanup_interval: Duration::from_secs(5 * 60),
            clip_to_query: false,
        }
    }
}

impl CacheConfig {
    /// Set the compression threshold.
    #[must_use]
    pub const fn with_compression_threshold(mut self, bytes: usize) -> Self {
        self.compression_threshold = bytes;
        self
    }

    /// Set the memory tier caps.
    #[must_use]
    pub const fn with_memory_limits(mut self, entries: usize, bytes: usize) -> Self {
        self.max_memory_entries = entries;
        self.max_memory_bytes = bytes;
        self
    }

    /// Set the revision lifetime.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the persistent byte cap.
    #[must_use]
    pub const fn with_max_persistent_bytes(mut self, bytes: u64) -> Self {
        self.max_persistent_bytes = bytes;
        self
    }

    /// Set the sweep period.
    #[must_use]
    pub const fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Clip cached results to the requested box.
    #[must_use]
    pub const fn with_clip_to_query(mut self, clip: bool) -> Self {
        self.clip_to_query = clip;
        self
    }
}

/// Counters and sizes reported by [`CacheEngine::cache_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from a revision.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Revisions currently indexed.
    pub revisions: usize,
    /// Entries held by the memory tier.
    pub memory_entries: usize,
    /// Bytes held by the memory tier.
    pub memory_bytes: usize,
    /// Persistent aggregates, when the store could be read.
    pub persistent: Option<StoreMetadata>,
}

#[derive(Debug, Default)]
struct Catalog {
    index: RevisionIndex,
    revisions: HashMap<RevisionId, CacheRevision>,
}

impl Catalog {
    fn insert(&mut self, revision: CacheRevision) {
        self.index.insert(&revision);
        self.revisions.insert(revision.id().clone(), revision);
    }

    fn remove(&mut self, id: &RevisionId) -> bool {
        self.index.remove(id);
        self.revisions.remove(id).is_some()
    }

    fn clear(&mut self) {
        self.index.clear();
        self.revisions.clear();
    }
}

struct CacheInner {
    config: CacheConfig,
    store: Arc<dyn RevisionStore>,
    processor: Arc<BackgroundProcessor>,
    memory: Mutex<MemoryTier>,
    catalog: Mutex<Catalog>,
    state: SourceState,
    hits: AtomicU64,
    misses: AtomicU64,
    sequence: AtomicU64,
}

impl CacheInner {
    fn next_id(&self, origin: OriginTag, now: DateTime<Utc>) -> RevisionId {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        RevisionId::new(format!("{origin}-{}-{sequence}", now.timestamp_millis()))
    }

    fn forget(&self, id: &RevisionId) {
        lock(&self.catalog).remove(id);
        lock(&self.memory).remove(id);
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RevisionStore) -> Result<T, CacheError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || work(store.as_ref())).await?
    }

    /// Delete expired revisions from every tier and purge stale memory
    /// entries. Returns the number of revisions removed.
    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let expired = lock(&self.catalog).index.expired(now);
        for id in &expired {
            self.forget(id);
        }
        let purged = lock(&self.memory).purge(now, to_delta(self.config.max_age));
        if !purged.is_empty() {
            debug!("purged {} aged memory entries", purged.len());
        }
        let count = expired.len();
        self.blocking(move |store| {
            for id in &expired {
                store.delete_revision(id)?;
            }
            store.record_cleanup(now)?;
            Ok(())
        })
        .await?;
        if count > 0 {
            info!("expired {count} cache revisions");
        }
        Ok(count)
    }

    /// Delete the oldest revisions until the store is within its byte cap.
    async fn enforce_capacity(&self) -> Result<Vec<RevisionId>, CacheError> {
        let cap = self.config.max_persistent_bytes;
        let evicted = self
            .blocking(move |store| {
                let mut total = store.metadata()?.total_size;
                let mut evicted = Vec::new();
                if total <= cap {
                    return Ok(evicted);
                }
                for revision in store.list_revisions()? {
                    if total <= cap {
                        break;
                    }
                    if store.delete_revision(revision.id())? {
                        total = total.saturating_sub(revision.size_bytes());
                        evicted.push(revision.id().clone());
                    }
                }
                Ok(evicted)
            })
            .await?;
        for id in &evicted {
            self.forget(id);
        }
        if !evicted.is_empty() {
            info!("evicted {} revisions over the persistent cap", evicted.len());
        }
        Ok(evicted)
    }

    async fn load(&self, revision: &CacheRevision) -> Result<Option<CachedPayload>, CacheError> {
        let id = revision.id().clone();
        let cached = lock(&self.memory).get(&id);
        if cached.is_some() {
            return Ok(cached);
        }
        let lookup = id.clone();
        let Some(bytes) = self
            .blocking(move |store| Ok(store.load_payload(&lookup)?))
            .await?
        else {
            return Ok(None);
        };
        let payload = CachedPayload {
            bytes: bytes.into(),
            compressed: revision.compressed(),
        };
        lock(&self.memory).insert(
            id,
            Arc::clone(&payload.bytes),
            payload.compressed,
            Utc::now(),
        );
        Ok(Some(payload))
    }

    async fn lookup(&self, params: &QueryParams) -> Result<Vec<EventRecord>, SourceError> {
        let now = Utc::now();
        let found = {
            let catalog = lock(&self.catalog);
            let best = match params.bbox.as_ref() {
                Some(bbox) => catalog.index.find_best(bbox, now),
                None => catalog.index.find_newest(now),
            };
            best.and_then(|id| catalog.revisions.get(&id).cloned())
        };
        let Some(revision) = found else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(Vec::new());
        };
        let Some(payload) = self.load(&revision).await? else {
            warn!("revision {} has no payload; dropping it", revision.id());
            self.forget(revision.id());
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(Vec::new());
        };
        let text = tokio::task::spawn_blocking(move || {
            codec::decode(&payload.bytes, payload.compressed)
        })
        .await
        .map_err(CacheError::from)??;
        let scope = if self.config.clip_to_query {
            *params
        } else {
            QueryParams {
                bbox: None,
                time_range: params.time_range,
            }
        };
        let output = self.processor.process(&text, &scope).await.map_err(|err| {
            SourceError::error(format!("cached revision {} is unreadable: {err}", revision.id()))
        })?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(
            "cache hit on {} returned {} records",
            revision.id(),
            output.data.len()
        );
        Ok(output.data)
    }
}

/// [`EventSource`] answering from previously stored result sets.
pub struct CacheEngine {
    inner: Arc<CacheInner>,
    capabilities: SourceCapabilities,
    sweep: Mutex<Option<PeriodicTask>>,
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("config", &self.inner.config)
            .field("revisions", &lock(&self.inner.catalog).revisions.len())
            .finish_non_exhaustive()
    }
}

impl CacheEngine {
    /// Build an engine writing through `store`.
    #[must_use]
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn RevisionStore>,
        processor: Arc<BackgroundProcessor>,
    ) -> Self {
        let memory = MemoryTier::new(config.max_memory_entries, config.max_memory_bytes);
        Self {
            inner: Arc::new(CacheInner {
                config,
                store,
                processor,
                memory: Mutex::new(memory),
                catalog: Mutex::new(Catalog::default()),
                state: SourceState::default(),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                sequence: AtomicU64::new(0),
            }),
            capabilities: SourceCapabilities {
                supports_push: false,
                supports_peer_discovery: false,
                supports_caching: true,
                supports_filtering: true,
                supports_bounding_box: true,
                max_concurrent_requests: 8,
                update_interval: Duration::ZERO,
            },
            sweep: Mutex::new(None),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Store `events` as a new revision.
    ///
    /// When `bbox` is absent the covering box of `events` is used. The
    /// payload is compressed above the configured threshold. A persistent
    /// write failure is reported on the engine's state; the revision is
    /// still served from memory.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::EmptyPayload`] when `events` is empty and no
    /// box was given, or an encoding error.
    pub async fn store_data(
        &self,
        events: &[EventRecord],
        bbox: Option<BoundingBox>,
        origin: OriginTag,
    ) -> Result<CacheRevision, CacheError> {
        let coverage = bbox
            .or_else(|| BoundingBox::covering(events))
            .ok_or(CacheError::EmptyPayload)?;
        let threshold = self.inner.config.compression_threshold;
        let owned = events.to_vec();
        let encoded =
            tokio::task::spawn_blocking(move || codec::encode(&owned, threshold)).await??;

        let now = Utc::now();
        let revision = CacheRevision::new(RevisionParts {
            id: self.inner.next_id(origin, now),
            bbox: coverage,
            created_at: now,
            expires_at: now
                .checked_add_signed(to_delta(self.inner.config.ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            size_bytes: u64::try_from(encoded.bytes.len()).unwrap_or(u64::MAX),
            compressed: encoded.compressed,
            schema_version: SCHEMA_VERSION,
            origin,
            record_count: u64::try_from(events.len()).unwrap_or(u64::MAX),
        });
        let bytes: Arc<[u8]> = encoded.bytes.into();

        let persisted = {
            let row = revision.clone();
            let payload = Arc::clone(&bytes);
            self.inner
                .blocking(move |store| Ok(store.put_revision(&row, &payload)?))
                .await
        };
        if let Err(err) = persisted {
            error!("failed to persist revision {}: {err}", revision.id());
            self.inner.state.report_error(err.into());
        }

        let evicted = lock(&self.inner.memory).insert(
            revision.id().clone(),
            bytes,
            revision.compressed(),
            now,
        );
        if !evicted.is_empty() {
            debug!("memory tier evicted {} payloads", evicted.len());
        }
        lock(&self.inner.catalog).insert(revision.clone());
        debug!(
            "stored revision {} with {} records ({} bytes, compressed: {})",
            revision.id(),
            revision.record_count(),
            revision.size_bytes(),
            revision.compressed()
        );

        if let Err(err) = self.inner.enforce_capacity().await {
            error!("failed to enforce cache capacity: {err}");
            self.inner.state.report_error(err.into());
        }
        Ok(revision)
    }

    /// Best non-expired revision for `bbox`, or the newest when absent.
    #[must_use]
    pub fn find_best_revision(&self, bbox: Option<&BoundingBox>) -> Option<CacheRevision> {
        let now = Utc::now();
        let catalog = lock(&self.inner.catalog);
        let best = match bbox {
            Some(area) => catalog.index.find_best(area, now),
            None => catalog.index.find_newest(now),
        };
        best.and_then(|id| catalog.revisions.get(&id).cloned())
    }

    /// Remove revisions expired at `now` from every tier.
    ///
    /// # Errors
    ///
    /// Returns a store error when the persistent deletes fail.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        self.inner.sweep(now).await
    }

    /// Empty both tiers.
    ///
    /// # Errors
    ///
    /// Returns a store error when the persistent tier cannot be cleared.
    pub async fn clear(&self) -> Result<(), CacheError> {
        lock(&self.inner.catalog).clear();
        lock(&self.inner.memory).clear();
        self.inner
            .blocking(|store| Ok(store.clear()?))
            .await?;
        info!("cache cleared");
        Ok(())
    }

    /// Current counters and sizes.
    pub async fn cache_stats(&self) -> CacheStats {
        let persistent = match self.inner.blocking(|store| Ok(store.metadata()?)).await {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                warn!("cache metadata unavailable: {err}");
                None
            }
        };
        let (memory_entries, memory_bytes) = {
            let memory = lock(&self.inner.memory);
            (memory.len(), memory.total_bytes())
        };
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            revisions: lock(&self.inner.catalog).revisions.len(),
            memory_entries,
            memory_bytes,
            persistent,
        }
    }

    /// Load stored revision metadata into the index.
    async fn warm_start(&self) -> Result<usize, CacheError> {
        let revisions = self
            .inner
            .blocking(|store| Ok(store.list_revisions()?))
            .await?;
        let count = revisions.len();
        let mut catalog = lock(&self.inner.catalog);
        for revision in revisions {
            catalog.insert(revision);
        }
        Ok(count)
    }
}

#[async_trait]
impl EventSource for CacheEngine {
    fn kind(&self) -> SourceKind {
        SourceKind::Cache
    }

    fn capabilities(&self) -> &SourceCapabilities {
        &self.capabilities
    }

    async fn init(&self) -> Result<(), SourceError> {
        let count = self.warm_start().await?;
        info!("cache warm start indexed {count} revisions");
        let period = self.inner.config.cleanup_interval;
        if !period.is_zero() {
            let mut sweep = lock(&self.sweep);
            if sweep.as_ref().is_none_or(PeriodicTask::is_stopped) {
                let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
                *sweep = Some(PeriodicTask::spawn("cache-sweep", period, move || {
                    let upgraded = weak.upgrade();
                    async move {
                        if let Some(inner) = upgraded
                            && let Err(err) = inner.sweep(Utc::now()).await
                        {
                            error!("cache sweep failed: {err}");
                            inner.state.report_error(err.into());
                        }
                    }
                }));
            }
        }
        Ok(())
    }

    async fn refresh(&self, params: &QueryParams) -> Result<Vec<EventRecord>, SourceError> {
        self.inner.state.begin_refresh();
        match self.inner.lookup(params).await {
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
    }

    async fn health_check(&self) -> bool {
        let healthy = self
            .inner
            .blocking(|store| Ok(store.metadata()?))
            .await
            .is_ok();
        self.inner.state.set_healthy(healthy);
        healthy
    }

    fn state(&self) -> SourceSnapshot {
        self.inner.state.snapshot()
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerConfig;
    use firewatch_core::{MemoryRevisionStore, RevisionStoreError, test_support::events_in};
    use rstest::{fixture, rstest};

    #[fixture]
    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build runtime")
    }

    fn engine_with(config: CacheConfig, store: Arc<dyn RevisionStore>) -> CacheEngine {
        CacheEngine::new(
            config.with_cleanup_interval(Duration::ZERO),
            store,
            Arc::new(BackgroundProcessor::new(WorkerConfig::default().disabled())),
        )
    }

    fn engine(config: CacheConfig) -> CacheEngine {
        engine_with(config, Arc::new(MemoryRevisionStore::default()))
    }

    fn area(corners: [f64; 4]) -> QueryParams {
        QueryParams::default().with_bbox(BoundingBox::try_from(corners).expect("bbox"))
    }

    #[derive(Debug, Default)]
    struct BrokenStore;

    impl RevisionStore for BrokenStore {
        fn put_revision(&self, revision: &CacheRevision, _: &[u8]) -> Result<(), RevisionStoreError> {
            Err(RevisionStoreError::InvalidRow {
                id: revision.id().to_string(),
                reason: "disk full".to_owned(),
            })
        }
        fn load_payload(&self, _: &RevisionId) -> Result<Option<Vec<u8>>, RevisionStoreError> {
            Ok(None)
        }
        fn delete_revision(&self, _: &RevisionId) -> Result<bool, RevisionStoreError> {
            Ok(false)
        }
        fn list_revisions(&self) -> Result<Vec<CacheRevision>, RevisionStoreError> {
            Ok(Vec::new())
        }
        fn metadata(&self) -> Result<StoreMetadata, RevisionStoreError> {
            Ok(StoreMetadata::default())
        }
        fn record_cleanup(&self, _: DateTime<Utc>) -> Result<(), RevisionStoreError> {
            Ok(())
        }
        fn clear(&self) -> Result<(), RevisionStoreError> {
            Ok(())
        }
    }

    #[rstest]
    fn large_payloads_are_compressed_and_returned_whole(runtime: tokio::runtime::Runtime) {
        let cache = engine(CacheConfig::default().with_compression_threshold(1024));
        let events = events_in(120, [0.0, 0.0, 10.0, 10.0]);
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0).expect("bbox");

        runtime.block_on(async {
            let revision = cache
                .store_data(&events, Some(bbox), OriginTag::Remote)
                .await
                .expect("store");
            assert!(revision.compressed());
            assert_eq!(revision.record_count(), 120);

            let cached = cache.refresh(&area([1.0, 1.0, 2.0, 2.0])).await.expect("refresh");
            assert_eq!(cached.len(), 120);
        });
    }

    #[rstest]
    fn clipping_limits_results_to_the_query(runtime: tokio::runtime::Runtime) {
        let cache = engine(CacheConfig::default().with_clip_to_query(true));
        let events = events_in(10, [0.0, 0.0, 10.0, 10.0]);
        runtime.block_on(async {
            cache
                .store_data(&events, None, OriginTag::Peer)
                .await
                .expect("store");
            let cached = cache.refresh(&area([0.0, 0.0, 5.0, 5.0])).await.expect("refresh");
            assert_eq!(cached.len(), 5);
        });
    }

    #[rstest]
    fn misses_return_empty_and_count(runtime: tokio::runtime::Runtime) {
        let cache = engine(CacheConfig::default());
        runtime.block_on(async {
            let cached = cache.refresh(&area([0.0, 0.0, 1.0, 1.0])).await.expect("refresh");
            assert!(cached.is_empty());
            let stats = cache.cache_stats().await;
            assert_eq!((stats.hits, stats.misses), (0, 1));
        });
    }

    #[rstest]
    fn empty_events_need_a_box(runtime: tokio::runtime::Runtime) {
        let cache = engine(CacheConfig::default());
        let err = runtime
            .block_on(cache.store_data(&[], None, OriginTag::Remote))
            .expect_err("nothing to describe");
        assert!(matches!(err, CacheError::EmptyPayload));
    }

    #[rstest]
    fn persistent_failure_keeps_memory_tier(runtime: tokio::runtime::Runtime) {
        let cache = engine_with(CacheConfig::default(), Arc::new(BrokenStore));
        let events = events_in(3, [0.0, 0.0, 1.0, 1.0]);
        runtime.block_on(async {
            cache
                .store_data(&events, None, OriginTag::Remote)
                .await
                .expect("memory tier still accepts");
            let error = cache.state().error.expect("error reported");
            assert_eq!(error.severity, firewatch_core::Severity::Error);

            let cached = cache.refresh(&QueryParams::default()).await.expect("refresh");
            assert_eq!(cached.len(), 3);
        });
    }

    #[rstest]
    fn expired_revisions_are_swept(runtime: tokio::runtime::Runtime) {
        let store = Arc::new(MemoryRevisionStore::default());
        let cache = engine_with(
            CacheConfig::default().with_ttl(Duration::from_secs(60)),
            Arc::clone(&store) as Arc<dyn RevisionStore>,
        );
        let events = events_in(3, [0.0, 0.0, 1.0, 1.0]);
        runtime.block_on(async {
            cache
                .store_data(&events, None, OriginTag::Remote)
                .await
                .expect("store");
            let removed = cache
                .sweep(Utc::now() + TimeDelta::minutes(2))
                .await
                .expect("sweep");
            assert_eq!(removed, 1);
            let metadata = store.metadata().expect("metadata");
            assert_eq!(metadata.revision_count, 0);
            assert!(metadata.last_cleanup.is_some());
            assert!(cache.find_best_revision(None).is_none());
        });
    }

    #[rstest]
    fn persistent_cap_evicts_oldest(runtime: tokio::runtime::Runtime) {
        let store = Arc::new(MemoryRevisionStore::default());
        let cache = engine_with(
            CacheConfig::default().with_max_persistent_bytes(1),
            Arc::clone(&store) as Arc<dyn RevisionStore>,
        );
        runtime.block_on(async {
            let first = cache
                .store_data(&events_in(2, [0.0, 0.0, 1.0, 1.0]), None, OriginTag::Remote)
                .await
                .expect("store");
            assert!(cache.find_best_revision(None).is_none());
            assert!(store.list_revisions().expect("list").is_empty());
            assert!(!first.id().as_str().is_empty());
        });
    }

    #[rstest]
    fn clear_empties_both_tiers(runtime: tokio::runtime::Runtime) {
        let cache = engine(CacheConfig::default());
        runtime.block_on(async {
            cache
                .store_data(&events_in(2, [0.0, 0.0, 1.0, 1.0]), None, OriginTag::Push)
                .await
                .expect("store");
            cache.clear().await.expect("clear");
            let stats = cache.cache_stats().await;
            assert_eq!(stats.revisions, 0);
            assert_eq!(stats.memory_entries, 0);
            assert_eq!(stats.persistent.map(|m| m.revision_count), Some(0));
        });
    }
}
