//! Fixtures and stub collaborators shared by unit and behaviour tests.

use std::sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use geo::Coord;

use crate::{
    BoundingBox, CacheRevision, EventRecord, EventSource, OriginTag, QueryParams, RevisionId,
    RevisionParts, SCHEMA_VERSION, SourceCapabilities, SourceError, SourceKind, SourceSnapshot,
    SourceState,
};

/// Fixed reference instant used across fixtures.
#[must_use]
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Revision covering `corners`, created `offset_minutes` after
/// [`base_time`] and living for `ttl_minutes`.
///
/// # Panics
///
/// Panics when `corners` is not a valid WGS84 box.
#[must_use]
pub fn revision_at(
    id: &str,
    corners: [f64; 4],
    offset_minutes: i64,
    ttl_minutes: i64,
) -> CacheRevision {
    let bbox = BoundingBox::try_from(corners)
        .unwrap_or_else(|err| panic!("invalid test bbox {corners:?}: {err}"));
    let created_at = base_time() + Duration::minutes(offset_minutes);
    CacheRevision::new(RevisionParts {
        id: RevisionId::new(id),
        bbox,
        created_at,
        expires_at: created_at + Duration::minutes(ttl_minutes),
        size_bytes: 0,
        compressed: false,
        schema_version: SCHEMA_VERSION,
        origin: OriginTag::Remote,
        record_count: 0,
    })
}

/// Event at `(x, y)` stamped `id` minutes after [`base_time`].
#[must_use]
pub fn event(id: u64, x: f64, y: f64) -> EventRecord {
    let minutes = i64::try_from(id).unwrap_or(i64::MAX);
    EventRecord::new(
        id,
        Coord { x, y },
        base_time() + Duration::minutes(minutes),
    )
    .with_confidence(50)
    .with_source("test")
}

/// `count` events laid out along the diagonal of `corners`, ids from 1.
#[must_use]
#[expect(
    clippy::float_arithmetic,
    reason = "fixture coordinates are interpolated across the box"
)]
pub fn events_in(count: u32, corners: [f64; 4]) -> Vec<EventRecord> {
    let [min_x, min_y, max_x, max_y] = corners;
    let steps = f64::from(count.max(1));
    (1..=count)
        .map(|n| {
            let t = f64::from(n) / steps;
            event(
                u64::from(n),
                min_x + (max_x - min_x) * t,
                min_y + (max_y - min_y) * t,
            )
        })
        .collect()
}

/// Capabilities of a plain request/response source.
#[must_use]
pub const fn plain_capabilities() -> SourceCapabilities {
    SourceCapabilities {
        supports_push: false,
        supports_peer_discovery: false,
        supports_caching: true,
        supports_filtering: true,
        supports_bounding_box: true,
        max_concurrent_requests: 1,
        update_interval: StdDuration::from_secs(60),
    }
}

/// Scripted [`EventSource`] returning a fixed outcome.
#[derive(Debug)]
pub struct StubSource {
    kind: SourceKind,
    capabilities: SourceCapabilities,
    state: SourceState,
    outcome: Mutex<Result<Vec<EventRecord>, SourceError>>,
    healthy: Mutex<bool>,
    last_params: Mutex<Option<QueryParams>>,
    refreshes: AtomicUsize,
    destroyed: AtomicUsize,
}

impl StubSource {
    /// Stub of `kind` returning no events.
    #[must_use]
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            capabilities: plain_capabilities(),
            state: SourceState::default(),
            outcome: Mutex::new(Ok(Vec::new())),
            healthy: Mutex::new(true),
            last_params: Mutex::new(None),
            refreshes: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
        }
    }

    /// Return `events` from every refresh.
    #[must_use]
    pub fn with_events(self, events: Vec<EventRecord>) -> Self {
        self.set_outcome(Ok(events));
        self
    }

    /// Fail every refresh with `error`.
    #[must_use]
    pub fn failing(self, error: SourceError) -> Self {
        self.set_outcome(Err(error));
        self
    }

    /// Override the declared capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replace the scripted outcome.
    pub fn set_outcome(&self, outcome: Result<Vec<EventRecord>, SourceError>) {
        *lock(&self.outcome) = outcome;
    }

    /// Set what `health_check` reports.
    pub fn set_healthy(&self, healthy: bool) {
        *lock(&self.healthy) = healthy;
    }

    /// Number of `refresh` calls seen.
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Number of `destroy` calls seen.
    #[must_use]
    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Parameters of the most recent refresh.
    #[must_use]
    pub fn last_params(&self) -> Option<QueryParams> {
        *lock(&self.last_params)
    }
}

#[async_trait]
impl EventSource for StubSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn capabilities(&self) -> &SourceCapabilities {
        &self.capabilities
    }

    async fn init(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn refresh(&self, params: &QueryParams) -> Result<Vec<EventRecord>, SourceError> {
        self.state.begin_refresh();
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_params) = Some(*params);
        let outcome = lock(&self.outcome).clone();
        match outcome {
            Ok(events) => {
                let filtered = params.filter(events);
                self.state.finish_ok(filtered.len());
                Ok(filtered)
            }
            Err(err) => {
                self.state.finish_err(err.clone());
                Err(err)
            }
        }
    }

    async fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    async fn health_check(&self) -> bool {
        let healthy = *lock(&self.healthy);
        self.state.set_healthy(healthy);
        healthy
    }

    fn state(&self) -> SourceSnapshot {
        self.state.snapshot()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
