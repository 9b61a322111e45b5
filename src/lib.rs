//! Facade crate for the Firewatch event-access subsystem.
//!
//! This crate re-exports the core domain types and, behind the `network`
//! feature, the upstream sources and the coordinator that composes them.

#![forbid(unsafe_code)]

pub use firewatch_core::{
    BoundingBox, CacheRevision, EventDelta, EventRecord, EventSource, EventStatus,
    NetworkCondition, NetworkMonitor, OriginTag, QueryParams, RevisionStore, SourceError,
    SourceKind, SourceSnapshot, StaticNetworkMonitor, TimeRange,
};

#[cfg(feature = "store-sqlite")]
pub use firewatch_core::SqliteRevisionStore;

#[cfg(feature = "network")]
pub use firewatch_data::{
    BuildError, CacheEngine, CacheStats, CoordinatorError, CoordinatorSnapshot, FirewatchConfig,
    SourceCoordinator, SourceHealth, build_coordinator,
};
