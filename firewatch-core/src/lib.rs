//! Core domain types for the Firewatch event-access subsystem.
//!
//! This crate holds the data model shared by every upstream strategy
//! (event records, bounding boxes, cache revisions, peer endpoints), the
//! [`EventSource`] contract, and the persistence seam used by the cache
//! engine. Network adapters live in `firewatch-data`.
//!
//! Coordinates are WGS84 with `x = longitude` and `y = latitude`
//! throughout.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bbox;
pub mod delta;
pub mod event;
pub mod network;
pub mod peer;
pub mod query;
pub mod revision;
pub mod source;
pub mod store;

#[doc(hidden)]
pub mod test_support;

pub use bbox::{BoundingBox, BoundingBoxError};
pub use delta::{EventDelta, EventSet};
pub use event::{EventRecord, EventStatus};
pub use network::{NetworkCondition, NetworkMonitor, StaticNetworkMonitor};
pub use peer::{PeerEndpoint, merge_candidates, select_endpoint};
pub use query::{QueryParams, TimeRange};
pub use revision::{CacheRevision, OriginTag, RevisionId, RevisionParts, SCHEMA_VERSION};
pub use source::{
    ConnectionStatus, EventSource, Severity, SourceCapabilities, SourceError, SourceKind,
    SourceSnapshot, SourceState, SourceStats,
};
pub use store::{
    MemoryRevisionStore, RevisionIndex, RevisionStore, RevisionStoreError, StoreMetadata,
};

#[cfg(feature = "store-sqlite")]
pub use store::SqliteRevisionStore;
