//! Persistence seam for cache revisions.
//!
//! The `RevisionStore` trait models the transactional key-value medium the
//! cache engine writes through: revision metadata, the payload bytes keyed by
//! revision id, and a singleton aggregate row. Implementations are blocking;
//! async callers run them on a blocking thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CacheRevision, RevisionId};

mod memory;
mod spatial_index;
#[cfg(feature = "store-sqlite")]
mod sqlite;

pub use memory::MemoryRevisionStore;
pub use spatial_index::RevisionIndex;
#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteRevisionStore;

/// Aggregate figures kept alongside the stored revisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Sum of stored payload sizes in bytes.
    pub total_size: u64,
    /// Number of stored revisions.
    pub revision_count: u64,
    /// Completion time of the latest expiry sweep.
    pub last_cleanup: Option<DateTime<Utc>>,
}

/// Error raised by a [`RevisionStore`].
#[derive(Debug, Error)]
pub enum RevisionStoreError {
    /// Opening the backing database failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to open revision store at {path}: {source}")]
    OpenDatabase {
        /// Location of the database on disk.
        path: std::path::PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A statement or transaction failed.
    #[cfg(feature = "store-sqlite")]
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    /// A revision with the same id is already committed.
    #[error("revision {id} already exists")]
    DuplicateRevision {
        /// Identifier of the conflicting revision.
        id: RevisionId,
    },
    /// A stored row could not be decoded into a revision.
    #[error("revision {id} is malformed: {reason}")]
    InvalidRow {
        /// Identifier of the offending revision.
        id: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Transactional persistence for cache revisions and their payloads.
///
/// Writes are atomic: after `put_revision` returns `Ok`, both the revision
/// and its payload are visible; after it returns `Err`, neither is.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use firewatch_core::{
///     BoundingBox, CacheRevision, MemoryRevisionStore, OriginTag, RevisionId, RevisionStore,
///     RevisionParts, SCHEMA_VERSION,
/// };
///
/// let store = MemoryRevisionStore::default();
/// let now = Utc::now();
/// let revision = CacheRevision::new(RevisionParts {
///     id: RevisionId::new("r1"),
///     bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0).expect("valid bbox"),
///     created_at: now,
///     expires_at: now + Duration::hours(1),
///     size_bytes: 2,
///     compressed: false,
///     schema_version: SCHEMA_VERSION,
///     origin: OriginTag::Remote,
///     record_count: 0,
/// });
/// store.put_revision(&revision, b"[]").expect("write revision");
/// assert_eq!(store.metadata().expect("metadata").revision_count, 1);
/// ```
pub trait RevisionStore: Send + Sync {
    /// Commit `revision` together with its payload bytes.
    fn put_revision(
        &self,
        revision: &CacheRevision,
        payload: &[u8],
    ) -> Result<(), RevisionStoreError>;

    /// Load the payload bytes of `id`, or `None` when it is not stored.
    fn load_payload(&self, id: &RevisionId) -> Result<Option<Vec<u8>>, RevisionStoreError>;

    /// Delete `id` and its payload. Returns whether anything was removed.
    fn delete_revision(&self, id: &RevisionId) -> Result<bool, RevisionStoreError>;

    /// Every stored revision, oldest first.
    fn list_revisions(&self) -> Result<Vec<CacheRevision>, RevisionStoreError>;

    /// Aggregate figures.
    fn metadata(&self) -> Result<StoreMetadata, RevisionStoreError>;

    /// Record the completion time of an expiry sweep.
    fn record_cleanup(&self, at: DateTime<Utc>) -> Result<(), RevisionStoreError>;

    /// Remove every revision and payload.
    fn clear(&self) -> Result<(), RevisionStoreError>;
}
