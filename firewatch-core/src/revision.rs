//! Immutable snapshots of cached result sets.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BoundingBox, SourceKind};

/// Payload layout version written with every revision.
pub const SCHEMA_VERSION: u32 = 1;

/// Upstream that produced a cached result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginTag {
    /// One-shot remote query.
    Remote,
    /// Same-network peer server.
    Peer,
    /// Push channel working set.
    Push,
}

impl OriginTag {
    /// Stable lowercase name used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Peer => "peer",
            Self::Push => "push",
        }
    }

    /// Parse the storage name written by [`Self::as_str`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "remote" => Some(Self::Remote),
            "peer" => Some(Self::Peer),
            "push" => Some(Self::Push),
            _ => None,
        }
    }

    /// Origin tag for results produced by `kind`; the cache has none.
    #[must_use]
    pub const fn for_source(kind: SourceKind) -> Option<Self> {
        match kind {
            SourceKind::Remote => Some(Self::Remote),
            SourceKind::Push => Some(Self::Push),
            SourceKind::Peer => Some(Self::Peer),
            SourceKind::Cache => None,
        }
    }
}

impl fmt::Display for OriginTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a cache revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata describing one committed cache entry.
///
/// Revisions are never mutated after commit; they are only evicted whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRevision {
    id: RevisionId,
    bbox: BoundingBox,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    size_bytes: u64,
    compressed: bool,
    schema_version: u32,
    origin: OriginTag,
    record_count: u64,
}

/// Field bundle for [`CacheRevision::new`].
#[derive(Debug, Clone)]
pub struct RevisionParts {
    /// Identifier.
    pub id: RevisionId,
    /// Spatial coverage.
    pub bbox: BoundingBox,
    /// Commit time.
    pub created_at: DateTime<Utc>,
    /// Time after which the revision is stale.
    pub expires_at: DateTime<Utc>,
    /// Stored payload size in bytes.
    pub size_bytes: u64,
    /// Whether the stored payload is compressed.
    pub compressed: bool,
    /// Payload layout version.
    pub schema_version: u32,
    /// Upstream that produced the payload.
    pub origin: OriginTag,
    /// Number of records in the payload.
    pub record_count: u64,
}

impl CacheRevision {
    /// Assemble a revision from its parts.
    #[must_use]
    pub fn new(parts: RevisionParts) -> Self {
        let RevisionParts {
            id,
            bbox,
            created_at,
            expires_at,
            size_bytes,
            compressed,
            schema_version,
            origin,
            record_count,
        } = parts;
        Self {
            id,
            bbox,
            created_at,
            expires_at,
            size_bytes,
            compressed,
            schema_version,
            origin,
            record_count,
        }
    }

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> &RevisionId {
        &self.id
    }

    /// Spatial coverage.
    #[must_use]
    pub const fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Commit time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Expiry time.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Stored payload size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Whether the stored payload is compressed.
    #[must_use]
    pub const fn compressed(&self) -> bool {
        self.compressed
    }

    /// Payload layout version.
    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Upstream that produced the payload.
    #[must_use]
    pub const fn origin(&self) -> OriginTag {
        self.origin
    }

    /// Number of records in the payload.
    #[must_use]
    pub const fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Whether the revision is stale at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
