//! R\*-tree over revision envelopes used to answer bounding-box lookups.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rstar::{AABB, RTree, RTreeObject};

use crate::{BoundingBox, CacheRevision, RevisionId};

#[derive(Debug, Clone)]
struct IndexEntry {
    envelope: AABB<[f64; 2]>,
    id: RevisionId,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl From<&CacheRevision> for IndexEntry {
    fn from(revision: &CacheRevision) -> Self {
        Self {
            envelope: revision.bbox().envelope(),
            id: revision.id().clone(),
            created_at: revision.created_at(),
            expires_at: revision.expires_at(),
        }
    }
}

/// Spatial lookup over committed revisions.
///
/// The index holds only the fields needed to rank candidates; payloads live
/// in the memory tier or the [`RevisionStore`](super::RevisionStore).
///
/// # Examples
/// ```
/// use chrono::{Duration, Utc};
/// use firewatch_core::{
///     BoundingBox, CacheRevision, OriginTag, RevisionId, RevisionIndex, RevisionParts,
///     SCHEMA_VERSION,
/// };
///
/// let now = Utc::now();
/// let mut index = RevisionIndex::default();
/// index.insert(&CacheRevision::new(RevisionParts {
///     id: RevisionId::new("r1"),
///     bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0).expect("valid bbox"),
///     created_at: now,
///     expires_at: now + Duration::hours(1),
///     size_bytes: 0,
///     compressed: false,
///     schema_version: SCHEMA_VERSION,
///     origin: OriginTag::Remote,
///     record_count: 0,
/// }));
///
/// let query = BoundingBox::new(1.0, 1.0, 2.0, 2.0).expect("valid bbox");
/// assert_eq!(index.find_best(&query, now), Some(RevisionId::new("r1")));
/// ```
#[derive(Debug, Default)]
pub struct RevisionIndex {
    tree: RTree<IndexEntry>,
    entries: HashMap<RevisionId, IndexEntry>,
}

impl RevisionIndex {
    /// Build an index from existing revisions, e.g. on warm start.
    pub fn from_revisions<'a, I>(revisions: I) -> Self
    where
        I: IntoIterator<Item = &'a CacheRevision>,
    {
        let entries: HashMap<_, _> = revisions
            .into_iter()
            .map(|revision| (revision.id().clone(), IndexEntry::from(revision)))
            .collect();
        Self {
            tree: RTree::bulk_load(entries.values().cloned().collect()),
            entries,
        }
    }

    /// Add `revision`, replacing any entry with the same id.
    pub fn insert(&mut self, revision: &CacheRevision) {
        self.remove(revision.id());
        let entry = IndexEntry::from(revision);
        self.tree.insert(entry.clone());
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Remove `id`. Returns whether it was indexed.
    pub fn remove(&mut self, id: &RevisionId) -> bool {
        self.entries
            .remove(id)
            .is_some_and(|entry| self.tree.remove(&entry).is_some())
    }

    /// Newest non-expired revision whose box intersects `bbox`.
    ///
    /// Ties on creation time resolve to the greater id so the answer is
    /// deterministic.
    #[must_use]
    pub fn find_best(&self, bbox: &BoundingBox, now: DateTime<Utc>) -> Option<RevisionId> {
        self.tree
            .locate_in_envelope_intersecting(&bbox.envelope())
            .filter(|entry| entry.expires_at > now)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .map(|entry| entry.id.clone())
    }

    /// Newest non-expired revision regardless of location.
    #[must_use]
    pub fn find_newest(&self, now: DateTime<Utc>) -> Option<RevisionId> {
        self.entries
            .values()
            .filter(|entry| entry.expires_at > now)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .map(|entry| entry.id.clone())
    }

    /// Ids of every revision stale at `now`.
    #[must_use]
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<RevisionId> {
        let mut ids: Vec<_> = self
            .entries
            .values()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Whether `id` is indexed.
    #[must_use]
    pub fn contains(&self, id: &RevisionId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of indexed revisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.tree = RTree::new();
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{base_time, revision_at};
    use chrono::Duration;
    use proptest::prelude::*;
    use rstest::rstest;

    fn bbox(coords: [f64; 4]) -> BoundingBox {
        let [a, b, c, d] = coords;
        BoundingBox::new(a, b, c, d).expect("valid bbox")
    }

    #[rstest]
    fn returns_newest_intersecting_revision() {
        let index = RevisionIndex::from_revisions(&[
            revision_at("old", [0.0, 0.0, 10.0, 10.0], 0, 120),
            revision_at("new", [0.0, 0.0, 10.0, 10.0], 10, 120),
            revision_at("far", [50.0, 50.0, 60.0, 60.0], 20, 120),
        ]);
        let found = index.find_best(&bbox([1.0, 1.0, 2.0, 2.0]), base_time());
        assert_eq!(found, Some(RevisionId::new("new")));
    }

    #[rstest]
    fn skips_expired_revisions() {
        let index = RevisionIndex::from_revisions(&[
            revision_at("stale", [0.0, 0.0, 10.0, 10.0], 10, 5),
            revision_at("fresh", [0.0, 0.0, 10.0, 10.0], 0, 120),
        ]);
        let now = base_time() + Duration::minutes(30);
        let found = index.find_best(&bbox([1.0, 1.0, 2.0, 2.0]), now);
        assert_eq!(found, Some(RevisionId::new("fresh")));
        assert_eq!(index.expired(now), vec![RevisionId::new("stale")]);
    }

    #[rstest]
    fn disjoint_query_is_a_miss() {
        let index =
            RevisionIndex::from_revisions(&[revision_at("r", [0.0, 0.0, 1.0, 1.0], 0, 60)]);
        assert!(index.find_best(&bbox([5.0, 5.0, 6.0, 6.0]), base_time()).is_none());
    }

    #[rstest]
    fn removal_and_reinsert_keep_tree_consistent() {
        let revision = revision_at("r", [0.0, 0.0, 1.0, 1.0], 0, 60);
        let mut index = RevisionIndex::default();
        index.insert(&revision);
        index.insert(&revision);
        assert_eq!(index.len(), 1);
        assert!(index.remove(revision.id()));
        assert!(!index.remove(revision.id()));
        assert!(index.find_best(&bbox([0.0, 0.0, 1.0, 1.0]), base_time()).is_none());
    }

    fn arb_revision() -> impl Strategy<Value = (i32, i32, i64, i64)> {
        (-20_i32..20, -20_i32..20, 0_i64..100, 1_i64..100)
    }

    proptest! {
        #[test]
        fn find_best_matches_linear_scan(
            specs in proptest::collection::vec(arb_revision(), 0..24),
            qx in -25_i32..25,
            qy in -25_i32..25,
            at in 0_i64..150,
        ) {
            let revisions: Vec<_> = specs
                .iter()
                .enumerate()
                .map(|(i, &(x, y, offset, ttl))| {
                    let (fx, fy) = (f64::from(x), f64::from(y));
                    let corners = [fx, fy, f64::from(x.saturating_add(5)), f64::from(y.saturating_add(5))];
                    revision_at(&format!("r{i:02}"), corners, offset, ttl)
                })
                .collect();
            let index = RevisionIndex::from_revisions(&revisions);
            let query = bbox([
                f64::from(qx),
                f64::from(qy),
                f64::from(qx.saturating_add(3)),
                f64::from(qy.saturating_add(3)),
            ]);
            let now = base_time() + Duration::minutes(at);

            let expected = revisions
                .iter()
                .filter(|r| r.bbox().intersects(&query) && !r.is_expired(now))
                .max_by(|a, b| {
                    a.created_at().cmp(&b.created_at()).then_with(|| a.id().cmp(b.id()))
                })
                .map(|r| r.id().clone());

            prop_assert_eq!(index.find_best(&query, now), expected);
        }
    }
}
