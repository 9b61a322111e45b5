//! Volatile [`RevisionStore`] used in tests and when no database is configured.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};

use crate::{CacheRevision, RevisionId};

use super::{RevisionStore, RevisionStoreError, StoreMetadata};

#[derive(Debug, Default)]
struct Inner {
    revisions: BTreeMap<RevisionId, (CacheRevision, Vec<u8>)>,
    last_cleanup: Option<DateTime<Utc>>,
}

/// Revision store holding everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryRevisionStore {
    inner: Mutex<Inner>,
}

impl MemoryRevisionStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RevisionStore for MemoryRevisionStore {
    fn put_revision(
        &self,
        revision: &CacheRevision,
        payload: &[u8],
    ) -> Result<(), RevisionStoreError> {
        let mut inner = self.lock();
        if inner.revisions.contains_key(revision.id()) {
            return Err(RevisionStoreError::DuplicateRevision {
                id: revision.id().clone(),
            });
        }
        inner.revisions.insert(
            revision.id().clone(),
            (revision.clone(), payload.to_vec()),
        );
        Ok(())
    }

    fn load_payload(&self, id: &RevisionId) -> Result<Option<Vec<u8>>, RevisionStoreError> {
        Ok(self
            .lock()
            .revisions
            .get(id)
            .map(|(_, payload)| payload.clone()))
    }

    fn delete_revision(&self, id: &RevisionId) -> Result<bool, RevisionStoreError> {
        Ok(self.lock().revisions.remove(id).is_some())
    }

    fn list_revisions(&self) -> Result<Vec<CacheRevision>, RevisionStoreError> {
        let mut revisions: Vec<_> = self
            .lock()
            .revisions
            .values()
            .map(|(revision, _)| revision.clone())
            .collect();
        revisions.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(revisions)
    }

    fn metadata(&self) -> Result<StoreMetadata, RevisionStoreError> {
        let inner = self.lock();
        let total_size = inner
            .revisions
            .values()
            .fold(0_u64, |acc, (_, payload)| {
                acc.saturating_add(u64::try_from(payload.len()).unwrap_or(u64::MAX))
            });
        Ok(StoreMetadata {
            total_size,
            revision_count: u64::try_from(inner.revisions.len()).unwrap_or(u64::MAX),
            last_cleanup: inner.last_cleanup,
        })
    }

    fn record_cleanup(&self, at: DateTime<Utc>) -> Result<(), RevisionStoreError> {
        self.lock().last_cleanup = Some(at);
        Ok(())
    }

    fn clear(&self) -> Result<(), RevisionStoreError> {
        self.lock().revisions.clear();
        Ok(())
    }
}
