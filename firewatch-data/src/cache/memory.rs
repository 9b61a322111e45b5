//! In-memory tier: recently used payloads bounded by count and bytes.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use firewatch_core::RevisionId;

#[derive(Debug, Clone)]
struct Entry {
    bytes: Arc<[u8]>,
    compressed: bool,
    inserted_at: DateTime<Utc>,
    last_access: u64,
}

/// A payload held by the memory tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CachedPayload {
    pub(crate) bytes: Arc<[u8]>,
    pub(crate) compressed: bool,
}

/// Least-recently-accessed payload cache.
#[derive(Debug)]
pub(crate) struct MemoryTier {
    entries: HashMap<RevisionId, Entry>,
    clock: u64,
    total_bytes: usize,
    max_entries: usize,
    max_bytes: usize,
}

impl MemoryTier {
    pub(crate) fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            clock: 0,
            total_bytes: 0,
            max_entries,
            max_bytes,
        }
    }

    const fn tick(&mut self) -> u64 {
        self.clock = self.clock.wrapping_add(1);
        self.clock
    }

    /// Insert a payload and evict until within bounds. Returns evicted ids,
    /// which may include `id` itself when it alone exceeds the byte cap.
    pub(crate) fn insert(
        &mut self,
        id: RevisionId,
        bytes: Arc<[u8]>,
        compressed: bool,
        now: DateTime<Utc>,
    ) -> Vec<RevisionId> {
        let last_access = self.tick();
        let size = bytes.len();
        if let Some(previous) = self.entries.insert(
            id,
            Entry {
                bytes,
                compressed,
                inserted_at: now,
                last_access,
            },
        ) {
            self.total_bytes = self.total_bytes.saturating_sub(previous.bytes.len());
        }
        self.total_bytes = self.total_bytes.saturating_add(size);
        self.evict()
    }

    fn evict(&mut self) -> Vec<RevisionId> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.max_entries || self.total_bytes > self.max_bytes {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            self.remove(&oldest);
            evicted.push(oldest);
        }
        evicted
    }

    /// Fetch a payload, marking it most recently used.
    pub(crate) fn get(&mut self, id: &RevisionId) -> Option<CachedPayload> {
        let access = self.tick();
        self.entries.get_mut(id).map(|entry| {
            entry.last_access = access;
            CachedPayload {
                bytes: Arc::clone(&entry.bytes),
                compressed: entry.compressed,
            }
        })
    }

    pub(crate) fn contains(&self, id: &RevisionId) -> bool {
        self.entries.contains_key(id)
    }

    pub(crate) fn remove(&mut self, id: &RevisionId) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                self.total_bytes = self.total_bytes.saturating_sub(entry.bytes.len());
                true
            }
            None => false,
        }
    }

    /// Drop entries inserted more than `max_age` before `now`.
    pub(crate) fn purge(&mut self, now: DateTime<Utc>, max_age: Duration) -> Vec<RevisionId> {
        let stale: Vec<RevisionId> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.signed_duration_since(entry.inserted_at) > max_age)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.remove(id);
        }
        stale
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) const fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }
}
