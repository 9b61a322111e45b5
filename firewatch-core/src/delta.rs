//! Incremental created/updated/resolved notifications and the working set
//! they are merged into.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::EventRecord;

/// A single-record change pushed by an upstream channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "event", rename_all = "lowercase")]
pub enum EventDelta {
    /// A new record; ignored when the id is already present.
    Created(EventRecord),
    /// A replacement; ignored when the id is absent.
    Updated(EventRecord),
    /// Removal of the record with the carried id.
    Resolved(EventRecord),
}

impl EventDelta {
    /// Record carried by the delta.
    #[must_use]
    pub const fn record(&self) -> &EventRecord {
        match self {
            Self::Created(record) | Self::Updated(record) | Self::Resolved(record) => record,
        }
    }
}

/// Working set of records keyed by identity.
///
/// Iteration order is by ascending id so snapshots are deterministic.
///
/// # Examples
/// ```
/// use chrono::Utc;
/// use geo::Coord;
/// use firewatch_core::{EventDelta, EventRecord, EventSet};
///
/// let event = EventRecord::new(5, Coord { x: 0.0, y: 0.0 }, Utc::now());
/// let mut set = EventSet::default();
/// set.apply(EventDelta::Created(event.clone()));
/// set.apply(EventDelta::Updated(event.clone().with_confidence(90)));
/// assert_eq!(set.get(5).map(|e| e.confidence()), Some(90));
///
/// set.apply(EventDelta::Resolved(event));
/// assert!(set.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSet {
    records: BTreeMap<u64, EventRecord>,
}

impl EventSet {
    /// Build a set from records; later duplicates replace earlier ones.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = EventRecord>,
    {
        Self {
            records: records.into_iter().map(|r| (r.id(), r)).collect(),
        }
    }

    /// Apply a delta, returning whether the set changed.
    pub fn apply(&mut self, delta: EventDelta) -> bool {
        match delta {
            EventDelta::Created(record) => {
                if self.records.contains_key(&record.id()) {
                    return false;
                }
                self.records.insert(record.id(), record);
                true
            }
            EventDelta::Updated(record) => match self.records.get_mut(&record.id()) {
                Some(existing) => {
                    *existing = record;
                    true
                }
                None => false,
            },
            EventDelta::Resolved(record) => self.records.remove(&record.id()).is_some(),
        }
    }

    /// Replace the whole set.
    pub fn replace_all<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = EventRecord>,
    {
        *self = Self::from_records(records);
    }

    /// Merge `records` in, replacing entries that share an id.
    pub fn extend<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = EventRecord>,
    {
        self.records
            .extend(records.into_iter().map(|r| (r.id(), r)));
    }

    /// Look up a record by id.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&EventRecord> {
        self.records.get(&id)
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> + '_ {
        self.records.values()
    }

    /// Clone the records into a vector in id order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<EventRecord> {
        self.records.values().cloned().collect()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
