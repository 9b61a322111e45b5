//! Messages exchanged with the background thread.

use std::sync::Arc;

use firewatch_core::{EventDelta, EventRecord, QueryParams};
use serde::{Deserialize, Serialize};

use super::DisplayFeature;

/// Approximate serialised size of one record, used to weigh raw payloads
/// against the record-count threshold.
pub(crate) const APPROX_RECORD_BYTES: usize = 256;

/// Operation requested from the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerKind {
    /// Liveness round-trip issued at start-up.
    Init,
    /// Decode a JSON array of records.
    Parse,
    /// Decode a JSON array of deltas.
    DeltaParse,
    /// Apply query scopes to records.
    Filter,
    /// Convert records to display features.
    ConvertToDisplay,
    /// Decode then filter.
    ParseAndFilter,
    /// Union several record sets, later sets winning per id.
    Merge,
    /// Collapse duplicate ids, keeping the newest record.
    Deduplicate,
}

/// Input carried by a request.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerPayload {
    /// No input.
    Empty,
    /// Raw JSON text.
    Raw(String),
    /// Decoded records.
    Events(Vec<EventRecord>),
    /// Several record sets.
    EventSets(Vec<Vec<EventRecord>>),
}

impl WorkerPayload {
    /// Number of records the payload holds or is estimated to hold.
    #[must_use]
    pub fn record_count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Raw(text) => text.len().div_ceil(APPROX_RECORD_BYTES),
            Self::Events(events) => events.len(),
            Self::EventSets(sets) => sets.iter().map(Vec::len).sum(),
        }
    }
}

/// Result data produced by a transform.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutput {
    /// Liveness acknowledgement.
    Ready,
    /// Records.
    Events(Vec<EventRecord>),
    /// Deltas.
    Deltas(Vec<EventDelta>),
    /// Display features.
    Display(Vec<DisplayFeature>),
}

impl WorkerOutput {
    /// Number of items produced.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Ready => 0,
            Self::Events(events) => events.len(),
            Self::Deltas(deltas) => deltas.len(),
            Self::Display(features) => features.len(),
        }
    }

    /// Whether nothing was produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Request sent to the worker thread.
#[derive(Debug, Clone)]
pub(crate) struct WorkerRequest {
    pub(crate) id: u64,
    pub(crate) kind: WorkerKind,
    pub(crate) payload: Arc<WorkerPayload>,
    pub(crate) params: QueryParams,
}

/// Response correlated with a request by `id`.
#[derive(Debug)]
pub(crate) struct WorkerResponse {
    pub(crate) id: u64,
    pub(crate) kind: WorkerKind,
    pub(crate) result: Result<WorkerOutput, String>,
}
