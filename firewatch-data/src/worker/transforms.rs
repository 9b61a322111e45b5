//! Pure transforms run either on the worker thread or inline.
//!
//! Both execution paths call exactly these functions, which is what makes
//! the synchronous fallback produce identical output.

use std::collections::BTreeMap;

use firewatch_core::{EventDelta, EventRecord, EventSet, EventStatus, QueryParams};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::protocol::{WorkerKind, WorkerOutput, WorkerPayload};

/// Failure inside a transform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The payload was not valid JSON of the expected shape.
    #[error("failed to parse payload: {message}")]
    Parse {
        /// Decoder message.
        message: String,
    },
    /// The payload variant does not fit the requested operation.
    #[error("{kind:?} cannot operate on the supplied payload")]
    UnsupportedPayload {
        /// Requested operation.
        kind: WorkerKind,
    },
}

/// Point geometry in display form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    /// Always `"Point"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// `[longitude, latitude]`.
    pub coordinates: [f64; 2],
}

/// Properties carried by a display feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayProperties {
    /// Observation time, RFC 3339.
    pub timestamp: String,
    /// Detection confidence, 0-100.
    pub confidence: u8,
    /// Intensity.
    pub brightness: f64,
    /// Lifecycle state.
    pub status: EventStatus,
    /// Upstream tag.
    pub source: String,
    /// Optional region label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// GeoJSON-shaped record ready for a rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayFeature {
    /// Always `"Feature"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Record identity.
    pub id: u64,
    /// Point geometry.
    pub geometry: DisplayGeometry,
    /// Record properties.
    pub properties: DisplayProperties,
}

impl From<&EventRecord> for DisplayFeature {
    fn from(event: &EventRecord) -> Self {
        let location = event.location();
        Self {
            kind: "Feature".to_owned(),
            id: event.id(),
            geometry: DisplayGeometry {
                kind: "Point".to_owned(),
                coordinates: [location.x, location.y],
            },
            properties: DisplayProperties {
                timestamp: event.timestamp().to_rfc3339(),
                confidence: event.confidence(),
                brightness: event.brightness(),
                status: event.status(),
                source: event.source().to_owned(),
                region: event.region().map(str::to_owned),
            },
        }
    }
}

/// Decode a JSON array of records.
pub fn parse_events(raw: &str) -> Result<Vec<EventRecord>, TransformError> {
    serde_json::from_str(raw).map_err(|err| TransformError::Parse {
        message: err.to_string(),
    })
}

/// Decode a JSON array of `{"type": ..., "event": ...}` deltas.
pub fn parse_deltas(raw: &str) -> Result<Vec<EventDelta>, TransformError> {
    serde_json::from_str(raw).map_err(|err| TransformError::Parse {
        message: err.to_string(),
    })
}

/// Keep records satisfying both scopes of `params`.
#[must_use]
pub fn filter_events(events: Vec<EventRecord>, params: &QueryParams) -> Vec<EventRecord> {
    params.filter(events)
}

/// Decode then filter.
pub fn parse_and_filter(raw: &str, params: &QueryParams) -> Result<Vec<EventRecord>, TransformError> {
    parse_events(raw).map(|events| filter_events(events, params))
}

/// Convert records to display features, preserving order.
#[must_use]
pub fn convert_to_display(events: &[EventRecord]) -> Vec<DisplayFeature> {
    events.iter().map(DisplayFeature::from).collect()
}

/// Union record sets by id; a later set replaces an earlier one's record.
/// Output is ordered by id.
#[must_use]
pub fn merge_event_sets(sets: &[Vec<EventRecord>]) -> Vec<EventRecord> {
    let mut merged = EventSet::default();
    for set in sets {
        merged.extend(set.iter().cloned());
    }
    merged.to_vec()
}

/// Keep one record per id, preferring the newest timestamp and, on equal
/// timestamps, the later occurrence. Output is ordered by id.
#[must_use]
pub fn deduplicate_events(events: Vec<EventRecord>) -> Vec<EventRecord> {
    let mut newest: BTreeMap<u64, EventRecord> = BTreeMap::new();
    for event in events {
        match newest.get(&event.id()) {
            Some(existing) if existing.timestamp() > event.timestamp() => {}
            _ => {
                newest.insert(event.id(), event);
            }
        }
    }
    newest.into_values().collect()
}

/// Execute `kind` against `payload`.
pub(crate) fn run(
    kind: WorkerKind,
    payload: &WorkerPayload,
    params: &QueryParams,
) -> Result<WorkerOutput, TransformError> {
    match (kind, payload) {
        (WorkerKind::Init, _) => Ok(WorkerOutput::Ready),
        (WorkerKind::Parse, WorkerPayload::Raw(raw)) => parse_events(raw).map(WorkerOutput::Events),
        (WorkerKind::DeltaParse, WorkerPayload::Raw(raw)) => {
            parse_deltas(raw).map(WorkerOutput::Deltas)
        }
        (WorkerKind::Filter, WorkerPayload::Events(events)) => {
            Ok(WorkerOutput::Events(filter_events(events.clone(), params)))
        }
        (WorkerKind::ConvertToDisplay, WorkerPayload::Events(events)) => {
            Ok(WorkerOutput::Display(convert_to_display(events)))
        }
        (WorkerKind::ParseAndFilter, WorkerPayload::Raw(raw)) => {
            parse_and_filter(raw, params).map(WorkerOutput::Events)
        }
        (WorkerKind::Merge, WorkerPayload::EventSets(sets)) => {
            Ok(WorkerOutput::Events(merge_event_sets(sets)))
        }
        (WorkerKind::Deduplicate, WorkerPayload::Events(events)) => {
            Ok(WorkerOutput::Events(deduplicate_events(events.clone())))
        }
        _ => Err(TransformError::UnsupportedPayload { kind }),
    }
}
