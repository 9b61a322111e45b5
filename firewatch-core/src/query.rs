//! Query parameters shared by every source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BoundingBox, EventRecord, bbox::GLOBAL_GROUP};

/// Inclusive observation-time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Earliest accepted timestamp.
    pub start: DateTime<Utc>,
    /// Latest accepted timestamp.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Construct a range, swapping the bounds if given in reverse.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Whether `timestamp` falls inside the window.
    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

/// Optional spatial and temporal scope of a refresh. Absent fields mean
/// unfiltered.
///
/// # Examples
/// ```
/// use chrono::Utc;
/// use geo::Coord;
/// use firewatch_core::{BoundingBox, EventRecord, QueryParams};
///
/// let params = QueryParams::default().with_bbox(BoundingBox::new(0.0, 0.0, 1.0, 1.0)?);
/// let inside = EventRecord::new(1, Coord { x: 0.5, y: 0.5 }, Utc::now());
/// let outside = EventRecord::new(2, Coord { x: 5.0, y: 5.0 }, Utc::now());
/// assert!(params.matches(&inside));
/// assert!(!params.matches(&outside));
/// # Ok::<(), firewatch_core::BoundingBoxError>(())
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    /// Spatial scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    /// Temporal scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

impl QueryParams {
    /// Scope the query to `bbox`.
    #[must_use]
    pub const fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Scope the query to `range`.
    #[must_use]
    pub const fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// Whether neither scope is set.
    #[must_use]
    pub const fn is_unfiltered(&self) -> bool {
        self.bbox.is_none() && self.time_range.is_none()
    }

    /// Whether `event` satisfies both scopes.
    #[must_use]
    pub fn matches(&self, event: &EventRecord) -> bool {
        let in_box = self
            .bbox
            .is_none_or(|bbox| bbox.contains(event.location()));
        let in_time = self
            .time_range
            .is_none_or(|range| range.contains(event.timestamp()));
        in_box && in_time
    }

    /// Keep only events satisfying both scopes.
    #[must_use]
    pub fn filter(&self, events: Vec<EventRecord>) -> Vec<EventRecord> {
        if self.is_unfiltered() {
            return events;
        }
        events.into_iter().filter(|e| self.matches(e)).collect()
    }

    /// Push-channel group this query belongs to.
    #[must_use]
    pub fn group_key(&self) -> String {
        self.bbox
            .map_or_else(|| GLOBAL_GROUP.to_owned(), |bbox| bbox.group_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo::Coord;
    use rstest::rstest;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 1, hour, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn event(id: u64, x: f64, y: f64, hour: u32) -> EventRecord {
        EventRecord::new(id, Coord { x, y }, at(hour))
    }

    #[rstest]
    fn unfiltered_params_keep_everything() {
        let events = vec![event(1, 0.0, 0.0, 1), event(2, 50.0, 50.0, 2)];
        assert_eq!(QueryParams::default().filter(events.clone()), events);
    }

    #[rstest]
    fn filter_applies_box_and_time() {
        let params = QueryParams::default()
            .with_bbox(BoundingBox::new(0.0, 0.0, 10.0, 10.0).expect("valid box"))
            .with_time_range(TimeRange::new(at(2), at(4)));
        let events = vec![
            event(1, 5.0, 5.0, 1),
            event(2, 5.0, 5.0, 3),
            event(3, 20.0, 5.0, 3),
            event(4, 10.0, 10.0, 4),
        ];
        let ids: Vec<_> = params.filter(events).iter().map(EventRecord::id).collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[rstest]
    fn time_range_normalises_reversed_bounds() {
        let range = TimeRange::new(at(5), at(1));
        assert_eq!(range.start, at(1));
        assert!(range.contains(at(3)));
    }

    #[rstest]
    fn group_key_defaults_to_global() {
        assert_eq!(QueryParams::default().group_key(), GLOBAL_GROUP);
    }
}
