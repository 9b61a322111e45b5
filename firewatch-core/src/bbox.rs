//! Axis-aligned longitude/latitude rectangles used to scope queries and
//! describe cache coverage.

use std::{fmt, str::FromStr};

use geo::{Coord, Intersects, Rect};
use rstar::AABB;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EventRecord;

/// Group key used by push channels when no bounding box is requested.
pub const GLOBAL_GROUP: &str = "global";

/// Errors returned when constructing or parsing a [`BoundingBox`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundingBoxError {
    /// A corner coordinate was NaN or infinite.
    #[error("bounding box coordinates must be finite")]
    NonFinite,
    /// Longitude fell outside `-180..=180` or latitude outside `-90..=90`.
    #[error("bounding box corner ({x}, {y}) lies outside WGS84 bounds")]
    OutOfRange {
        /// Offending longitude.
        x: f64,
        /// Offending latitude.
        y: f64,
    },
    /// The textual form did not contain four comma-separated numbers.
    #[error("expected `min_lon,min_lat,max_lon,max_lat`, found {input:?}")]
    Malformed {
        /// Input that failed to parse.
        input: String,
    },
}

/// Rectangle in WGS84 degrees.
///
/// Corners are normalised so that `min <= max` on both axes. Boundary points
/// count as inside, and two boxes sharing only an edge intersect.
///
/// Antimeridian-crossing regions are not modelled; callers must split them
/// into two boxes.
///
/// # Examples
///
/// ```
/// use firewatch_core::BoundingBox;
///
/// let query = BoundingBox::new(90.0, 15.0, 100.0, 20.0)?;
/// let coverage: BoundingBox = "95,10,110,16".parse()?;
/// assert!(query.intersects(&coverage));
/// # Ok::<(), firewatch_core::BoundingBoxError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    rect: Rect<f64>,
}

impl BoundingBox {
    /// Validate and construct a bounding box from its corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, BoundingBoxError> {
        for (x, y) in [(min_x, min_y), (max_x, max_y)] {
            if !x.is_finite() || !y.is_finite() {
                return Err(BoundingBoxError::NonFinite);
            }
            if !(-180.0..=180.0).contains(&x) || !(-90.0..=90.0).contains(&y) {
                return Err(BoundingBoxError::OutOfRange { x, y });
            }
        }
        Ok(Self {
            rect: Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y }),
        })
    }

    /// Smallest box covering every event location, or `None` for no events.
    #[must_use]
    pub fn covering(events: &[EventRecord]) -> Option<Self> {
        let mut locations = events.iter().map(EventRecord::location);
        let first = locations.next()?;
        let (min, max) = locations.fold((first, first), |(min, max), c| {
            (
                Coord {
                    x: min.x.min(c.x),
                    y: min.y.min(c.y),
                },
                Coord {
                    x: max.x.max(c.x),
                    y: max.y.max(c.y),
                },
            )
        });
        Some(Self {
            rect: Rect::new(min, max),
        })
    }

    /// Lower-left corner.
    #[must_use]
    pub fn min(&self) -> Coord<f64> {
        self.rect.min()
    }

    /// Upper-right corner.
    #[must_use]
    pub fn max(&self) -> Coord<f64> {
        self.rect.max()
    }

    /// Underlying `geo` rectangle.
    #[must_use]
    pub const fn as_rect(&self) -> &Rect<f64> {
        &self.rect
    }

    /// Whether the two boxes share at least one point.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.rect.intersects(&other.rect)
    }

    /// Whether `location` lies inside the box, boundary included.
    #[must_use]
    pub fn contains(&self, location: Coord<f64>) -> bool {
        self.rect.intersects(&location)
    }

    /// R\*-tree envelope covering the box.
    #[must_use]
    pub fn envelope(&self) -> AABB<[f64; 2]> {
        AABB::from_corners(
            [self.min().x, self.min().y],
            [self.max().x, self.max().y],
        )
    }

    /// Corners as `[min_x, min_y, max_x, max_y]`.
    #[must_use]
    pub fn to_array(&self) -> [f64; 4] {
        [self.min().x, self.min().y, self.max().x, self.max().y]
    }

    /// Push-channel group key for this box.
    #[must_use]
    pub fn group_key(&self) -> String {
        format!("bbox:{self}")
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = BoundingBoxError;

    fn try_from([min_x, min_y, max_x, max_y]: [f64; 4]) -> Result<Self, Self::Error> {
        Self::new(min_x, min_y, max_x, max_y)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.to_array()
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [min_x, min_y, max_x, max_y] = self.to_array();
        write!(f, "{min_x},{min_y},{max_x},{max_y}")
    }
}

impl FromStr for BoundingBox {
    type Err = BoundingBoxError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let malformed = || BoundingBoxError::Malformed {
            input: input.to_owned(),
        };
        let values = input
            .split(',')
            .map(|part| part.trim().parse::<f64>().map_err(|_| malformed()))
            .collect::<Result<Vec<_>, _>>()?;
        let corners: [f64; 4] = values.try_into().map_err(|_| malformed())?;
        Self::try_from(corners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn event_at(id: u64, x: f64, y: f64) -> EventRecord {
        let timestamp = Utc
            .with_ymd_and_hms(2024, 8, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        EventRecord::new(id, Coord { x, y }, timestamp)
    }

    #[rstest]
    fn new_normalises_corners() {
        let bbox = BoundingBox::new(10.0, 10.0, 0.0, 0.0).expect("valid box");
        assert_eq!(bbox.to_array(), [0.0, 0.0, 10.0, 10.0]);
    }

    #[rstest]
    #[case(f64::NAN, 0.0)]
    #[case(0.0, f64::INFINITY)]
    fn new_rejects_non_finite(#[case] x: f64, #[case] y: f64) {
        let err = BoundingBox::new(x, y, 1.0, 1.0).expect_err("non-finite should fail");
        assert_eq!(err, BoundingBoxError::NonFinite);
    }

    #[rstest]
    #[case(-181.0, 0.0)]
    #[case(0.0, 91.0)]
    fn new_rejects_out_of_range(#[case] x: f64, #[case] y: f64) {
        let err = BoundingBox::new(x, y, 1.0, 1.0).expect_err("out of range should fail");
        assert!(matches!(err, BoundingBoxError::OutOfRange { .. }));
    }

    #[rstest]
    #[case("90,15,100,20", true)]
    #[case("100,20,110,30", true)]
    #[case("100.5,20.5,110,30", false)]
    fn intersects_includes_shared_edges(#[case] other: &str, #[case] expected: bool) {
        let query = BoundingBox::new(90.0, 15.0, 100.0, 20.0).expect("valid box");
        let other: BoundingBox = other.parse().expect("parse box");
        assert_eq!(query.intersects(&other), expected);
    }

    #[rstest]
    fn covering_spans_all_events() {
        let events = vec![event_at(1, 1.0, 5.0), event_at(2, -3.0, 2.0), event_at(3, 4.0, -1.0)];
        let bbox = BoundingBox::covering(&events).expect("events present");
        assert_eq!(bbox.to_array(), [-3.0, -1.0, 4.0, 5.0]);
    }

    #[rstest]
    fn covering_returns_none_for_no_events() {
        assert!(BoundingBox::covering(&[]).is_none());
    }

    #[rstest]
    #[case("1,2,3")]
    #[case("a,b,c,d")]
    fn from_str_rejects_malformed_input(#[case] input: &str) {
        let err = input.parse::<BoundingBox>().expect_err("malformed input");
        assert!(matches!(err, BoundingBoxError::Malformed { .. }));
    }

    #[rstest]
    fn serde_uses_corner_array() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0).expect("valid box");
        let json = serde_json::to_string(&bbox).expect("serialise");
        assert_eq!(json, "[0.0,0.0,10.0,10.0]");
        let invalid: Result<BoundingBox, _> = serde_json::from_str("[0.0,0.0,10.0,200.0]");
        assert!(invalid.is_err());
    }

    #[rstest]
    fn group_key_is_stable() {
        let bbox = BoundingBox::new(90.0, 15.0, 100.0, 20.0).expect("valid box");
        assert_eq!(bbox.group_key(), "bbox:90,15,100,20");
    }
}
