//! Point-located incident records.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use geo::Coord;
use serde::{Deserialize, Serialize};

/// Lifecycle of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// The incident is ongoing.
    #[default]
    Active,
    /// The incident is under control but not over.
    Contained,
    /// The incident has ended.
    Resolved,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Contained => "contained",
            Self::Resolved => "resolved",
        })
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "contained" => Ok(Self::Contained),
            "resolved" => Ok(Self::Resolved),
            other => Err(format!("unknown event status {other:?}")),
        }
    }
}

/// A single geospatial event, such as a fire detection.
///
/// Records are immutable: the `with_*` methods consume the record and return
/// a replacement carrying the same identity.
///
/// # Examples
/// ```
/// use chrono::Utc;
/// use geo::Coord;
/// use firewatch_core::{EventRecord, EventStatus};
///
/// let event = EventRecord::new(5, Coord { x: 95.0, y: 17.5 }, Utc::now())
///     .with_confidence(80)
///     .with_source("viirs");
/// let updated = event.clone().with_status(EventStatus::Contained);
///
/// assert_eq!(updated.id(), event.id());
/// assert_eq!(updated.status(), EventStatus::Contained);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    id: u64,
    location: Coord<f64>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    confidence: u8,
    #[serde(default)]
    brightness: f64,
    #[serde(default)]
    status: EventStatus,
    #[serde(default)]
    source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    region: Option<String>,
}

impl EventRecord {
    /// Construct an active record with zero confidence and brightness.
    #[must_use]
    pub const fn new(id: u64, location: Coord<f64>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            location,
            timestamp,
            confidence: 0,
            brightness: 0.0,
            status: EventStatus::Active,
            source: String::new(),
            region: None,
        }
    }

    /// Replace the detection confidence (percent, clamped to 100).
    #[must_use]
    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence.min(100);
        self
    }

    /// Replace the brightness/intensity reading.
    #[must_use]
    pub const fn with_brightness(mut self, brightness: f64) -> Self {
        self.brightness = brightness;
        self
    }

    /// Replace the lifecycle status.
    #[must_use]
    pub const fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    /// Replace the originating source tag.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Replace the region label.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Stable identity across updates.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Point geometry.
    #[must_use]
    pub const fn location(&self) -> Coord<f64> {
        self.location
    }

    /// Observation time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Detection confidence in percent.
    #[must_use]
    pub const fn confidence(&self) -> u8 {
        self.confidence
    }

    /// Brightness or intensity reading.
    #[must_use]
    pub const fn brightness(&self) -> f64 {
        self.brightness
    }

    /// Lifecycle status.
    #[must_use]
    pub const fn status(&self) -> EventStatus {
        self.status
    }

    /// Originating source tag.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Optional region label.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}
