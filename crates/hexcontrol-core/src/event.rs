//! Normalized violent-event records and cell identifiers.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use geo::Point;

use crate::error::CoreError;

/// Opaque identifier of one hexagonal cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CellId(String);

impl CellId {
    /// Wrap an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CellId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for CellId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The two independent event streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EventKind {
    /// State-based armed conflict
    Conventional,
    /// Terrorist attack
    Terrorism,
}

impl EventKind {
    /// Both kinds, in table order.
    pub const ALL: [EventKind; 2] = [EventKind::Conventional, EventKind::Terrorism];

    /// Lowercase name used in tables and file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Conventional => "conventional",
            EventKind::Terrorism => "terrorism",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conventional" | "c" => Ok(EventKind::Conventional),
            "terrorism" | "t" => Ok(EventKind::Terrorism),
            other => Err(CoreError::parse("event kind", other)),
        }
    }
}

/// One normalized violent event.
///
/// Events are immutable once loaded; the cell is assigned by the spatial
/// indexer before the event reaches the exposure engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    timestamp: NaiveDate,
    country: String,
    location: Point<f64>,
    fatalities: u32,
    kind: EventKind,
    cell: CellId,
}

impl Event {
    /// Create a new event. `location` is `(x: longitude, y: latitude)`.
    pub fn new(
        timestamp: NaiveDate,
        country: impl Into<String>,
        location: Point<f64>,
        fatalities: u32,
        kind: EventKind,
        cell: CellId,
    ) -> Self {
        Self {
            timestamp,
            country: country.into(),
            location,
            fatalities,
            kind,
            cell,
        }
    }

    /// Event start date.
    pub fn timestamp(&self) -> NaiveDate {
        self.timestamp
    }

    /// Country the event was recorded in.
    pub fn country(&self) -> &str {
        &self.country
    }

    /// Event location as `(x: longitude, y: latitude)`.
    pub fn location(&self) -> Point<f64> {
        self.location
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.location.y()
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.location.x()
    }

    /// Best-estimate fatality count.
    pub fn fatalities(&self) -> u32 {
        self.fatalities
    }

    /// Event stream this record belongs to.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Cell the event was assigned to.
    pub fn cell(&self) -> &CellId {
        &self.cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    #[test]
    fn test_event_kind_parsing() {
        assert_eq!("terrorism".parse::<EventKind>().unwrap(), EventKind::Terrorism);
        assert_eq!("C".parse::<EventKind>().unwrap(), EventKind::Conventional);
        assert!("guerilla".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_event_kind_display_round_trips() {
        for kind in EventKind::ALL {
            assert_eq!(kind.to_string().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_event_accessors() {
        let date = NaiveDate::from_ymd_opt(2014, 4, 14).unwrap();
        let event = Event::new(
            date,
            "Nigeria",
            point!(x: 12.9, y: 10.9),
            276,
            EventKind::Terrorism,
            CellId::new("hx:5:0:0"),
        );

        assert_eq!(event.timestamp(), date);
        assert_eq!(event.country(), "Nigeria");
        assert!((event.latitude() - 10.9).abs() < f64::EPSILON);
        assert!((event.longitude() - 12.9).abs() < f64::EPSILON);
        assert_eq!(event.fatalities(), 276);
        assert_eq!(event.cell().as_str(), "hx:5:0:0");
    }
}
