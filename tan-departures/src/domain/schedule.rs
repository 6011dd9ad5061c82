//! Schedule keys and compacted timetables.

use std::fmt;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

/// Identifies one cacheable timetable lookup: (stop, line, direction).
///
/// The stop is the physical stop code carried by a live record, which is
/// not necessarily the stop code the live feed was requested for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleKey {
    pub stop_id: String,
    pub line_number: String,
    pub direction: u8,
}

impl ScheduleKey {
    /// Create a new key.
    pub fn new(stop_id: impl Into<String>, line_number: impl Into<String>, direction: u8) -> Self {
        Self {
            stop_id: stop_id.into(),
            line_number: line_number.into(),
            direction,
        }
    }

    /// Key under which this timetable appears in a published snapshot,
    /// e.g. `"C1-1"`.
    pub fn snapshot_key(&self) -> String {
        format!("{}-{}", self.line_number, self.direction)
    }
}

impl fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.stop_id, self.line_number, self.direction)
    }
}

/// Scheduled minutes grouped by hour, e.g. `{"08": ["05", "20"]}`.
///
/// Hours keep the order upstream listed them in, so a service day that
/// runs past midnight still reads `"23"` before `"00"`. Serializes as a
/// JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HourlyMinutes(Vec<(String, Vec<String>)>);

impl HourlyMinutes {
    /// Create an empty timetable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minutes for an hour.
    ///
    /// A repeated hour replaces the earlier minutes but keeps its position.
    pub fn insert(&mut self, hour: impl Into<String>, minutes: Vec<String>) {
        let hour = hour.into();
        match self.0.iter_mut().find(|(h, _)| *h == hour) {
            Some((_, existing)) => *existing = minutes,
            None => self.0.push((hour, minutes)),
        }
    }

    /// Minutes scheduled during `hour`.
    pub fn get(&self, hour: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(h, _)| h == hour)
            .map(|(_, minutes)| minutes.as_slice())
    }

    /// Iterate hours in upstream order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(h, m)| (h.as_str(), m.as_slice()))
    }

    /// Number of hour buckets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no hour has any scheduled departure.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of scheduled departures across all hours.
    pub fn departure_count(&self) -> usize {
        self.0.iter().map(|(_, m)| m.len()).sum()
    }
}

impl Serialize for HourlyMinutes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (hour, minutes) in &self.0 {
            map.serialize_entry(hour, minutes)?;
        }
        map.end()
    }
}

/// A compacted timetable for one [`ScheduleKey`], in display shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub hourly_minutes: HourlyMinutes,
    pub line_number: String,
    /// Human-readable direction, e.g. "François Mitterrand".
    pub direction_label: String,
    /// Line-level disruption label, if upstream reported one.
    pub traffic_message: Option<String>,
}

impl ScheduleEntry {
    /// Whether this timetable has anything worth displaying.
    ///
    /// Entries without hours are still cached so the lookup is not repeated,
    /// but they never appear in a snapshot.
    pub fn has_hours(&self) -> bool {
        !self.hourly_minutes.is_empty()
    }

    /// The disruption label, if it carries any text.
    pub fn disruption(&self) -> Option<&str> {
        self.traffic_message
            .as_deref()
            .filter(|msg| !msg.trim().is_empty())
    }
}
