//! The published result of one refresh cycle.

use std::collections::BTreeMap;

use serde::Serialize;

use super::departure::Departure;
use super::schedule::ScheduleEntry;

/// Display-ready view of a stop: upcoming departures plus the timetables
/// of the lines serving them.
///
/// Immutable once published; the next successful refresh replaces it
/// wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Departures in upstream order (soonest first).
    pub next_departures: Vec<Departure>,
    /// Timetables keyed by `"{line}-{direction}"`.
    pub schedules: BTreeMap<String, ScheduleEntry>,
}

impl Snapshot {
    /// A snapshot for a stop with no upcoming service.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The soonest departure, if any.
    pub fn next_departure(&self) -> Option<&Departure> {
        self.next_departures.first()
    }

    /// Look up the timetable for a line and direction.
    pub fn schedule(&self, line_number: &str, direction: u8) -> Option<&ScheduleEntry> {
        self.schedules.get(&format!("{line_number}-{direction}"))
    }

    /// True when no departure is expected.
    pub fn is_empty(&self) -> bool {
        self.next_departures.is_empty()
    }
}
