//! Conversion from TAN DTOs to domain types.
//!
//! This is the only place that decides what an absent upstream field
//! means. There is one function per payload shape.

use crate::domain::{Departure, HourlyMinutes, ScheduleEntry, ScheduleKey, TrafficKind};

use super::types::{LooseString, RawDeparture, RawHourEntry, RawSchedule};

/// A live record split into its display form and the timetable it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDeparture {
    /// `None` when the record lacks a stop, line or direction.
    pub key: Option<ScheduleKey>,
    pub departure: Departure,
}

/// Convert one `tempsattente` record.
///
/// Absent text fields become empty strings, an absent alert flag is
/// `false`, and the traffic message always starts out empty: it is only
/// filled in from a cached timetable.
pub fn parse_departure(raw: RawDeparture) -> ParsedDeparture {
    let (line_number, line_type) = match raw.ligne {
        Some(line) => (
            line.num_ligne.map(LooseString::into_string),
            line.type_ligne.map(LooseString::into_string),
        ),
        None => (None, None),
    };
    let stop_id = raw.arret.and_then(|a| a.code_arret);

    let key = match (non_blank(stop_id), non_blank(line_number.clone()), raw.sens) {
        (Some(stop), Some(line), Some(direction)) if direction != 0 => {
            Some(ScheduleKey::new(stop, line, direction))
        }
        _ => None,
    };

    let departure = Departure {
        line_number: line_number.unwrap_or_default(),
        line_type: line_type.unwrap_or_default(),
        destination: raw.terminus.unwrap_or_default(),
        eta_text: raw.temps.unwrap_or_default(),
        direction: raw.sens,
        has_traffic_alert: raw.infotrafic.unwrap_or(false),
        traffic_message: None,
        traffic_type: TrafficKind::Alert,
    };

    ParsedDeparture { key, departure }
}

/// Convert one `horairesarret` response for the key it was fetched with.
///
/// The line number falls back to the key's, and the direction label to
/// `"Direction {n}"` when upstream has no `directionSens{n}`.
pub fn parse_schedule(raw: RawSchedule, key: &ScheduleKey) -> ScheduleEntry {
    let hourly_minutes = compact_hours(raw.horaires);

    let (line_number, direction_label, traffic_message) = match raw.ligne {
        Some(line) => {
            let label = non_blank(line.direction_label(key.direction).map(str::to_string));
            (
                line.num_ligne.map(LooseString::into_string),
                label,
                non_blank(line.libelle_trafic),
            )
        }
        None => (None, None, None),
    };

    ScheduleEntry {
        hourly_minutes,
        line_number: non_blank(line_number).unwrap_or_else(|| key.line_number.clone()),
        direction_label: direction_label
            .unwrap_or_else(|| format!("Direction {}", key.direction)),
        traffic_message,
    }
}

/// Compact upstream hour entries into `{hour: [minutes]}`.
///
/// Entries without an hour or without any minute are dropped, so a
/// timetable made only of such entries compacts to nothing.
pub fn compact_hours(entries: Vec<RawHourEntry>) -> HourlyMinutes {
    let mut hours = HourlyMinutes::new();
    for entry in entries {
        if let (Some(hour), Some(minutes)) = (entry.heure, entry.passages)
            && !minutes.is_empty()
        {
            hours.insert(hour, minutes);
        }
    }
    hours
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
