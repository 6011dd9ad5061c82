//! Upcoming departures at a monitored stop.

use serde::Serialize;

use super::schedule::ScheduleEntry;

/// Kind of traffic notice attached to a departure.
///
/// Upstream only distinguishes disruptions, so every notice is an alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficKind {
    #[default]
    Alert,
}

/// One upcoming vehicle at the monitored stop.
///
/// Rebuilt from the live feed on every refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Departure {
    pub line_number: String,
    pub line_type: String,
    pub destination: String,
    /// Upstream-formatted estimate, e.g. "5 mn" or "proche".
    pub eta_text: String,
    /// Travel orientation (1 or 2), when upstream sent one.
    pub direction: Option<u8>,
    pub has_traffic_alert: bool,
    pub traffic_message: Option<String>,
    pub traffic_type: TrafficKind,
}

impl Departure {
    /// Merge disruption context from the cached timetable for this
    /// departure's line and direction.
    ///
    /// - No timetable: the alert flag is dropped, there is nothing to show.
    /// - Alert with a disruption label: the label becomes the message.
    /// - Alert without a label: upstream flags schedule footnotes (e.g.
    ///   weekday-only runs) the same way as disruptions, so the flag is
    ///   cleared.
    pub fn apply_schedule(&mut self, schedule: Option<&ScheduleEntry>) {
        let label = match schedule {
            Some(schedule) if self.has_traffic_alert => schedule.disruption(),
            _ => None,
        };

        match label {
            Some(label) => {
                self.traffic_message = Some(label.to_string());
                self.traffic_type = TrafficKind::Alert;
            }
            None => {
                self.has_traffic_alert = false;
                self.traffic_message = None;
            }
        }
    }
}
