//! Domain types for the departure board.
//!
//! These are the typed entities built from upstream payloads at the parse
//! boundary in [`crate::tan`]. Nothing here knows about the wire format.

mod departure;
mod schedule;
mod snapshot;

pub use departure::{Departure, TrafficKind};
pub use schedule::{HourlyMinutes, ScheduleEntry, ScheduleKey};
pub use snapshot::Snapshot;
