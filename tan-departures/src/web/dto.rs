//! Data transfer objects for web responses.

use std::sync::Arc;

use serde::Serialize;

use crate::coordinator::RefreshStatus;
use crate::domain::{Departure, Snapshot};

/// Display state used when a stop has no upcoming departure.
pub const NO_DEPARTURE: &str = "No departure";

/// One monitored stop in the stop list.
#[derive(Debug, Serialize)]
pub struct StopSummary {
    pub stop_id: String,
    pub label: String,
    /// Whether the most recent refresh succeeded
    pub available: bool,
    /// Number of departures in the published snapshot, if any
    pub departures: Option<usize>,
    pub status: RefreshStatus,
}

/// Response listing every monitored stop.
#[derive(Debug, Serialize)]
pub struct StopListResponse {
    pub stops: Vec<StopSummary>,
}

/// The published snapshot of a stop.
#[derive(Debug, Serialize)]
pub struct StopSnapshotResponse {
    pub stop_id: String,
    pub label: String,
    pub available: bool,
    pub status: RefreshStatus,
    /// Shared with the coordinator, not copied
    pub snapshot: Arc<Snapshot>,
}

/// The next vehicle at a stop, for compact "next bus" displays.
#[derive(Debug, Serialize)]
pub struct NextDepartureResponse {
    pub stop_id: String,
    pub label: String,
    /// ETA of the next departure, or [`NO_DEPARTURE`]
    pub state: String,
    pub departure: Option<Departure>,
}

impl NextDepartureResponse {
    /// Build from a snapshot.
    pub fn from_snapshot(stop_id: &str, label: &str, snapshot: &Snapshot) -> Self {
        let departure = snapshot.next_departure().cloned();
        let state = departure
            .as_ref()
            .map_or_else(|| NO_DEPARTURE.to_string(), |d| d.eta_text.clone());

        Self {
            stop_id: stop_id.to_string(),
            label: label.to_string(),
            state,
            departure,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
