//! TAN open-data API response DTOs.
//!
//! These types map directly to the JSON returned by `tempsattente.json`
//! and `horairesarret.json`. Every field is optional: upstream omits
//! fields rather than sending nulls, and a missing field must not make a
//! whole payload unreadable. Defaulting happens in [`super::convert`].

use serde::Deserialize;

/// A JSON scalar that upstream sends as either a string or a number
/// (`numLigne` and `typeLigne` vary between lines).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LooseString {
    Text(String),
    Number(serde_json::Number),
}

impl LooseString {
    /// Render as a string regardless of the wire representation.
    pub fn into_string(self) -> String {
        match self {
            LooseString::Text(s) => s,
            LooseString::Number(n) => n.to_string(),
        }
    }
}

/// One record from `tempsattente.json/{stop}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeparture {
    /// Direction of travel (1 or 2).
    pub sens: Option<u8>,

    /// Terminus shown on the vehicle.
    pub terminus: Option<String>,

    /// Whether a traffic notice exists for this line.
    pub infotrafic: Option<bool>,

    /// Waiting time, e.g. "5 mn", "proche".
    pub temps: Option<String>,

    /// Line information.
    pub ligne: Option<RawLineRef>,

    /// Physical stop the vehicle calls at.
    pub arret: Option<RawStopRef>,
}

/// Line block of a live record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLineRef {
    pub num_ligne: Option<LooseString>,
    pub type_ligne: Option<LooseString>,
}

/// Stop block of a live record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStopRef {
    pub code_arret: Option<String>,
}

/// Response from `horairesarret.json/{stop}/{line}/{direction}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSchedule {
    /// Line metadata, including direction labels and disruption label.
    pub ligne: Option<RawScheduleLine>,

    /// Scheduled departures grouped by hour.
    #[serde(default)]
    pub horaires: Vec<RawHourEntry>,
}

/// Line block of a schedule response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawScheduleLine {
    pub num_ligne: Option<LooseString>,
    pub direction_sens1: Option<String>,
    pub direction_sens2: Option<String>,
    /// Line-level disruption text.
    pub libelle_trafic: Option<String>,
}

impl RawScheduleLine {
    /// The `directionSens{n}` label for a direction.
    pub fn direction_label(&self, direction: u8) -> Option<&str> {
        match direction {
            1 => self.direction_sens1.as_deref(),
            2 => self.direction_sens2.as_deref(),
            _ => None,
        }
    }
}

/// One hour of a schedule response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHourEntry {
    pub heure: Option<String>,
    pub passages: Option<Vec<String>>,
}
