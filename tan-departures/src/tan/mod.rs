//! TAN (Nantes public transport) open-data client.
//!
//! This module provides an HTTP client for the two endpoints the departure
//! board needs:
//! - `tempsattente.json/{stop}`: live waiting times for every line at a stop
//! - `horairesarret.json/{stop}/{line}/{direction}`: the day's timetable for
//!   one line and direction, with its disruption label
//!
//! Responses are deserialized into loose DTOs and turned into domain types
//! by [`convert`], the single place that decides what an absent field means.

mod client;
pub mod convert;
mod error;
pub mod mock;
mod types;

pub use client::{TanClient, TanConfig};
pub use convert::{ParsedDeparture, parse_departure, parse_schedule};
pub use error::TanError;
pub use mock::MockTanClient;
pub use types::{
    LooseString, RawDeparture, RawHourEntry, RawLineRef, RawSchedule, RawScheduleLine, RawStopRef,
};
