//! Departure board server for the TAN Nantes network.
//!
//! Polls the live waiting-time feed of each configured stop, enriches
//! departures with the day's timetable and disruption notices, and serves
//! the resulting snapshots over HTTP.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod registry;
pub mod tan;
pub mod web;
