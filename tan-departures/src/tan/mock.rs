//! Mock TAN client for testing without API access.
//!
//! Serves canned payloads registered in memory or loaded from JSON files,
//! and records what was asked of it.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::coordinator::TransitFeed;
use crate::domain::ScheduleKey;

use super::error::TanError;
use super::types::{RawDeparture, RawSchedule};

#[derive(Debug, Default)]
struct MockState {
    waiting: HashMap<String, Vec<RawDeparture>>,
    schedules: HashMap<ScheduleKey, RawSchedule>,
    failing_stops: HashSet<String>,
    failing_schedules: HashSet<ScheduleKey>,
    schedule_calls: Vec<ScheduleKey>,
    waiting_calls: usize,
    in_flight: usize,
    max_in_flight: usize,
}

/// Mock TAN client that serves canned data.
///
/// Clones share state, so a test can keep a handle after handing a clone
/// to a coordinator.
#[derive(Debug, Clone, Default)]
pub struct MockTanClient {
    state: Arc<Mutex<MockState>>,
}

impl MockTanClient {
    /// Create a mock with no data: every request fails with a 404.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load canned responses from a directory.
    ///
    /// Expects `waiting/{stop}.json` files holding `tempsattente` arrays and
    /// `schedules/{stop}_{line}_{direction}.json` files holding
    /// `horairesarret` objects. Either subdirectory may be absent.
    pub fn from_dir(data_dir: impl AsRef<Path>) -> Result<Self, TanError> {
        let data_dir = data_dir.as_ref();
        let mock = Self::new();

        for (stop, path) in json_files(&data_dir.join("waiting"))? {
            let records: Vec<RawDeparture> = read_json(&path)?;
            mock.set_waiting_times(stop, records);
        }

        for (name, path) in json_files(&data_dir.join("schedules"))? {
            let key = parse_schedule_file_name(&name).ok_or_else(|| TanError::Api {
                status: 0,
                message: format!("invalid schedule file name: {name}"),
            })?;
            let schedule: RawSchedule = read_json(&path)?;
            mock.set_schedule(key, schedule);
        }

        if mock.lock().waiting.is_empty() {
            return Err(TanError::Api {
                status: 0,
                message: format!("no mock waiting-time files found in {}", data_dir.display()),
            });
        }

        Ok(mock)
    }

    /// Serve `records` as the live feed for `stop_id`.
    pub fn set_waiting_times(&self, stop_id: impl Into<String>, records: Vec<RawDeparture>) {
        let stop_id = stop_id.into();
        let mut state = self.lock();
        state.failing_stops.remove(&stop_id);
        state.waiting.insert(stop_id, records);
    }

    /// Serve `schedule` for `key`.
    pub fn set_schedule(&self, key: ScheduleKey, schedule: RawSchedule) {
        let mut state = self.lock();
        state.failing_schedules.remove(&key);
        state.schedules.insert(key, schedule);
    }

    /// Make the live feed for `stop_id` fail with a 503.
    pub fn fail_waiting_times(&self, stop_id: impl Into<String>) {
        self.lock().failing_stops.insert(stop_id.into());
    }

    /// Make the schedule for `key` fail with a 503.
    pub fn fail_schedule(&self, key: ScheduleKey) {
        self.lock().failing_schedules.insert(key);
    }

    /// Every schedule key requested so far, in request order.
    pub fn schedule_calls(&self) -> Vec<ScheduleKey> {
        self.lock().schedule_calls.clone()
    }

    /// Number of live-feed requests so far.
    pub fn waiting_calls(&self) -> usize {
        self.lock().waiting_calls
    }

    /// Highest number of schedule requests that were in flight together.
    pub fn max_concurrent_schedule_calls(&self) -> usize {
        self.lock().max_in_flight
    }

    /// List stops that have canned live data.
    pub fn available_stops(&self) -> Vec<String> {
        let mut stops: Vec<String> = self.lock().waiting.keys().cloned().collect();
        stops.sort();
        stops
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransitFeed for MockTanClient {
    async fn waiting_times(&self, stop_id: &str) -> Result<Vec<RawDeparture>, TanError> {
        let mut state = self.lock();
        state.waiting_calls += 1;

        if state.failing_stops.contains(stop_id) {
            return Err(unavailable());
        }

        state.waiting.get(stop_id).cloned().ok_or_else(|| TanError::Api {
            status: 404,
            message: format!("no mock data for stop {stop_id}"),
        })
    }

    async fn stop_schedule(&self, key: &ScheduleKey) -> Result<RawSchedule, TanError> {
        {
            let mut state = self.lock();
            state.schedule_calls.push(key.clone());
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }

        // Let sibling requests start before this one completes.
        tokio::task::yield_now().await;

        let mut state = self.lock();
        state.in_flight -= 1;

        if state.failing_schedules.contains(key) {
            return Err(unavailable());
        }

        state.schedules.get(key).cloned().ok_or_else(|| TanError::Api {
            status: 404,
            message: format!("no mock schedule for {key}"),
        })
    }
}

fn unavailable() -> TanError {
    TanError::Api {
        status: 503,
        message: "mock configured to fail".to_string(),
    }
}

/// `.json` files in `dir` as (file stem, path). A missing directory is empty.
fn json_files(dir: &Path) -> Result<Vec<(String, std::path::PathBuf)>, TanError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| TanError::Api {
        status: 0,
        message: format!("failed to read mock data directory {}: {e}", dir.display()),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| TanError::Api {
                status: 0,
                message: format!("failed to read directory entry: {e}"),
            })?
            .path();

        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }

        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            files.push((stem.to_string(), path.clone()));
        }
    }
    Ok(files)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, TanError> {
    let json = std::fs::read_to_string(path).map_err(|e| TanError::Api {
        status: 0,
        message: format!("failed to read {}: {e}", path.display()),
    })?;

    serde_json::from_str(&json).map_err(|e| TanError::Json {
        message: format!("{}: {e}", path.display()),
        body: None,
    })
}

/// `"COMM1_C1_2"` → key (COMM1, C1, 2). Splits from the right so stop
/// codes may contain underscores.
fn parse_schedule_file_name(name: &str) -> Option<ScheduleKey> {
    let mut parts = name.rsplitn(3, '_');
    let direction = parts.next()?.parse().ok()?;
    let line = parts.next()?;
    let stop = parts.next()?;
    if stop.is_empty() || line.is_empty() {
        return None;
    }
    Some(ScheduleKey::new(stop, line, direction))
}
