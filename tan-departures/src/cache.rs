//! Day-scoped cache of stop timetables.
//!
//! A TAN timetable is valid for the whole service day, so entries never
//! expire by age. Instead the cache is emptied lazily on the first refresh
//! whose date differs from the date of the last clear. Capacity is bounded
//! so a stop served by an unusual number of lines cannot grow it without
//! limit.

use std::sync::Arc;

use chrono::NaiveDate;
use moka::future::Cache as MokaCache;
use serde::Deserialize;

use crate::domain::{ScheduleEntry, ScheduleKey};

/// Cached timetable entry.
type Entry = Arc<ScheduleEntry>;

/// Configuration for the schedule cache.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached timetables per stop.
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_capacity: 512 }
    }
}

/// Timetables for one stop, keyed by (stop, line, direction).
pub struct ScheduleCache {
    entries: MokaCache<ScheduleKey, Entry>,

    max_capacity: u64,

    /// Date of the last clear; `None` until the first refresh.
    cleared_on: Option<NaiveDate>,
}

impl ScheduleCache {
    /// Create an empty cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: build_entries(config.max_capacity),
            max_capacity: config.max_capacity,
            cleared_on: None,
        }
    }

    /// Empty the cache if `today` is not the day it was last cleared on.
    ///
    /// Returns `true` when the cache was cleared. Must run before any
    /// lookup of the cycle so a timetable from yesterday is never served
    /// after midnight. The backing store is replaced outright rather than
    /// invalidated, so yesterday's entries are gone immediately.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.cleared_on == Some(today) {
            return false;
        }
        self.entries = build_entries(self.max_capacity);
        self.cleared_on = Some(today);
        true
    }

    /// Date of the last clear.
    pub fn cleared_on(&self) -> Option<NaiveDate> {
        self.cleared_on
    }

    /// Whether a timetable is cached for `key`.
    pub fn contains(&self, key: &ScheduleKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Get a cached timetable.
    pub async fn get(&self, key: &ScheduleKey) -> Option<Entry> {
        self.entries.get(key).await
    }

    /// Insert a timetable into the cache.
    pub async fn insert(&self, key: ScheduleKey, entry: Entry) {
        self.entries.insert(key, entry).await;
    }

    /// Keys from `keys` that have no cached timetable, in input order.
    pub fn missing<'k>(&self, keys: impl IntoIterator<Item = &'k ScheduleKey>) -> Vec<ScheduleKey> {
        keys.into_iter()
            .filter(|key| !self.contains(key))
            .cloned()
            .collect()
    }

    /// Number of cached timetables, after pending evictions are applied.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    /// Check if the cache holds no timetable.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn build_entries(max_capacity: u64) -> MokaCache<ScheduleKey, Entry> {
    MokaCache::builder().max_capacity(max_capacity).build()
}
