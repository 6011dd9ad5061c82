//! Departure coordinator: one per monitored stop.
//!
//! Each refresh cycle:
//! 1. empties the schedule cache if the day changed,
//! 2. fetches the live feed (a failure here fails the cycle),
//! 3. fetches every timetable the feed refers to that is not cached yet,
//!    all at once, tolerating individual failures,
//! 4. merges disruption labels into the departures and builds the
//!    timetable map,
//! 5. publishes the result as a new [`Snapshot`].
//!
//! Cycles are serialised: the cache lives behind an async mutex that a
//! cycle holds from start to finish, so two cycles can never interleave
//! a day rollover with a lookup, and the cache has a single writer.
//! Readers only ever see whole snapshots.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::{CacheConfig, ScheduleCache};
use crate::domain::{ScheduleEntry, ScheduleKey, Snapshot};
use crate::tan::{ParsedDeparture, RawDeparture, RawSchedule, TanError, parse_departure, parse_schedule};

/// Source of live waiting times and stop timetables.
///
/// Implemented by [`crate::tan::TanClient`] for the real API and by
/// [`crate::tan::MockTanClient`] for tests. Both calls are single
/// bounded-time requests that report every failure as `Err`.
pub trait TransitFeed: Send + Sync {
    /// Live waiting times at `stop_id`. `Ok(vec![])` means no service.
    fn waiting_times(
        &self,
        stop_id: &str,
    ) -> impl Future<Output = Result<Vec<RawDeparture>, TanError>> + Send;

    /// Timetable for one stop, line and direction.
    fn stop_schedule(
        &self,
        key: &ScheduleKey,
    ) -> impl Future<Output = Result<RawSchedule, TanError>> + Send;
}

/// A refresh cycle that produced no snapshot.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The live feed could not be fetched. Cached timetables are not used
    /// to paper over this.
    #[error("live departures unavailable for stop {stop_id}: {source}")]
    LiveFeed {
        stop_id: String,
        #[source]
        source: TanError,
    },
}

/// Outcome history of the refresh cycles, for consumers that need to know
/// whether the snapshot they read is current.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStatus {
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

impl RefreshStatus {
    /// Whether the most recent cycle succeeded.
    pub fn is_available(&self) -> bool {
        self.last_success.is_some() && self.consecutive_failures == 0
    }

    fn record_success(&mut self, at: DateTime<Utc>) {
        self.last_success = Some(at);
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self, at: DateTime<Utc>, error: &RefreshError) {
        self.last_failure = Some(at);
        self.last_error = Some(error.to_string());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }
}

/// Polls one stop and publishes enriched departure snapshots.
pub struct DepartureCoordinator<C> {
    stop_id: String,
    label: String,
    client: C,

    /// Held for the whole of a cycle.
    cache: Mutex<ScheduleCache>,

    published: RwLock<Option<Arc<Snapshot>>>,
    status: RwLock<RefreshStatus>,
}

impl<C: TransitFeed> DepartureCoordinator<C> {
    /// Create a coordinator for `stop_id` with an empty cache and no
    /// published snapshot.
    pub fn new(
        stop_id: impl Into<String>,
        label: impl Into<String>,
        client: C,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            stop_id: stop_id.into(),
            label: label.into(),
            client,
            cache: Mutex::new(ScheduleCache::new(cache_config)),
            published: RwLock::new(None),
            status: RwLock::new(RefreshStatus::default()),
        }
    }

    /// Stop code this coordinator polls.
    pub fn stop_id(&self) -> &str {
        &self.stop_id
    }

    /// Display label of the stop.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The last published snapshot, or `None` before the first successful
    /// cycle.
    pub async fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.published.read().await.clone()
    }

    /// Outcome of recent cycles.
    pub async fn status(&self) -> RefreshStatus {
        self.status.read().await.clone()
    }

    /// The published snapshot together with the status recorded by the
    /// same cycle.
    pub async fn current(&self) -> (Option<Arc<Snapshot>>, RefreshStatus) {
        // Same lock order as the writer in `refresh_on`.
        let published = self.published.read().await;
        let status = self.status.read().await;
        (published.clone(), status.clone())
    }

    /// Run one cycle for the local calendar day.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, RefreshError> {
        self.refresh_on(Local::now().date_naive()).await
    }

    /// Run one cycle as if the local calendar day were `today`.
    ///
    /// On failure the previously published snapshot stays in place.
    pub async fn refresh_on(&self, today: NaiveDate) -> Result<Arc<Snapshot>, RefreshError> {
        let mut cache = self.cache.lock().await;

        match self.run_cycle(&mut cache, today).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                {
                    let mut published = self.published.write().await;
                    let mut status = self.status.write().await;
                    *published = Some(Arc::clone(&snapshot));
                    status.record_success(Utc::now());
                }
                let timetabled: usize = snapshot
                    .schedules
                    .values()
                    .map(|entry| entry.hourly_minutes.departure_count())
                    .sum();
                info!(
                    stop = %self.stop_id,
                    departures = snapshot.next_departures.len(),
                    schedules = snapshot.schedules.len(),
                    timetabled,
                    "Published departure snapshot"
                );
                Ok(snapshot)
            }
            Err(e) => {
                self.status.write().await.record_failure(Utc::now(), &e);
                warn!(stop = %self.stop_id, error = %e, "Refresh failed, keeping previous snapshot");
                Err(e)
            }
        }
    }

    async fn run_cycle(
        &self,
        cache: &mut ScheduleCache,
        today: NaiveDate,
    ) -> Result<Snapshot, RefreshError> {
        if cache.roll_over(today) {
            debug!(stop = %self.stop_id, %today, "Cleared schedule cache for new day");
        }

        let records = self
            .client
            .waiting_times(&self.stop_id)
            .await
            .map_err(|source| RefreshError::LiveFeed {
                stop_id: self.stop_id.clone(),
                source,
            })?;

        if records.is_empty() {
            return Ok(Snapshot::empty());
        }

        let parsed: Vec<ParsedDeparture> = records.into_iter().map(parse_departure).collect();

        let keys = distinct_keys(&parsed);
        let missing = cache.missing(&keys);
        debug!(
            stop = %self.stop_id,
            referenced = keys.len(),
            missing = missing.len(),
            "Resolved schedule keys"
        );

        for (key, entry) in self.fetch_schedules(missing).await {
            cache.insert(key, Arc::new(entry)).await;
        }

        Ok(assemble(parsed, cache).await)
    }

    /// Fetch every key concurrently. Failed keys are logged and left out;
    /// they are retried on the next cycle.
    async fn fetch_schedules(&self, keys: Vec<ScheduleKey>) -> Vec<(ScheduleKey, ScheduleEntry)> {
        if keys.is_empty() {
            return Vec::new();
        }

        let mut futures = Vec::with_capacity(keys.len());
        for key in keys {
            futures.push(async move {
                let result = self.client.stop_schedule(&key).await;
                (key, result)
            });
        }

        let results = join_all(futures).await;

        let mut fetched = Vec::with_capacity(results.len());
        for (key, result) in results {
            match result {
                Ok(raw) => {
                    let entry = parse_schedule(raw, &key);
                    fetched.push((key, entry));
                }
                Err(e) => {
                    warn!(
                        stop = %self.stop_id,
                        schedule = %key,
                        error = %e,
                        timeout = e.is_timeout(),
                        "Failed to fetch schedule, will retry next cycle"
                    );
                }
            }
        }
        fetched
    }
}

/// Distinct keys referenced by the departures, in first-seen order.
fn distinct_keys(parsed: &[ParsedDeparture]) -> Vec<ScheduleKey> {
    let mut seen = HashSet::new();
    parsed
        .iter()
        .filter_map(|p| p.key.as_ref())
        .filter(|key| seen.insert(*key))
        .cloned()
        .collect()
}

/// Enrich departures from the cache and collect the timetables to display.
async fn assemble(parsed: Vec<ParsedDeparture>, cache: &ScheduleCache) -> Snapshot {
    let mut next_departures = Vec::with_capacity(parsed.len());
    let mut schedules = BTreeMap::new();

    for ParsedDeparture { key, mut departure } in parsed {
        let entry = match &key {
            Some(key) => cache.get(key).await,
            None => None,
        };

        departure.apply_schedule(entry.as_deref());

        if let (Some(key), Some(entry)) = (key, entry)
            && entry.has_hours()
        {
            schedules
                .entry(key.snapshot_key())
                .or_insert_with(|| ScheduleEntry::clone(&entry));
        }

        next_departures.push(departure);
    }

    Snapshot {
        next_departures,
        schedules,
    }
}

/// Refresh `coordinator` every `period`, starting immediately.
///
/// Each cycle is awaited before the next tick is taken, and late ticks are
/// delayed rather than bunched, so cycles never overlap.
pub fn spawn_poller<C>(coordinator: Arc<DepartureCoordinator<C>>, period: Duration) -> JoinHandle<()>
where
    C: TransitFeed + 'static,
{
    tokio::spawn(async move {
        info!(stop = %coordinator.stop_id(), period_secs = period.as_secs(), "Starting departure poller");
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            // Failures are recorded in the coordinator's status.
            let _ = coordinator.refresh().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TrafficKind;
    use crate::tan::{
        LooseString, MockTanClient, RawHourEntry, RawLineRef, RawScheduleLine, RawStopRef,
    };

    const STOP: &str = "COMM";

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn live(stop: Option<&str>, line: Option<&str>, sens: Option<u8>, eta: &str, alert: bool) -> RawDeparture {
        RawDeparture {
            sens,
            terminus: Some("François Mitterrand".into()),
            infotrafic: Some(alert),
            temps: Some(eta.into()),
            ligne: line.map(|l| RawLineRef {
                num_ligne: Some(LooseString::Text(l.into())),
                type_ligne: Some(LooseString::Text("1".into())),
            }),
            arret: stop.map(|s| RawStopRef {
                code_arret: Some(s.into()),
            }),
        }
    }

    fn schedule(line: &str, hours: Vec<(&str, Vec<&str>)>, label: Option<&str>) -> RawSchedule {
        RawSchedule {
            ligne: Some(RawScheduleLine {
                num_ligne: Some(LooseString::Text(line.into())),
                direction_sens1: Some("François Mitterrand".into()),
                direction_sens2: None,
                libelle_trafic: label.map(str::to_string),
            }),
            horaires: hours
                .into_iter()
                .map(|(h, m)| RawHourEntry {
                    heure: Some(h.to_string()),
                    passages: Some(m.iter().map(|s| s.to_string()).collect()),
                })
                .collect(),
        }
    }

    fn coordinator(client: &MockTanClient) -> DepartureCoordinator<MockTanClient> {
        DepartureCoordinator::new(STOP, "Commerce", client.clone(), &CacheConfig::default())
    }

    #[tokio::test]
    async fn end_to_end_disruption_and_schedule() {
        let client = MockTanClient::new();
        client.set_waiting_times(STOP, vec![live(Some("S1"), Some("C1"), Some(1), "5 mn", true)]);
        client.set_schedule(
            ScheduleKey::new("S1", "C1", 1),
            schedule("C1", vec![("08", vec!["10"])], Some("Travaux")),
        );

        let snapshot = coordinator(&client).refresh_on(day(15)).await.unwrap();

        assert_eq!(snapshot.next_departures.len(), 1);
        let dep = &snapshot.next_departures[0];
        assert!(dep.has_traffic_alert);
        assert_eq!(dep.traffic_message.as_deref(), Some("Travaux"));
        assert_eq!(dep.traffic_type, TrafficKind::Alert);
        assert_eq!(dep.eta_text, "5 mn");

        let sched = &snapshot.schedules["C1-1"];
        assert_eq!(
            serde_json::to_value(&sched.hourly_minutes).unwrap(),
            serde_json::json!({"08": ["10"]})
        );
        assert_eq!(sched.direction_label, "François Mitterrand");
        assert_eq!(sched.traffic_message.as_deref(), Some("Travaux"));
    }

    #[tokio::test]
    async fn alert_without_label_is_cleared() {
        let client = MockTanClient::new();
        client.set_waiting_times(STOP, vec![live(Some("S1"), Some("C1"), Some(1), "5 mn", true)]);
        client.set_schedule(
            ScheduleKey::new("S1", "C1", 1),
            schedule("C1", vec![("08", vec!["10"])], None),
        );

        let snapshot = coordinator(&client).refresh_on(day(15)).await.unwrap();

        let dep = &snapshot.next_departures[0];
        assert!(!dep.has_traffic_alert);
        assert_eq!(dep.traffic_message, None);
    }

    #[tokio::test]
    async fn records_without_key_are_listed_but_not_fetched() {
        let client = MockTanClient::new();
        client.set_waiting_times(
            STOP,
            vec![
                live(None, Some("C1"), Some(1), "1 mn", true),
                live(Some("S1"), None, Some(1), "2 mn", false),
                live(Some("S1"), Some("C1"), None, "3 mn", false),
            ],
        );

        let snapshot = coordinator(&client).refresh_on(day(15)).await.unwrap();

        assert_eq!(snapshot.next_departures.len(), 3);
        assert!(snapshot.schedules.is_empty());
        assert!(client.schedule_calls().is_empty());
        assert!(snapshot.next_departures.iter().all(|d| !d.has_traffic_alert));
    }

    #[tokio::test]
    async fn empty_feed_is_valid_no_service() {
        let client = MockTanClient::new();
        client.set_waiting_times(STOP, vec![]);
        let coord = coordinator(&client);

        let snapshot = coord.refresh_on(day(15)).await.unwrap();

        assert!(snapshot.is_empty());
        assert!(snapshot.schedules.is_empty());
        assert!(coord.status().await.is_available());
    }

    #[tokio::test]
    async fn same_day_refresh_hits_cache() {
        let client = MockTanClient::new();
        client.set_waiting_times(
            STOP,
            vec![
                live(Some("S1"), Some("C1"), Some(1), "5 mn", false),
                live(Some("S1"), Some("C1"), Some(1), "17 mn", false),
                live(Some("S2"), Some("2"), Some(2), "proche", false),
            ],
        );
        client.set_schedule(ScheduleKey::new("S1", "C1", 1), schedule("C1", vec![("08", vec!["10"])], None));
        client.set_schedule(ScheduleKey::new("S2", "2", 2), schedule("2", vec![("09", vec!["00"])], None));
        let coord = coordinator(&client);

        coord.refresh_on(day(15)).await.unwrap();
        assert_eq!(client.schedule_calls().len(), 2);

        let second = coord.refresh_on(day(15)).await.unwrap();
        assert_eq!(client.schedule_calls().len(), 2);
        assert_eq!(second.schedules.len(), 2);
        assert_eq!(second.next_departures.len(), 3);
    }

    #[tokio::test]
    async fn day_rollover_refetches() {
        let client = MockTanClient::new();
        let key = ScheduleKey::new("S1", "C1", 1);
        client.set_waiting_times(STOP, vec![live(Some("S1"), Some("C1"), Some(1), "5 mn", true)]);
        client.set_schedule(key.clone(), schedule("C1", vec![("08", vec!["10"])], Some("Travaux")));
        let coord = coordinator(&client);

        coord.refresh_on(day(15)).await.unwrap();

        // Upstream lifted the disruption overnight.
        client.set_schedule(key.clone(), schedule("C1", vec![("08", vec!["12"])], None));
        let snapshot = coord.refresh_on(day(16)).await.unwrap();

        assert_eq!(client.schedule_calls(), vec![key.clone(), key]);
        assert!(!snapshot.next_departures[0].has_traffic_alert);
        assert_eq!(
            snapshot.schedules["C1-1"].hourly_minutes.get("08"),
            Some(["12".to_string()].as_slice())
        );
    }

    #[tokio::test]
    async fn rollover_happens_even_when_live_feed_fails() {
        let client = MockTanClient::new();
        let key = ScheduleKey::new("S1", "C1", 1);
        client.set_waiting_times(STOP, vec![live(Some("S1"), Some("C1"), Some(1), "5 mn", false)]);
        client.set_schedule(key.clone(), schedule("C1", vec![("08", vec!["10"])], None));
        let coord = coordinator(&client);
        coord.refresh_on(day(15)).await.unwrap();

        client.fail_waiting_times(STOP);
        assert!(coord.refresh_on(day(16)).await.is_err());

        let cache = coord.cache.lock().await;
        assert_eq!(cache.cleared_on(), Some(day(16)));
        assert!(!cache.contains(&key));
    }

    #[tokio::test]
    async fn partial_schedule_failure_is_tolerated() {
        let client = MockTanClient::new();
        let failing = ScheduleKey::new("S1", "C1", 1);
        let working = ScheduleKey::new("S2", "2", 2);
        client.set_waiting_times(
            STOP,
            vec![
                live(Some("S1"), Some("C1"), Some(1), "5 mn", true),
                live(Some("S2"), Some("2"), Some(2), "8 mn", true),
            ],
        );
        client.fail_schedule(failing.clone());
        client.set_schedule(working.clone(), schedule("2", vec![("09", vec!["00"])], Some("Manifestation")));
        let coord = coordinator(&client);

        let snapshot = coord.refresh_on(day(15)).await.unwrap();

        {
            let cache = coord.cache.lock().await;
            assert!(cache.contains(&working));
            assert!(!cache.contains(&failing));
        }
        assert!(!snapshot.schedules.contains_key("C1-1"));
        assert!(snapshot.schedules.contains_key("2-2"));
        assert!(!snapshot.next_departures[0].has_traffic_alert);
        assert_eq!(
            snapshot.next_departures[1].traffic_message.as_deref(),
            Some("Manifestation")
        );

        // The failed key is retried, the cached one is not.
        coord.refresh_on(day(15)).await.unwrap();
        assert_eq!(client.schedule_calls(), vec![failing.clone(), working, failing]);
    }

    #[tokio::test]
    async fn schedules_are_fetched_concurrently() {
        let client = MockTanClient::new();
        let records = (1..=4)
            .map(|i| live(Some("S1"), Some(i.to_string().as_str()), Some(1), "5 mn", false))
            .collect();
        client.set_waiting_times(STOP, records);
        for i in 1..=4 {
            client.set_schedule(
                ScheduleKey::new("S1", format!("{i}"), 1),
                schedule(&format!("{i}"), vec![("08", vec!["10"])], None),
            );
        }

        coordinator(&client).refresh_on(day(15)).await.unwrap();

        assert_eq!(client.schedule_calls().len(), 4);
        assert_eq!(client.max_concurrent_schedule_calls(), 4);
    }

    #[tokio::test]
    async fn empty_timetable_is_cached_but_not_published() {
        let client = MockTanClient::new();
        let key = ScheduleKey::new("S1", "NA", 1);
        client.set_waiting_times(STOP, vec![live(Some("S1"), Some("NA"), Some(1), "4 mn", false)]);
        client.set_schedule(key.clone(), schedule("NA", vec![], None));
        let coord = coordinator(&client);

        let snapshot = coord.refresh_on(day(15)).await.unwrap();
        assert!(snapshot.schedules.is_empty());
        assert!(coord.cache.lock().await.contains(&key));

        coord.refresh_on(day(15)).await.unwrap();
        assert_eq!(client.schedule_calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_cycle_keeps_previous_snapshot() {
        let client = MockTanClient::new();
        client.set_waiting_times(STOP, vec![live(Some("S1"), Some("C1"), Some(1), "5 mn", false)]);
        let coord = coordinator(&client);

        assert!(coord.snapshot().await.is_none());
        let first = coord.refresh_on(day(15)).await.unwrap();

        client.fail_waiting_times(STOP);
        let err = coord.refresh_on(day(15)).await.unwrap_err();
        assert!(matches!(err, RefreshError::LiveFeed { .. }));

        let current = coord.snapshot().await.unwrap();
        assert!(Arc::ptr_eq(&first, &current));

        let status = coord.status().await;
        assert!(!status.is_available());
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_error.unwrap().contains("COMM"));
        assert!(status.last_success.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn snapshot_and_status_are_published_together() {
        let client = MockTanClient::new();
        client.set_waiting_times(STOP, vec![live(Some("S1"), Some("C1"), Some(1), "5 mn", false)]);
        let coord = Arc::new(coordinator(&client));

        let reader = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move {
                loop {
                    let (snapshot, status) = coord.current().await;
                    if snapshot.is_some() {
                        assert!(status.last_success.is_some());
                        return;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let first = coord.refresh_on(day(15)).await.unwrap();
        reader.await.unwrap();

        client.fail_waiting_times(STOP);
        coord.refresh_on(day(15)).await.unwrap_err();

        let (snapshot, status) = coord.current().await;
        assert!(Arc::ptr_eq(&first, &snapshot.unwrap()));
        assert_eq!(status.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn live_feed_failure_before_first_success() {
        let client = MockTanClient::new();
        client.fail_waiting_times(STOP);
        let coord = coordinator(&client);

        assert!(coord.refresh_on(day(15)).await.is_err());
        assert!(coord.snapshot().await.is_none());
        assert!(!coord.status().await.is_available());
    }

    #[tokio::test]
    async fn concurrent_refreshes_do_not_overlap() {
        let client = MockTanClient::new();
        client.set_waiting_times(STOP, vec![live(Some("S1"), Some("C1"), Some(1), "5 mn", false)]);
        client.set_schedule(ScheduleKey::new("S1", "C1", 1), schedule("C1", vec![("08", vec!["10"])], None));
        let coord = Arc::new(coordinator(&client));

        let (a, b) = tokio::join!(coord.refresh_on(day(15)), coord.refresh_on(day(15)));
        assert!(a.is_ok() && b.is_ok());

        // The second cycle saw the first one's cache entry.
        assert_eq!(client.schedule_calls().len(), 1);
    }

    #[test]
    fn distinct_keys_preserve_first_seen_order() {
        let parsed: Vec<ParsedDeparture> = [
            live(Some("S2"), Some("2"), Some(2), "1 mn", false),
            live(Some("S1"), Some("C1"), Some(1), "2 mn", false),
            live(Some("S2"), Some("2"), Some(2), "9 mn", false),
        ]
        .into_iter()
        .map(parse_departure)
        .collect();

        assert_eq!(
            distinct_keys(&parsed),
            vec![ScheduleKey::new("S2", "2", 2), ScheduleKey::new("S1", "C1", 1)]
        );
    }

    #[tokio::test]
    async fn poller_refreshes_immediately() {
        let client = MockTanClient::new();
        client.set_waiting_times(STOP, vec![]);
        let coord = Arc::new(coordinator(&client));

        let handle = spawn_poller(Arc::clone(&coord), Duration::from_secs(3600));
        for _ in 0..100 {
            if coord.snapshot().await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert!(coord.snapshot().await.is_some());
        assert_eq!(client.waiting_calls(), 1);
    }
}
