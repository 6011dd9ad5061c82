//! TAN open-data HTTP client.
//!
//! One bounded-time GET per call, no retries and no caching. Every
//! failure comes back as `Err(TanError)`.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::coordinator::TransitFeed;
use crate::domain::ScheduleKey;

use super::error::TanError;
use super::types::{RawDeparture, RawSchedule};

/// Default base URL for the TAN open-data API.
const DEFAULT_BASE_URL: &str = "https://open.tan.fr/ewp";

/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

const DEFAULT_USER_AGENT: &str = concat!("tan-departures/", env!("CARGO_PKG_VERSION"));

/// Configuration for the TAN client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TanConfig {
    /// Base URL for the API (defaults to open.tan.fr)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl TanConfig {
    /// Create a config pointing at the production API.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Default for TanConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// TAN open-data API client.
///
/// Cheap to clone: clones share one connection pool.
#[derive(Debug, Clone)]
pub struct TanClient {
    http: reqwest::Client,
    base_url: String,
}

impl TanClient {
    /// Create a new client with the given configuration.
    pub fn new(config: TanConfig) -> Result<Self, TanError> {
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| TanError::NotConfigured(format!("invalid user agent: {e}")))?;
        headers.insert(USER_AGENT, user_agent);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get waiting times for every line serving a stop.
    ///
    /// An empty list means no vehicle is expected, which is not an error.
    pub async fn get_waiting_times(&self, stop_id: &str) -> Result<Vec<RawDeparture>, TanError> {
        let url = waiting_time_url(&self.base_url, stop_id);
        let records: Option<Vec<RawDeparture>> = self.get_json(&url).await?;
        Ok(records.unwrap_or_default())
    }

    /// Get the day's timetable for one stop, line and direction.
    pub async fn get_stop_schedule(&self, key: &ScheduleKey) -> Result<RawSchedule, TanError> {
        let url = schedule_url(&self.base_url, key);
        let schedule: Option<RawSchedule> = self.get_json(&url).await?;
        schedule.ok_or_else(|| TanError::EmptyResponse(format!("schedule {key}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, TanError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TanError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;

        serde_json::from_str(&body).map_err(|e| TanError::Json {
            message: e.to_string(),
            body: Some(body.chars().take(500).collect()),
        })
    }
}

impl TransitFeed for TanClient {
    async fn waiting_times(&self, stop_id: &str) -> Result<Vec<RawDeparture>, TanError> {
        self.get_waiting_times(stop_id).await
    }

    async fn stop_schedule(&self, key: &ScheduleKey) -> Result<RawSchedule, TanError> {
        self.get_stop_schedule(key).await
    }
}

fn waiting_time_url(base_url: &str, stop_id: &str) -> String {
    format!("{base_url}/tempsattente.json/{stop_id}")
}

fn schedule_url(base_url: &str, key: &ScheduleKey) -> String {
    format!(
        "{}/horairesarret.json/{}/{}/{}",
        base_url, key.stop_id, key.line_number, key.direction
    )
}
