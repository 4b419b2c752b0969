//! Configuration for recording, retries and the external services.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Accuracy requested from the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccuracyTier {
    Lowest,
    Low,
    Balanced,
    High,
    Highest,
    /// Highest accuracy plus sensor fusion, intended for turn-by-turn use.
    BestForNavigation,
}

/// Subscription parameters handed to the location provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Requested accuracy. Default: `BestForNavigation`
    pub accuracy: AccuracyTier,

    /// Minimum time between two updates in milliseconds.
    /// Default: 100
    pub min_interval_ms: u64,

    /// Minimum movement between two updates in meters.
    /// Default: 1.0
    pub min_distance_meters: f64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            accuracy: AccuracyTier::BestForNavigation,
            min_interval_ms: 100,
            min_distance_meters: 1.0,
        }
    }
}

/// Retry behaviour for recoverable network failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Default: 3
    pub max_retries: u32,

    /// Base of the exponential backoff: retry `n` waits `base * 2^n`.
    /// Default: 200 ms
    pub base_backoff_ms: u64,
}

impl RetryPolicy {
    /// Backoff to wait before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_backoff_ms.saturating_mul(1 << attempt.min(6)))
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self { max_retries: 0, base_backoff_ms: 0 }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 200,
        }
    }
}

/// Top-level configuration for an activity session and its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Location subscription parameters.
    pub watch: WatchConfig,

    /// Retry policy applied by the session to directions and save requests.
    pub retry: RetryPolicy,

    /// Route points between two direction arrows. Default: 5
    pub arrow_stride: usize,

    /// Directions endpoint (JSON). Default: Google Directions API
    pub directions_base_url: String,

    /// API key appended to directions requests.
    pub directions_api_key: String,

    /// Base URL of the activity persistence API. Default: http://localhost:3033/api
    pub persistence_base_url: String,

    /// Per-request timeout in seconds. Default: 30
    pub request_timeout_secs: u64,

    /// Name used when an activity is saved without one. When `None` the name is
    /// derived from the time of day the activity started.
    pub default_activity_name: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            watch: WatchConfig::default(),
            retry: RetryPolicy::default(),
            arrow_stride: 5,
            directions_base_url: "https://maps.googleapis.com/maps/api/directions/json".to_string(),
            directions_api_key: String::new(),
            persistence_base_url: "http://localhost:3033/api".to_string(),
            request_timeout_secs: 30,
            default_activity_name: None,
        }
    }
}

impl TrackerConfig {
    /// Defaults overlaid with `TRACKER_*` environment variables.
    ///
    /// Unset or unparsable variables keep their default value.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let directions_base_url = std::env::var("TRACKER_DIRECTIONS_URL")
            .unwrap_or(defaults.directions_base_url);

        let directions_api_key = std::env::var("TRACKER_DIRECTIONS_KEY")
            .unwrap_or(defaults.directions_api_key);

        let persistence_base_url = std::env::var("TRACKER_PERSISTENCE_URL")
            .unwrap_or(defaults.persistence_base_url);

        let request_timeout_secs = std::env::var("TRACKER_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        Self {
            directions_base_url,
            directions_api_key,
            persistence_base_url,
            request_timeout_secs,
            ..defaults
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
