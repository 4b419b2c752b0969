//! Activity persistence collaborator.
//!
//! Summaries are stored by a remote API as flat JSON records:
//!
//! ```json
//! {
//!   "name": "Morning Activity",
//!   "distanceMeter": 2500.0,
//!   "distanceInKm": 2.5,
//!   "averageSpeedKM": 10.0,
//!   "timestamp": "2024-05-04T07:30:00Z",
//!   "duration": "0h 15m 0s"
//! }
//! ```
//!
//! Listing returns the same records plus a server-assigned `id`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::analytics::{self, ActivitySummary};
use crate::error::Result;

/// Wire form of an [`ActivitySummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub name: String,
    pub distance_meter: f64,
    pub distance_in_km: f64,
    #[serde(rename = "averageSpeedKM")]
    pub average_speed_km: f64,
    /// Start of the activity
    pub timestamp: DateTime<Utc>,
    /// `"<h>h <m>m <s>s"`
    pub duration: String,
}

impl From<&ActivitySummary> for ActivityRecord {
    fn from(summary: &ActivitySummary) -> Self {
        Self {
            name: summary.name.clone(),
            distance_meter: round2(summary.distance_meters),
            distance_in_km: round2(summary.distance_km),
            average_speed_km: round2(summary.average_speed_kmh),
            timestamp: summary.start_time,
            duration: summary.elapsed().to_string(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A record as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredActivity {
    #[serde(alias = "_id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(flatten)]
    pub record: ActivityRecord,
}

impl StoredActivity {
    /// Stored distance rendered with the crate-wide unit policy.
    pub fn display_distance(&self) -> String {
        analytics::format_distance(self.record.distance_meter)
    }
}

// Ids come back as strings or integers depending on the backing database
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Remote activity storage.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn save(&self, record: &ActivityRecord) -> Result<()>;

    /// All stored activities, in the order the API returns them.
    async fn list(&self) -> Result<Vec<StoredActivity>>;

    async fn delete(&self, id: &str) -> Result<()>;
}
