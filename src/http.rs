//! HTTP clients for the directions service and the activity persistence API.
//!
//! Both clients make a single attempt per call and report failures as
//! [`TrackerError::Network`]; retry and cancellation are decided by the
//! [`ActivitySession`](crate::ActivitySession) that owns the request.

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::config::TrackerConfig;
use crate::directions::DirectionsService;
use crate::error::{NetworkService, Result, TrackerError};
use crate::persistence::{ActivityRecord, ActivityStore, StoredActivity};
use crate::GeoPoint;

fn build_client(service: NetworkService, timeout: Duration) -> Result<Client> {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(30))
        .timeout(timeout)
        .build()
        .map_err(|e| TrackerError::network(service, format!("Failed to create HTTP client: {}", e)))
}

fn request_error(service: NetworkService, e: reqwest::Error) -> TrackerError {
    TrackerError::Network {
        service,
        message: format!("Request error: {}", e),
        status_code: e.status().map(|s| s.as_u16()),
    }
}

fn check_status(service: NetworkService, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(TrackerError::Network {
        service,
        message: format!("HTTP {}", status),
        status_code: Some(status.as_u16()),
    })
}

// ============================================================================
// Directions
// ============================================================================

/// Directions API response (only the fields we read).
#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    overview_polyline: ApiPolyline,
}

#[derive(Debug, Deserialize)]
struct ApiPolyline {
    points: String,
}

/// Query parameters of a directions request.
fn directions_query(origin: &GeoPoint, destination: &GeoPoint, api_key: &str) -> Vec<(&'static str, String)> {
    vec![
        ("origin", format!("{},{}", origin.latitude, origin.longitude)),
        ("destination", format!("{},{}", destination.latitude, destination.longitude)),
        ("key", api_key.to_string()),
    ]
}

/// HTTP code matching a directions API status, so only transient statuses retry.
fn status_equivalent(status: &str) -> Option<u16> {
    match status {
        "OVER_QUERY_LIMIT" => Some(429),
        "UNKNOWN_ERROR" => None,
        "REQUEST_DENIED" => Some(403),
        _ => Some(400),
    }
}

/// Extract the primary route's polyline. "No route" is `Ok(None)`.
fn parse_directions(bytes: &[u8]) -> Result<Option<String>> {
    let data: DirectionsResponse = serde_json::from_slice(bytes).map_err(|e| {
        TrackerError::network(NetworkService::Directions, format!("JSON parse error: {}", e))
    })?;

    match data.status.as_deref() {
        None | Some("OK") | Some("ZERO_RESULTS") | Some("NOT_FOUND") => {}
        Some(status) => {
            let detail = data.error_message.unwrap_or_default();
            return Err(TrackerError::Network {
                service: NetworkService::Directions,
                message: format!("Directions status {} {}", status, detail).trim_end().to_string(),
                status_code: status_equivalent(status),
            });
        }
    }

    Ok(data.routes.into_iter().next().map(|r| r.overview_polyline.points))
}

/// Client for a Google-compatible directions JSON endpoint.
pub struct HttpDirectionsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpDirectionsClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(NetworkService::Directions, timeout)?,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        Self::new(
            config.directions_base_url.clone(),
            config.directions_api_key.clone(),
            config.request_timeout(),
        )
    }
}

#[async_trait]
impl DirectionsService for HttpDirectionsClient {
    async fn route_polyline(&self, origin: &GeoPoint, destination: &GeoPoint) -> Result<Option<String>> {
        let start = Instant::now();
        let service = NetworkService::Directions;

        let resp = self
            .client
            .get(&self.base_url)
            .query(&directions_query(origin, destination, &self.api_key))
            .send()
            .await
            .map_err(|e| request_error(service, e))?;
        let resp = check_status(service, resp)?;
        let bytes = resp.bytes().await.map_err(|e| request_error(service, e))?;

        let result = parse_directions(&bytes);
        match &result {
            Ok(Some(points)) => info!(
                "[DirectionsClient] Route in {:?} ({:.1}KB, {} polyline chars)",
                start.elapsed(),
                bytes.len() as f64 / 1024.0,
                points.len()
            ),
            Ok(None) => info!("[DirectionsClient] No route found ({:?})", start.elapsed()),
            Err(e) => warn!("[DirectionsClient] {}", e),
        }
        result
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Client for the activity REST API (`POST/GET {base}/activity`,
/// `DELETE {base}/activity/{id}`).
pub struct HttpActivityStore {
    client: Client,
    base_url: String,
}

impl HttpActivityStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(NetworkService::Persistence, timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        Self::new(config.persistence_base_url.clone(), config.request_timeout())
    }

    fn collection_url(&self) -> String {
        format!("{}/activity", self.base_url)
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/activity/{}", self.base_url, id)
    }
}

#[async_trait]
impl ActivityStore for HttpActivityStore {
    async fn save(&self, record: &ActivityRecord) -> Result<()> {
        let service = NetworkService::Persistence;
        let resp = self
            .client
            .post(self.collection_url())
            .json(record)
            .send()
            .await
            .map_err(|e| request_error(service, e))?;
        check_status(service, resp)?;
        info!("[ActivityStore] Saved '{}'", record.name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredActivity>> {
        let service = NetworkService::Persistence;
        let resp = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .map_err(|e| request_error(service, e))?;
        let resp = check_status(service, resp)?;
        let activities: Vec<StoredActivity> = resp.json().await.map_err(|e| {
            TrackerError::network(service, format!("JSON parse error: {}", e))
        })?;
        debug!("[ActivityStore] Listed {} activities", activities.len());
        Ok(activities)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let service = NetworkService::Persistence;
        let resp = self
            .client
            .delete(self.item_url(id))
            .send()
            .await
            .map_err(|e| request_error(service, e))?;
        check_status(service, resp)?;
        info!("[ActivityStore] Deleted activity {}", id);
        Ok(())
    }
}
