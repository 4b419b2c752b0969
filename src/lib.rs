//! # Activity Tracker
//!
//! GPS activity recording and route analytics for a personal tracking client.
//!
//! This library provides:
//! - An ordered sample buffer fed by a push-based location provider
//! - Distance, duration, average speed and time-of-day summaries
//! - An encoded polyline codec for exchanging geometry with a directions service
//! - A return-to-start overlay with direction arrows
//! - An explicit session state machine tying recording, summary and save together
//!
//! ## Features
//!
//! - **`http`** (default) - reqwest clients for the directions service and persistence API
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use activity_tracker::{analytics, GeoPoint};
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let track = vec![
//!     GeoPoint::new(45.4215, -75.6972),
//!     GeoPoint::new(45.4225, -75.6972),
//!     GeoPoint::new(45.4235, -75.6972),
//! ];
//!
//! let start = Utc.with_ymd_and_hms(2024, 5, 4, 7, 30, 0).unwrap();
//! let end = start + Duration::minutes(2);
//!
//! let distance = analytics::total_distance(&track);
//! let speed = analytics::average_speed_kmh(&track, start, end).unwrap();
//! println!("{:.0} m at {:.2} km/h", distance, speed);
//! ```

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{NetworkService, Result, TrackerError};

// Recording, retry and service configuration
pub mod config;
pub use config::{AccuracyTier, RetryPolicy, TrackerConfig, WatchConfig};

// Geographic utilities (distance, bearing, bounds)
pub mod geo_utils;

// Encoded polyline codec
pub mod polyline;

// Distance / duration / speed / period summaries
pub mod analytics;
pub use analytics::{ActivitySummary, Elapsed, Period};

// Live location sampling
pub mod location;
pub use location::{LocationEvent, LocationProvider, LocationStream, Permission, Subscription};

// Return-to-start directions and arrow markers
pub mod directions;
pub use directions::{ArrowMarker, DirectionsOverlay, DirectionsResult, DirectionsService};

// Activity persistence collaborator
pub mod persistence;
pub use persistence::{ActivityRecord, ActivityStore, StoredActivity};

// Map rendering payloads
pub mod map_view;
pub use map_view::{FitRequest, MapFrame};

// Activity session state machine
pub mod session;
pub use session::{ActivitySession, SessionCanceller, SessionEvent, SessionState};

// HTTP clients for the external services
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpActivityStore, HttpDirectionsClient};

// ============================================================================
// Core Types
// ============================================================================

/// A single location sample.
///
/// # Example
/// ```
/// use activity_tracker::GeoPoint;
/// let point = GeoPoint::new(45.4215, -75.6972); // Ottawa
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in m/s, when the provider reports it
    pub speed: Option<f64>,
    /// Heading in degrees (0-360), when the provider reports it
    pub heading: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl GeoPoint {
    /// Create a bare coordinate without speed, heading or time.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            speed: None,
            heading: None,
            timestamp: None,
        }
    }

    /// Attach a sample time.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach speed (m/s) and heading (degrees).
    pub fn with_motion(mut self, speed: Option<f64>, heading: Option<f64>) -> Self {
        self.speed = speed;
        self.heading = heading;
        self
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box for a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Get the center point of the bounds.
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// Chronologically ordered samples of one recording.
///
/// Appends are accepted until [`Track::freeze`] is called; a frozen track is
/// read-only for the rest of its life.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    points: Vec<GeoPoint>,
    frozen: bool,
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an open track from existing samples.
    pub fn from_points(points: Vec<GeoPoint>) -> Self {
        Self { points, frozen: false }
    }

    /// Append a sample. Returns `false` if the sample was rejected.
    ///
    /// Samples are rejected once the track is frozen, and when their timestamp
    /// is earlier than the last timestamped sample, keeping times non-decreasing.
    pub fn push(&mut self, point: GeoPoint) -> bool {
        if self.frozen {
            debug!("[Track] Dropping sample on frozen track");
            return false;
        }

        if let (Some(ts), Some(last)) = (point.timestamp, self.last_timestamp()) {
            if ts < last {
                debug!("[Track] Dropping out-of-order sample at {} (last {})", ts, last);
                return false;
            }
        }

        self.points.push(point);
        true
    }

    /// Stop accepting samples.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&GeoPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&GeoPoint> {
        self.points.last()
    }

    fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.iter().rev().find_map(|p| p.timestamp)
    }
}

impl AsRef<[GeoPoint]> for Track {
    fn as_ref(&self) -> &[GeoPoint] {
        &self.points
    }
}

// ============================================================================
// Tests
// ============================================================================
