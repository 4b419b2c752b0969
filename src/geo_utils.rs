//! # Geographic Utilities
//!
//! Distance and direction between GPS samples.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two points |
//! | [`polyline_length`] | Total length of a track in meters |
//! | [`bearing_degrees`] | Planar angle from one point to another, for arrow markers |
//! | [`compute_bounds`] | Bounding box of a track |
//!
//! ## Example
//!
//! ```rust
//! use activity_tracker::{GeoPoint, geo_utils};
//!
//! let track = vec![
//!     GeoPoint::new(45.4215, -75.6972),
//!     GeoPoint::new(45.4221, -75.6980),
//!     GeoPoint::new(45.4230, -75.6991),
//! ];
//!
//! let length = geo_utils::polyline_length(&track);
//! println!("Track length: {:.0}m", length);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! Distances use the haversine formula on a sphere of radius 6,371,000 m, not
//! `geo`'s mean radius of 6,371,008.8 m.
//!
//! ### Bearing
//!
//! [`bearing_degrees`] is `atan2(Δlat, Δlng)` in degrees: a flat-plane angle that is
//! only meaningful over the short distances between neighbouring route points. It
//! is not a compass bearing and must not be used for navigation over long ranges.

use geo::{BoundingRect, Coord, LineString};

use crate::{Bounds, GeoPoint};

/// Mean Earth radius in meters used for all distance calculations.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two points using the haversine formula.
///
/// Returns meters. The result is symmetric and zero for identical points.
///
/// # Example
///
/// ```rust
/// use activity_tracker::{GeoPoint, geo_utils};
///
/// let london = GeoPoint::new(51.5074, -0.1278);
/// let paris = GeoPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0);
/// ```
#[inline]
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_METERS * c
}

/// Calculate the total length of a track in meters.
///
/// Sums the haversine distance between consecutive points. Empty or single-point
/// tracks return 0.0.
pub fn polyline_length(points: &[GeoPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Direction Functions
// =============================================================================

/// Planar angle in degrees of the vector from `a` to `b`.
///
/// Computed as `atan2(Δlat, Δlng)`, so 0° points east and 90° north. Short-range
/// approximation for orienting arrow markers along a rendered route.
///
/// # Example
///
/// ```rust
/// use activity_tracker::{GeoPoint, geo_utils};
///
/// let a = GeoPoint::new(0.0, 0.0);
/// let north = GeoPoint::new(0.001, 0.0);
/// assert!((geo_utils::bearing_degrees(&a, &north) - 90.0).abs() < 1e-9);
/// ```
#[inline]
pub fn bearing_degrees(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = b.latitude - a.latitude;
    let d_lng = b.longitude - a.longitude;
    d_lat.atan2(d_lng).to_degrees()
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a track, `None` when it has no points.
pub fn compute_bounds(points: &[GeoPoint]) -> Option<Bounds> {
    let line: LineString = points
        .iter()
        .map(|p| Coord { x: p.longitude, y: p.latitude })
        .collect();

    line.bounding_rect().map(|rect| Bounds {
        min_lat: rect.min().y,
        max_lat: rect.max().y,
        min_lng: rect.min().x,
        max_lng: rect.max().x,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
