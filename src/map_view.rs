//! Payloads for the map rendering surface.
//!
//! The renderer draws the recorded track and the return-trip extension as
//! polylines, places the arrows, and optionally fits the camera to a set of
//! coordinates. Nothing here is persisted; frames are rebuilt whenever the
//! route changes.

use serde::{Deserialize, Serialize};

use crate::directions::ArrowMarker;
use crate::{geo_utils, GeoPoint};

/// Map centre used before any position is known (Ottawa).
pub const DEFAULT_CENTER: GeoPoint = GeoPoint {
    latitude: 45.4215,
    longitude: -75.6972,
    speed: None,
    heading: None,
    timestamp: None,
};

/// Span in degrees of a camera that follows the user.
pub const FOLLOW_SPAN_DEGREES: f64 = 0.001;

/// Region shown before any position is known.
pub const DEFAULT_REGION: Region = Region {
    center: DEFAULT_CENTER,
    latitude_delta: FOLLOW_SPAN_DEGREES,
    longitude_delta: FOLLOW_SPAN_DEGREES,
};

/// Visible area of the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub center: GeoPoint,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl Region {
    /// Tight region around a single point.
    pub fn around(center: GeoPoint) -> Self {
        Self {
            center,
            latitude_delta: FOLLOW_SPAN_DEGREES,
            longitude_delta: FOLLOW_SPAN_DEGREES,
        }
    }
}

impl Default for Region {
    fn default() -> Self {
        DEFAULT_REGION
    }
}

/// Insets in pixels kept free around fitted coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgePadding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl EdgePadding {
    pub fn uniform(pixels: f64) -> Self {
        Self { top: pixels, right: pixels, bottom: pixels, left: pixels }
    }
}

impl Default for EdgePadding {
    fn default() -> Self {
        Self::uniform(50.0)
    }
}

/// Ask the renderer to fit these coordinates on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRequest {
    pub coordinates: Vec<GeoPoint>,
    pub edge_padding: EdgePadding,
}

/// Position marker, rotated to the latest heading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionMarker {
    pub coordinate: GeoPoint,
    pub rotation_degrees: f64,
}

/// Everything the renderer needs for one redraw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapFrame {
    /// Recorded samples
    pub track: Vec<GeoPoint>,
    /// Display-only return route, never part of the summary
    pub extension: Vec<GeoPoint>,
    pub arrows: Vec<ArrowMarker>,
    pub region: Region,
    pub marker: Option<PositionMarker>,
    pub fit: Option<FitRequest>,
}

impl MapFrame {
    /// Frame that follows the user while recording.
    pub fn following(track: &[GeoPoint], current: Option<GeoPoint>) -> Self {
        let region = current.map(Region::around).unwrap_or_default();
        let marker = current.map(|p| PositionMarker {
            coordinate: p,
            rotation_degrees: p.heading.unwrap_or(0.0),
        });

        Self {
            track: track.to_vec(),
            extension: vec![],
            arrows: vec![],
            region,
            marker,
            fit: None,
        }
    }

    /// Frame showing the whole track plus any return route, fitted to both.
    pub fn overview(track: &[GeoPoint], extension: &[GeoPoint], arrows: &[ArrowMarker]) -> Self {
        let coordinates: Vec<GeoPoint> = track.iter().chain(extension).copied().collect();

        let region = geo_utils::compute_bounds(&coordinates)
            .map(|b| Region {
                center: b.center(),
                latitude_delta: (b.max_lat - b.min_lat).max(FOLLOW_SPAN_DEGREES),
                longitude_delta: (b.max_lng - b.min_lng).max(FOLLOW_SPAN_DEGREES),
            })
            .unwrap_or_default();

        let fit = if coordinates.is_empty() {
            None
        } else {
            Some(FitRequest { coordinates, edge_padding: EdgePadding::default() })
        };

        Self {
            track: track.to_vec(),
            extension: extension.to_vec(),
            arrows: arrows.to_vec(),
            region,
            marker: None,
            fit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_following_without_position_uses_default_region() {
        let frame = MapFrame::following(&[], None);
        assert_eq!(frame.region.center, DEFAULT_CENTER);
        assert_eq!(frame.region.latitude_delta, 0.001);
        assert!(frame.marker.is_none());
        assert!(frame.fit.is_none());
    }

    #[test]
    fn test_following_rotates_marker() {
        let current = GeoPoint::new(45.0, -75.0).with_motion(Some(3.0), Some(135.0));
        let frame = MapFrame::following(&[current], Some(current));
        assert_eq!(frame.region.center, current);
        assert_eq!(frame.marker.unwrap().rotation_degrees, 135.0);
    }

    #[test]
    fn test_overview_fits_track_and_extension() {
        let track = vec![GeoPoint::new(45.40, -75.70), GeoPoint::new(45.42, -75.70)];
        let extension = vec![GeoPoint::new(45.42, -75.68), GeoPoint::new(45.40, -75.70)];
        let frame = MapFrame::overview(&track, &extension, &[]);

        let fit = frame.fit.unwrap();
        assert_eq!(fit.coordinates.len(), 4);
        assert_eq!(fit.edge_padding, EdgePadding::uniform(50.0));
        assert!((frame.region.center.latitude - 45.41).abs() < 1e-9);
        assert!((frame.region.center.longitude - -75.69).abs() < 1e-9);
    }

    #[test]
    fn test_overview_of_nothing_has_no_fit() {
        let frame = MapFrame::overview(&[], &[], &[]);
        assert!(frame.fit.is_none());
        assert_eq!(frame.region, Region::default());
    }
}
