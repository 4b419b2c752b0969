//! Return-to-start directions with arrow markers.
//!
//! The overlay asks a [`DirectionsService`] for a route between two samples,
//! decodes the returned polyline and derives arrows along it for display.
//! A result is either complete (route and arrows) or an error; it is never
//! partially filled.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Result, TrackerError};
use crate::{geo_utils, polyline, GeoPoint};

/// Route points between two arrows unless configured otherwise.
pub const DEFAULT_ARROW_STRIDE: usize = 5;

/// A direction arrow placed on the route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArrowMarker {
    pub coordinate: GeoPoint,
    /// Planar angle, see [`geo_utils::bearing_degrees`]
    pub angle_degrees: f64,
}

/// Decoded route plus its arrows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionsResult {
    pub route: Vec<GeoPoint>,
    pub arrows: Vec<ArrowMarker>,
}

impl DirectionsResult {
    /// No route between the two points. A valid outcome, not an error.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.route.is_empty()
    }
}

/// External turn-by-turn directions service.
#[async_trait]
pub trait DirectionsService: Send + Sync {
    /// Encoded polyline of the primary route, `None` when no route exists.
    async fn route_polyline(&self, origin: &GeoPoint, destination: &GeoPoint) -> Result<Option<String>>;
}

/// Place an arrow every `stride` points.
///
/// The arrow at index `i` sits on `route[i]` and points towards
/// `route[min(i + stride, len - 1)]`. Indices run up to but excluding the last
/// point, so a route of `N >= 2` points yields `ceil((N - 1) / stride)` arrows;
/// shorter routes yield none.
///
/// # Example
/// ```
/// use activity_tracker::{directions, GeoPoint};
///
/// let route: Vec<GeoPoint> = (0..11)
///     .map(|i| GeoPoint::new(45.0 + i as f64 * 0.001, -75.0))
///     .collect();
///
/// let arrows = directions::compute_arrows(&route, 5);
/// assert_eq!(arrows.len(), 2);
/// ```
pub fn compute_arrows(route: &[GeoPoint], stride: usize) -> Vec<ArrowMarker> {
    if route.len() < 2 {
        return vec![];
    }

    let stride = stride.max(1);
    let last = route.len() - 1;

    (0..last)
        .step_by(stride)
        .map(|i| {
            let target = (i + stride).min(last);
            ArrowMarker {
                coordinate: route[i],
                angle_degrees: geo_utils::bearing_degrees(&route[i], &route[target]),
            }
        })
        .collect()
}

/// Fetches and prepares routes for display.
#[derive(Clone)]
pub struct DirectionsOverlay {
    service: Arc<dyn DirectionsService>,
    arrow_stride: usize,
}

impl DirectionsOverlay {
    pub fn new(service: Arc<dyn DirectionsService>) -> Self {
        Self::with_stride(service, DEFAULT_ARROW_STRIDE)
    }

    pub fn with_stride(service: Arc<dyn DirectionsService>, arrow_stride: usize) -> Self {
        Self { service, arrow_stride }
    }

    /// Request a route from `origin` to `destination`.
    ///
    /// Any request or decode failure is returned as
    /// [`TrackerError::RouteUnavailable`] carrying the cause.
    pub async fn fetch_route(&self, origin: &GeoPoint, destination: &GeoPoint) -> Result<DirectionsResult> {
        debug!(
            "[DirectionsOverlay] Requesting route ({:.5},{:.5}) -> ({:.5},{:.5})",
            origin.latitude, origin.longitude, destination.latitude, destination.longitude
        );

        let encoded = match self.service.route_polyline(origin, destination).await {
            Ok(Some(encoded)) => encoded,
            Ok(None) => {
                info!("[DirectionsOverlay] No route found");
                return Ok(DirectionsResult::empty());
            }
            Err(e) => return Err(unavailable(e)),
        };

        let route = polyline::decode(&encoded).map_err(unavailable)?;
        let arrows = compute_arrows(&route, self.arrow_stride);

        info!(
            "[DirectionsOverlay] Route with {} points, {} arrows",
            route.len(),
            arrows.len()
        );

        Ok(DirectionsResult { route, arrows })
    }
}

fn unavailable(cause: TrackerError) -> TrackerError {
    warn!("[DirectionsOverlay] Route unavailable: {}", cause);
    match cause {
        // Already wrapped by a nested overlay or the service itself
        TrackerError::RouteUnavailable { .. } => cause,
        other => TrackerError::RouteUnavailable { cause: Box::new(other) },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::NetworkService;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Service returning a fixed answer and counting calls.
    pub(crate) struct FakeDirections {
        pub answer: Result<Option<String>>,
        pub calls: AtomicUsize,
    }

    impl FakeDirections {
        pub fn returning(answer: Result<Option<String>>) -> Arc<Self> {
            Arc::new(Self { answer, calls: AtomicUsize::new(0) })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DirectionsService for FakeDirections {
        async fn route_polyline(&self, _origin: &GeoPoint, _destination: &GeoPoint) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn line(n: usize) -> Vec<GeoPoint> {
        (0..n).map(|i| GeoPoint::new(45.0 + i as f64 * 0.0001, -75.0)).collect()
    }

    #[test]
    fn test_arrow_count_matches_stride() {
        for n in 0..40 {
            let expected = if n < 2 { 0 } else { (n - 1 + 4) / 5 };
            assert_eq!(compute_arrows(&line(n), 5).len(), expected, "n = {}", n);
        }
    }

    #[test]
    fn test_arrow_targets_clamp_to_last_point() {
        let route = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.001),
            GeoPoint::new(0.001, 0.001),
        ];
        let arrows = compute_arrows(&route, 5);
        assert_eq!(arrows.len(), 1);
        assert_eq!(arrows[0].coordinate, route[0]);
        // Points at route[2], up and to the right
        assert!((arrows[0].angle_degrees - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_arrows_sample_every_stride() {
        let route = line(12);
        let arrows = compute_arrows(&route, 5);
        let coords: Vec<GeoPoint> = arrows.iter().map(|a| a.coordinate).collect();
        assert_eq!(coords, vec![route[0], route[5], route[10]]);
        assert!(arrows.iter().all(|a| (a.angle_degrees - 90.0).abs() < 1e-6));
    }

    #[tokio::test]
    async fn test_fetch_route_decodes_reference() {
        let service = FakeDirections::returning(Ok(Some("_p~iF~ps|U_ulLnnqC_mqNvxq`@".to_string())));
        let overlay = DirectionsOverlay::new(service.clone());

        let result = overlay
            .fetch_route(&GeoPoint::new(38.5, -120.2), &GeoPoint::new(43.252, -126.453))
            .await
            .unwrap();

        assert_eq!(result.route.len(), 3);
        assert_eq!(result.arrows.len(), 1);
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_route_is_empty_result() {
        let overlay = DirectionsOverlay::new(FakeDirections::returning(Ok(None)));
        let result = overlay
            .fetch_route(&GeoPoint::new(0.0, 0.0), &GeoPoint::new(1.0, 1.0))
            .await
            .unwrap();
        assert!(result.is_empty());
        assert!(result.arrows.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_polyline_is_route_unavailable() {
        let overlay = DirectionsOverlay::new(FakeDirections::returning(Ok(Some("_p~iF~ps|U_".to_string()))));
        let err = overlay
            .fetch_route(&GeoPoint::new(0.0, 0.0), &GeoPoint::new(1.0, 1.0))
            .await
            .unwrap_err();

        match err {
            TrackerError::RouteUnavailable { cause } => {
                assert!(matches!(*cause, TrackerError::Decode { .. }))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_network_failure_is_route_unavailable() {
        let overlay = DirectionsOverlay::new(FakeDirections::returning(Err(TrackerError::network(
            NetworkService::Directions,
            "connection refused",
        ))));
        let err = overlay
            .fetch_route(&GeoPoint::new(0.0, 0.0), &GeoPoint::new(1.0, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::RouteUnavailable { .. }));
        assert!(err.is_retryable());
    }
}
