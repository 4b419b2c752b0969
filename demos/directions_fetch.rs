//! Fetch a return route from a live directions endpoint.
//!
//! Run with:
//!   TRACKER_DIRECTIONS_KEY=... cargo run --example directions_fetch --features http -- \
//!       45.4215,-75.6972 45.4112,-75.6981

use activity_tracker::{DirectionsOverlay, GeoPoint, HttpDirectionsClient, TrackerConfig};
use std::sync::Arc;
use std::time::Instant;

fn parse_point(arg: &str) -> Option<GeoPoint> {
    let (lat, lng) = arg.split_once(',')?;
    let point = GeoPoint::new(lat.trim().parse().ok()?, lng.trim().parse().ok()?);
    point.is_valid().then_some(point)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let origin = args.first().and_then(|a| parse_point(a)).unwrap_or(GeoPoint::new(45.4215, -75.6972));
    let destination = args.get(1).and_then(|a| parse_point(a)).unwrap_or(GeoPoint::new(45.4112, -75.6981));

    let config = TrackerConfig::from_env();
    if config.directions_api_key.is_empty() {
        eprintln!("TRACKER_DIRECTIONS_KEY is not set; the request will most likely be denied");
    }

    let client = HttpDirectionsClient::from_config(&config)?;
    let overlay = DirectionsOverlay::with_stride(Arc::new(client), config.arrow_stride);

    println!(
        "Route {:.5},{:.5} -> {:.5},{:.5}",
        origin.latitude, origin.longitude, destination.latitude, destination.longitude
    );

    let start = Instant::now();
    let result = overlay.fetch_route(&origin, &destination).await?;

    if result.is_empty() {
        println!("No route found ({:?})", start.elapsed());
        return Ok(());
    }

    println!(
        "{} points, {} arrows, {} ({:?})",
        result.route.len(),
        result.arrows.len(),
        activity_tracker::analytics::format_distance(activity_tracker::analytics::total_distance(&result.route)),
        start.elapsed()
    );

    Ok(())
}
