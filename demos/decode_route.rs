//! Decode an encoded polyline and place return-trip arrows along it.
//!
//! Run with: cargo run --example decode_route -- '<encoded polyline>'

use activity_tracker::{analytics, directions, geo_utils, polyline};

const REFERENCE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

fn main() {
    let encoded = std::env::args().nth(1).unwrap_or_else(|| REFERENCE.to_string());

    let route = match polyline::decode(&encoded) {
        Ok(route) => route,
        Err(e) => {
            eprintln!("Cannot decode '{}': {}", encoded, e);
            std::process::exit(1);
        }
    };

    println!("Decoded {} points\n", route.len());
    for (i, point) in route.iter().enumerate() {
        println!("  {:>3}: {:>10.5}, {:>11.5}", i, point.latitude, point.longitude);
    }

    println!("\nLength: {}", analytics::format_distance(analytics::total_distance(&route)));
    if let Some(bounds) = geo_utils::compute_bounds(&route) {
        let center = bounds.center();
        println!("Center: {:.5}, {:.5}", center.latitude, center.longitude);
    }

    let arrows = directions::compute_arrows(&route, directions::DEFAULT_ARROW_STRIDE);
    println!("\n{} arrow(s):", arrows.len());
    for arrow in &arrows {
        println!(
            "  at {:.5}, {:.5} pointing {:.1} deg",
            arrow.coordinate.latitude, arrow.coordinate.longitude, arrow.angle_degrees
        );
    }

    match polyline::encode(&route) {
        Ok(text) => println!("\nRe-encoded: {}", text),
        Err(e) => eprintln!("\nCannot re-encode: {}", e),
    }
}
