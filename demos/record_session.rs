//! Walk a session through record, stop, return trip and save with a simulated
//! GPS feed and in-memory services.
//!
//! Run with: RUST_LOG=debug cargo run --example record_session

use activity_tracker::location::SampleSender;
use activity_tracker::{
    polyline, ActivityRecord, ActivitySession, ActivityStore, DirectionsService,
    GeoPoint, LocationEvent, LocationProvider, Permission, Result, StoredActivity, Subscription,
    TrackerConfig, WatchConfig,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};

/// Replays a fixed loop around Parliament Hill, one sample per second.
struct SimulatedGps {
    sink: Arc<Mutex<Option<SampleSender>>>,
}

struct SimulatedSubscription(Arc<Mutex<Option<SampleSender>>>);

impl Subscription for SimulatedSubscription {
    fn remove(&mut self) {
        self.0.lock().unwrap().take();
    }
}

impl SimulatedGps {
    fn replay(&self, points: &[GeoPoint]) {
        let start = Utc::now();
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            for (i, point) in points.iter().enumerate() {
                let sample = point
                    .at(start + Duration::seconds(i as i64))
                    .with_motion(Some(2.8), Some(0.0));
                let _ = sink.send(LocationEvent::Sample(sample));
            }
        }
    }
}

#[async_trait]
impl LocationProvider for SimulatedGps {
    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    async fn current_position(&self) -> Result<GeoPoint> {
        Ok(GeoPoint::new(45.4236, -75.7009))
    }

    async fn watch_position(&self, _config: &WatchConfig, sink: SampleSender) -> Result<Box<dyn Subscription>> {
        *self.sink.lock().unwrap() = Some(sink);
        Ok(Box::new(SimulatedSubscription(Arc::clone(&self.sink))))
    }
}

/// Answers every request with a straight line back to the destination.
struct StraightLineDirections;

#[async_trait]
impl DirectionsService for StraightLineDirections {
    async fn route_polyline(&self, origin: &GeoPoint, destination: &GeoPoint) -> Result<Option<String>> {
        let steps = 12;
        let route: Vec<GeoPoint> = (0..=steps)
            .map(|i| {
                let t = i as f64 / steps as f64;
                GeoPoint::new(
                    origin.latitude + (destination.latitude - origin.latitude) * t,
                    origin.longitude + (destination.longitude - origin.longitude) * t,
                )
            })
            .collect();
        polyline::encode(&route).map(Some)
    }
}

#[derive(Default)]
struct MemoryStore {
    records: Mutex<Vec<ActivityRecord>>,
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn save(&self, record: &ActivityRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredActivity>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, record)| StoredActivity { id: (i + 1).to_string(), record: record.clone() })
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        if let Ok(index) = id.parse::<usize>() {
            let mut records = self.records.lock().unwrap();
            if index >= 1 && index <= records.len() {
                records.remove(index - 1);
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let gps = Arc::new(SimulatedGps { sink: Arc::new(Mutex::new(None)) });
    let store = Arc::new(MemoryStore::default());
    let directions = Arc::new(StraightLineDirections);

    let mut session = ActivitySession::new(gps.clone(), directions, store.clone(), TrackerConfig::default());

    println!("Activity Session Example\n");
    session.start().await?;
    println!("State: {}", session.state());

    let walk: Vec<GeoPoint> = (0..60)
        .map(|i| {
            let angle = i as f64 / 60.0 * std::f64::consts::PI;
            GeoPoint::new(45.4236 + 0.002 * angle.sin(), -75.7009 + 0.003 * (1.0 - angle.cos()))
        })
        .collect();
    gps.replay(&walk);

    let appended = session.pump()?;
    println!("Recorded {} samples, live speed {:.1} km/h", appended, session.current_speed_kmh());

    let summary = session.stop()?.clone();
    println!("\nState: {}", session.state());
    println!("  Name:     {}", summary.name);
    println!("  Distance: {}", summary.display_distance());
    println!("  Duration: {}", summary.elapsed());
    println!("  Speed:    {:.2} km/h", summary.average_speed_kmh);

    let route = session.return_to_start().await?;
    println!("\nState: {}", session.state());
    println!("  Return route: {} points, {} arrows", route.route.len(), route.arrows.len());

    let frame = session.map_frame();
    println!(
        "  Map centre {:.5}, {:.5}",
        frame.region.center.latitude, frame.region.center.longitude
    );

    let record = session.save(None).await?;
    println!("\nState: {}", session.state());
    println!("  Saved payload: {}", serde_json::to_string_pretty(&record).unwrap_or_default());

    for stored in store.list().await? {
        println!("  #{} {} ({})", stored.id, stored.record.name, stored.display_distance());
    }

    Ok(())
}
