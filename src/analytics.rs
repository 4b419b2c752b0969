//! Route analytics: distance, duration, average speed and time-of-day.
//!
//! All functions are pure and operate on sample slices, so they can run on a
//! frozen [`Track`](crate::Track) or on any decoded route.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TrackerError};
use crate::geo_utils;
use crate::GeoPoint;

/// Distances below this are displayed in meters, at or above it in kilometers.
pub const KILOMETER_DISPLAY_THRESHOLD_METERS: f64 = 1000.0;

// ============================================================================
// Distance / Duration / Speed
// ============================================================================

/// Total length of a track in meters, 0 for fewer than two points.
pub fn total_distance(points: &[GeoPoint]) -> f64 {
    geo_utils::polyline_length(points)
}

/// Whole hours, minutes and seconds of an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elapsed {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Elapsed {
    /// Split a number of seconds into h/m/s.
    pub fn from_seconds(total: u64) -> Self {
        Self {
            hours: total / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
        }
    }

    pub fn total_seconds(&self) -> u64 {
        self.hours * 3600 + self.minutes * 60 + self.seconds
    }
}

/// Formats as `"<h>h <m>m <s>s"`, the persistence API's duration text.
impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h {}m {}s", self.hours, self.minutes, self.seconds)
    }
}

fn check_interval(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<chrono::Duration> {
    if end < start {
        return Err(TrackerError::InvalidInterval { start, end });
    }
    Ok(end - start)
}

/// Decompose `end - start` into whole hours, minutes and seconds.
///
/// Sub-second remainders are dropped. Fails with
/// [`TrackerError::InvalidInterval`] when `end` is before `start`.
///
/// # Example
/// ```
/// use activity_tracker::analytics;
/// use chrono::{Duration, TimeZone, Utc};
///
/// let start = Utc.with_ymd_and_hms(2024, 5, 4, 7, 0, 0).unwrap();
/// let end = start + Duration::seconds(3725);
///
/// let elapsed = analytics::duration(start, end).unwrap();
/// assert_eq!(elapsed.to_string(), "1h 2m 5s");
/// ```
pub fn duration(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Elapsed> {
    let span = check_interval(start, end)?;
    Ok(Elapsed::from_seconds(span.num_seconds() as u64))
}

/// Average speed in km/h over the interval.
///
/// Returns 0 for a zero-length interval instead of infinity or NaN.
pub fn average_speed_kmh(points: &[GeoPoint], start: DateTime<Utc>, end: DateTime<Utc>) -> Result<f64> {
    let span = check_interval(start, end)?;
    let hours = span.num_milliseconds() as f64 / 3_600_000.0;
    if hours == 0.0 {
        return Ok(0.0);
    }
    Ok((total_distance(points) / 1000.0) / hours)
}

// ============================================================================
// Time-of-day classification
// ============================================================================

/// Part of the day an activity started in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    /// 00:00 - 05:59
    EarlyMorning,
    /// 06:00 - 11:59
    Morning,
    /// 12:00 - 17:59
    Afternoon,
    /// 18:00 - 20:59
    Evening,
    /// 21:00 - 23:59
    LateEvening,
    /// Hour outside 0-23
    UnknownPeriod,
}

impl Period {
    pub fn label(&self) -> &'static str {
        match self {
            Period::EarlyMorning => "Early Morning",
            Period::Morning => "Morning",
            Period::Afternoon => "Afternoon",
            Period::Evening => "Evening",
            Period::LateEvening => "Late Evening",
            Period::UnknownPeriod => "Unknown Period",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map an hour of the day to its [`Period`]. Bounds are inclusive on both ends.
pub fn classify_period(hour: u32) -> Period {
    match hour {
        0..=5 => Period::EarlyMorning,
        6..=11 => Period::Morning,
        12..=17 => Period::Afternoon,
        18..=20 => Period::Evening,
        21..=23 => Period::LateEvening,
        _ => Period::UnknownPeriod,
    }
}

/// Classify a start time by its hour in the time zone it carries.
///
/// Pass a `DateTime<Local>` to classify by the device's local clock.
pub fn period_at<Tz: TimeZone>(start: &DateTime<Tz>) -> Period {
    classify_period(start.hour())
}

// ============================================================================
// Display
// ============================================================================

/// Render a distance with the unit policy used throughout the crate.
///
/// Compares raw meters against 1000: below renders `"{:.2} m"`, otherwise
/// `"{:.2} km"`.
pub fn format_distance(meters: f64) -> String {
    if meters < KILOMETER_DISPLAY_THRESHOLD_METERS {
        format!("{:.2} m", meters)
    } else {
        format!("{:.2} km", meters / 1000.0)
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Derived summary of a finished recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub name: String,
    pub distance_meters: f64,
    pub distance_km: f64,
    /// 0 when `duration_seconds` is 0
    pub average_speed_kmh: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: u64,
}

impl ActivitySummary {
    /// Summarize a track recorded between `start` and `end`.
    ///
    /// An empty or single-point track produces a zero-distance, zero-speed summary.
    pub fn compute(
        name: impl Into<String>,
        points: &[GeoPoint],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self> {
        let elapsed = duration(start, end)?;
        let distance_meters = total_distance(points);
        let duration_seconds = elapsed.total_seconds();

        let average_speed_kmh = if duration_seconds > 0 {
            average_speed_kmh(points, start, end)?
        } else {
            0.0
        };

        Ok(Self {
            name: name.into(),
            distance_meters,
            distance_km: distance_meters / 1000.0,
            average_speed_kmh,
            start_time: start,
            end_time: end,
            duration_seconds,
        })
    }

    pub fn elapsed(&self) -> Elapsed {
        Elapsed::from_seconds(self.duration_seconds)
    }

    pub fn display_distance(&self) -> String {
        format_distance(self.distance_meters)
    }

    /// Period of the start time in UTC. Use [`period_at`] with a local time for
    /// the device's clock.
    pub fn period(&self) -> Period {
        period_at(&self.start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::EARTH_RADIUS_METERS;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 4, 7, 30, 0).unwrap()
    }

    /// Two points exactly `meters` apart along a meridian.
    fn straight_track(meters: f64) -> Vec<GeoPoint> {
        let d_lat = (meters / EARTH_RADIUS_METERS).to_degrees();
        vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(d_lat, 0.0)]
    }

    #[test]
    fn test_total_distance_short_tracks() {
        assert_eq!(total_distance(&[]), 0.0);
        assert_eq!(total_distance(&[GeoPoint::new(45.0, -75.0)]), 0.0);
    }

    #[test]
    fn test_total_distance_reversed_is_equal() {
        let track = vec![
            GeoPoint::new(45.4215, -75.6972),
            GeoPoint::new(45.4230, -75.6950),
            GeoPoint::new(45.4251, -75.6931),
            GeoPoint::new(45.4262, -75.6990),
        ];
        let mut reversed = track.clone();
        reversed.reverse();
        assert!((total_distance(&track) - total_distance(&reversed)).abs() < 1e-9);
    }

    #[test]
    fn test_duration_decomposition() {
        let elapsed = duration(t0(), t0() + Duration::seconds(3725)).unwrap();
        assert_eq!(elapsed, Elapsed { hours: 1, minutes: 2, seconds: 5 });
        assert_eq!(elapsed.total_seconds(), 3725);
    }

    #[test]
    fn test_duration_floors_subsecond() {
        let elapsed = duration(t0(), t0() + Duration::milliseconds(59_999)).unwrap();
        assert_eq!(elapsed, Elapsed { hours: 0, minutes: 0, seconds: 59 });
    }

    #[test]
    fn test_duration_rejects_negative_interval() {
        let err = duration(t0(), t0() - Duration::seconds(1)).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidInterval { .. }));
    }

    #[test]
    fn test_elapsed_display() {
        assert_eq!(Elapsed::from_seconds(0).to_string(), "0h 0m 0s");
        assert_eq!(Elapsed::from_seconds(7384).to_string(), "2h 3m 4s");
    }

    #[test]
    fn test_average_speed_ten_km_in_one_hour() {
        let track = straight_track(10_000.0);
        let speed = average_speed_kmh(&track, t0(), t0() + Duration::hours(1)).unwrap();
        assert!((speed - 10.0).abs() < 1e-6, "speed was {}", speed);
    }

    #[test]
    fn test_average_speed_zero_elapsed() {
        let track = straight_track(10_000.0);
        assert_eq!(average_speed_kmh(&track, t0(), t0()).unwrap(), 0.0);
    }

    #[test]
    fn test_average_speed_rejects_negative_interval() {
        let track = straight_track(100.0);
        assert!(average_speed_kmh(&track, t0(), t0() - Duration::minutes(1)).is_err());
    }

    #[test]
    fn test_classify_period_boundaries() {
        assert_eq!(classify_period(0), Period::EarlyMorning);
        assert_eq!(classify_period(5), Period::EarlyMorning);
        assert_eq!(classify_period(6), Period::Morning);
        assert_eq!(classify_period(11), Period::Morning);
        assert_eq!(classify_period(12), Period::Afternoon);
        assert_eq!(classify_period(17), Period::Afternoon);
        assert_eq!(classify_period(18), Period::Evening);
        assert_eq!(classify_period(20), Period::Evening);
        assert_eq!(classify_period(21), Period::LateEvening);
        assert_eq!(classify_period(23), Period::LateEvening);
        assert_eq!(classify_period(24), Period::UnknownPeriod);
    }

    #[test]
    fn test_period_at_uses_time_zone_hour() {
        let start = Utc.with_ymd_and_hms(2024, 5, 4, 19, 15, 0).unwrap();
        assert_eq!(period_at(&start), Period::Evening);
        let offset = chrono::FixedOffset::east_opt(5 * 3600).unwrap();
        assert_eq!(period_at(&start.with_timezone(&offset)), Period::EarlyMorning);
    }

    #[test]
    fn test_format_distance_threshold() {
        assert_eq!(format_distance(0.0), "0.00 m");
        assert_eq!(format_distance(999.994), "999.99 m");
        assert_eq!(format_distance(1000.0), "1.00 km");
        assert_eq!(format_distance(12_346.0), "12.35 km");
    }

    #[test]
    fn test_summary_of_empty_track() {
        let summary = ActivitySummary::compute("Run", &[], t0(), t0() + Duration::minutes(5)).unwrap();
        assert_eq!(summary.distance_meters, 0.0);
        assert_eq!(summary.distance_km, 0.0);
        assert_eq!(summary.average_speed_kmh, 0.0);
        assert_eq!(summary.duration_seconds, 300);
    }

    #[test]
    fn test_summary_subsecond_duration_has_zero_speed() {
        let track = straight_track(50.0);
        let summary =
            ActivitySummary::compute("Sprint", &track, t0(), t0() + Duration::milliseconds(400)).unwrap();
        assert_eq!(summary.duration_seconds, 0);
        assert_eq!(summary.average_speed_kmh, 0.0);
    }

    #[test]
    fn test_summary_fields() {
        let track = straight_track(2_500.0);
        let summary =
            ActivitySummary::compute("Morning Activity", &track, t0(), t0() + Duration::minutes(15)).unwrap();
        assert!((summary.distance_meters - 2_500.0).abs() < 1e-6);
        assert!((summary.distance_km - 2.5).abs() < 1e-9);
        assert!((summary.average_speed_kmh - 10.0).abs() < 1e-6);
        assert_eq!(summary.elapsed().to_string(), "0h 15m 0s");
        assert_eq!(summary.display_distance(), "2.50 km");
        assert_eq!(summary.period(), Period::Morning);
    }
}
