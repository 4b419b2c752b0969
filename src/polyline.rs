//! Encoded polyline codec.
//!
//! The directions service exchanges route geometry as an encoded polyline: each
//! point is stored as the latitude and longitude delta from the previous point,
//! scaled by 1e5, zig-zag encoded and split into 5-bit groups (least significant
//! first). Every group is offset by 63 to land in printable ASCII and carries a
//! continuation flag (0x20) when more groups of the same value follow.
//!
//! The arithmetic is done by the `polyline` crate. Input is first checked
//! structurally so malformed text fails with the byte position of the fault:
//! a value whose last group still has the continuation flag set, a byte outside
//! the alphabet, or a value longer than any valid coordinate delta.
//!
//! ```rust
//! use activity_tracker::polyline;
//!
//! let points = polyline::decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
//! assert_eq!(points.len(), 3);
//! assert!((points[0].latitude - 38.5).abs() < 1e-9);
//!
//! let text = polyline::encode(&points).unwrap();
//! assert_eq!(polyline::decode(&text).unwrap(), points);
//! ```

use geo::{Coord, LineString};

use crate::error::{Result, TrackerError};
use crate::GeoPoint;

/// Decimal places kept by the format.
pub const POLYLINE_PRECISION: u32 = 5;

const CHAR_OFFSET: u8 = 63;
const CONTINUATION_BIT: u8 = 0x20;
// 7 groups hold 35 bits; a delta between valid coordinates needs at most 27
const MAX_GROUPS: usize = 7;

/// Check that `bytes` is a sequence of complete (latitude, longitude) values.
fn validate(bytes: &[u8]) -> Result<()> {
    let mut values = 0usize;
    let mut groups = 0usize;

    for (position, &byte) in bytes.iter().enumerate() {
        if !(CHAR_OFFSET..=CHAR_OFFSET + 63).contains(&byte) {
            return Err(TrackerError::Decode {
                position,
                message: format!("unexpected character {:?}", byte as char),
            });
        }

        groups += 1;
        if groups > MAX_GROUPS {
            return Err(TrackerError::Decode {
                position,
                message: "coordinate value overflows".to_string(),
            });
        }

        if (byte - CHAR_OFFSET) & CONTINUATION_BIT == 0 {
            values += 1;
            groups = 0;
        }
    }

    if groups > 0 {
        return Err(TrackerError::Decode {
            position: bytes.len(),
            message: "input ended inside a coordinate".to_string(),
        });
    }
    if values % 2 != 0 {
        return Err(TrackerError::Decode {
            position: bytes.len(),
            message: "latitude without longitude".to_string(),
        });
    }
    Ok(())
}

/// Decode polyline text into points, in order.
///
/// Empty input yields an empty route. Points outside the valid latitude and
/// longitude ranges are rejected.
pub fn decode(text: &str) -> Result<Vec<GeoPoint>> {
    if text.is_empty() {
        return Ok(vec![]);
    }
    validate(text.as_bytes())?;

    let line = ::polyline::decode_polyline(text, POLYLINE_PRECISION).map_err(|e| TrackerError::Decode {
        position: 0,
        message: e.to_string(),
    })?;

    let points: Vec<GeoPoint> = line.into_iter().map(|c| GeoPoint::new(c.y, c.x)).collect();
    if let Some(index) = points.iter().position(|p| !p.is_valid()) {
        return Err(TrackerError::Decode {
            position: 0,
            message: format!("point {} is outside the valid coordinate range", index),
        });
    }
    Ok(points)
}

/// Encode points as polyline text.
///
/// Coordinates are rounded to the nearest 1e-5 degree before deltas are taken, so
/// `decode(encode(points))` reproduces each coordinate within 1e-5. Fails with
/// [`TrackerError::Encode`] for a point outside the valid coordinate range.
pub fn encode(points: &[GeoPoint]) -> Result<String> {
    let line: LineString = points
        .iter()
        .map(|p| Coord { x: p.longitude, y: p.latitude })
        .collect();

    ::polyline::encode_coordinates(line, POLYLINE_PRECISION).map_err(|e| TrackerError::Encode {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn reference_points() -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(38.5, -120.2),
            GeoPoint::new(40.7, -120.95),
            GeoPoint::new(43.252, -126.453),
        ]
    }

    fn assert_close(actual: &[GeoPoint], expected: &[GeoPoint]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a.latitude - e.latitude).abs() <= 1e-5, "{:?} vs {:?}", a, e);
            assert!((a.longitude - e.longitude).abs() <= 1e-5, "{:?} vs {:?}", a, e);
        }
    }

    #[test]
    fn test_decode_reference_vector() {
        let points = decode(REFERENCE).unwrap();
        assert_close(&points, &reference_points());
    }

    #[test]
    fn test_encode_reference_vector() {
        assert_eq!(encode(&reference_points()).unwrap(), REFERENCE);
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode("").unwrap().is_empty());
        assert_eq!(encode(&[]).unwrap(), "");
    }

    #[test]
    fn test_round_trip_within_precision() {
        let points = vec![
            GeoPoint::new(45.421_534, -75.697_193),
            GeoPoint::new(45.421_601, -75.697_288),
            GeoPoint::new(-33.868_820, 151.209_296),
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(89.999_99, -179.999_99),
        ];
        let decoded = decode(&encode(&points).unwrap()).unwrap();
        assert_close(&decoded, &points);
    }

    #[test]
    fn test_round_trip_repeated_points() {
        let p = GeoPoint::new(51.5074, -0.1278);
        let decoded = decode(&encode(&[p, p, p]).unwrap()).unwrap();
        assert_close(&decoded, &[p, p, p]);
    }

    #[test]
    fn test_truncated_group_is_error() {
        // Drop the final byte: the previous group still has its continuation bit set
        let truncated = &REFERENCE[..REFERENCE.len() - 1];
        let err = decode(truncated).unwrap_err();
        assert!(matches!(err, TrackerError::Decode { .. }));
    }

    #[test]
    fn test_continuation_without_end_is_error() {
        // '_' is 0x20 + 63: a continuation group that never terminates
        let err = decode("____").unwrap_err();
        assert!(matches!(err, TrackerError::Decode { position: 4, .. }));
    }

    #[test]
    fn test_missing_longitude_is_error() {
        // "_p~iF" is a complete latitude with no longitude after it
        let err = decode("_p~iF").unwrap_err();
        assert!(matches!(err, TrackerError::Decode { position: 5, .. }));
    }

    #[test]
    fn test_invalid_character_is_error() {
        let err = decode("_p~iF ps|U").unwrap_err();
        assert!(matches!(err, TrackerError::Decode { position: 5, .. }));
    }

    #[test]
    fn test_overlong_value_is_error() {
        let text = "_".repeat(40) + "?";
        let err = decode(&text).unwrap_err();
        assert!(matches!(err, TrackerError::Decode { .. }));
    }

    #[test]
    fn test_runaway_deltas_are_errors_not_panics() {
        // Thirteen-group values would overflow the running sum
        let text = ("~".repeat(12) + "^").repeat(4);
        let err = decode(&text).unwrap_err();
        assert!(matches!(err, TrackerError::Decode { position: 7, .. }));
    }

    #[test]
    fn test_out_of_range_point_is_error() {
        // Two +50 degree latitude deltas add up to 100
        let step = encode(&[GeoPoint::new(50.0, 0.0)]).unwrap();
        let text = step.repeat(2);
        assert!(matches!(decode(&text), Err(TrackerError::Decode { .. })));
        assert!(matches!(encode(&[GeoPoint::new(91.0, 0.0)]), Err(TrackerError::Encode { .. })));
    }

    #[test]
    fn test_round_trip_generated_routes() {
        // Small linear congruential generator so the sweep is reproducible
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };

        for len in 1..=64 {
            let points: Vec<GeoPoint> = (0..len)
                .map(|i| {
                    let lat = next() * 180.0 - 90.0;
                    let lng = next() * 360.0 - 180.0;
                    // Alternate full-range jumps with small steps
                    if i % 3 == 0 {
                        GeoPoint::new(lat, lng)
                    } else {
                        GeoPoint::new(lat / 1000.0, lng / 1000.0)
                    }
                })
                .collect();

            let decoded = decode(&encode(&points).unwrap()).unwrap();
            assert_close(&decoded, &points);
        }

        let extremes = vec![
            GeoPoint::new(90.0, 180.0),
            GeoPoint::new(-90.0, -180.0),
            GeoPoint::new(90.0, -180.0),
            GeoPoint::new(-90.0, 180.0),
        ];
        assert_close(&decode(&encode(&extremes).unwrap()).unwrap(), &extremes);
    }
}
