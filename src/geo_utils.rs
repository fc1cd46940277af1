//! # Geographic Utilities
//!
//! Core geographic computations used by snapping and sampling.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two points |
//! | [`interpolate`] | Point a fraction of the way from `a` to `b` |
//! | [`polyline_length`] | Total length of a polyline in meters |
//!
//! ## Example
//!
//! ```rust
//! use rail_tracks::{GeoPoint, geo_utils};
//!
//! let colombo = GeoPoint::new(6.9271, 79.8612);
//! let kandy = GeoPoint::new(7.2906, 80.6337);
//!
//! let dist = geo_utils::haversine_distance(&colombo, &kandy);
//! println!("Colombo to Kandy: {:.1} km", dist / 1000.0);
//!
//! let halfway = geo_utils::interpolate(&colombo, &kandy, 0.5);
//! assert!((halfway.latitude - 7.10885).abs() < 1e-9);
//! ```
//!
//! ## Algorithm Notes
//!
//! Distances use the haversine formula on a sphere of radius 6,371,000 m.
//! Interpolation is linear in latitude/longitude, which is not geodesically
//! exact but is indistinguishable from it at per-minute sampling granularity.

use crate::GeoPoint;

/// Mean Earth radius used for all distances, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance between two points using the haversine formula.
///
/// Symmetric, and zero for identical points.
///
/// # Example
///
/// ```rust
/// use rail_tracks::{GeoPoint, geo_utils};
///
/// let london = GeoPoint::new(51.5074, -0.1278);
/// let paris = GeoPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_500.0).abs() < 1000.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    let phi1 = p1.latitude.to_radians();
    let phi2 = p2.latitude.to_radians();
    let delta_phi = (p2.latitude - p1.latitude).to_radians();
    let delta_lambda = (p2.longitude - p1.longitude).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Total length of a polyline in meters.
///
/// Empty or single-point polylines return 0.0.
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
// Interpolation
// =============================================================================

/// Point `fraction` of the way from `a` to `b`, linear in lat/lng space.
///
/// `fraction` is clamped to `[0, 1]`. The endpoints are returned exactly
/// for 0 and 1, so sampled tracks start and end on route vertices.
pub fn interpolate(a: &GeoPoint, b: &GeoPoint, fraction: f64) -> GeoPoint {
    let t = fraction.clamp(0.0, 1.0);
    if t == 0.0 || a == b {
        return *a;
    }
    if t == 1.0 {
        return *b;
    }

    GeoPoint::new(
        a.latitude + (b.latitude - a.latitude) * t,
        a.longitude + (b.longitude - a.longitude) * t,
    )
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn sample_pairs() -> Vec<(GeoPoint, GeoPoint)> {
        vec![
            (GeoPoint::new(6.9271, 79.8612), GeoPoint::new(7.2906, 80.6337)),
            (GeoPoint::new(51.5074, -0.1278), GeoPoint::new(48.8566, 2.3522)),
            (GeoPoint::new(-33.8688, 151.2093), GeoPoint::new(40.7128, -74.0060)),
            (GeoPoint::new(0.0, 179.9), GeoPoint::new(0.0, -179.9)),
            (GeoPoint::new(89.9, 0.0), GeoPoint::new(-89.9, 0.0)),
        ]
    }

    #[test]
    fn test_haversine_distance_same_point() {
        for (a, b) in sample_pairs() {
            assert_eq!(haversine_distance(&a, &a), 0.0);
            assert_eq!(haversine_distance(&b, &b), 0.0);
        }
    }

    #[test]
    fn test_haversine_distance_symmetric() {
        for (a, b) in sample_pairs() {
            assert_eq!(haversine_distance(&a, &b), haversine_distance(&b, &a));
        }
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // One degree of latitude on a 6371 km sphere
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let expected = EARTH_RADIUS_M * 1.0_f64.to_radians();
        assert!(approx_eq(haversine_distance(&a, &b), expected, 1e-6));

        // Antimeridian crossing is short
        let east = GeoPoint::new(0.0, 179.9);
        let west = GeoPoint::new(0.0, -179.9);
        assert!(haversine_distance(&east, &west) < 23_000.0);
    }

    #[test]
    fn test_polyline_length() {
        let empty: Vec<GeoPoint> = vec![];
        assert_eq!(polyline_length(&empty), 0.0);
        assert_eq!(polyline_length(&[GeoPoint::new(6.9, 79.8)]), 0.0);

        let track = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(1.0, 0.0),
            GeoPoint::new(2.0, 0.0),
        ];
        let one_degree = EARTH_RADIUS_M * 1.0_f64.to_radians();
        assert!(approx_eq(polyline_length(&track), 2.0 * one_degree, 1e-6));
    }

    #[test]
    fn test_interpolate_endpoints() {
        for (a, b) in sample_pairs() {
            assert_eq!(interpolate(&a, &b, 0.0), a);
            assert_eq!(interpolate(&a, &b, 1.0), b);
        }
    }

    #[test]
    fn test_interpolate_midpoint_and_clamp() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(2.0, 4.0);
        assert_eq!(interpolate(&a, &b, 0.5), GeoPoint::new(1.0, 2.0));
        assert_eq!(interpolate(&a, &b, -0.5), a);
        assert_eq!(interpolate(&a, &b, 1.5), b);
    }

    #[test]
    fn test_interpolate_degenerate_segment() {
        let a = GeoPoint::new(7.0, 80.0);
        assert_eq!(interpolate(&a, &a, 0.3), a);
    }
}
