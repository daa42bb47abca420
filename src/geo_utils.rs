//! # Geographic Utilities
//!
//! Small geographic helpers shared by the spatial index and the simplifier.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`meters_to_lat_degrees`] | Convert a north-south distance to degrees of latitude |
//! | [`meters_to_lng_degrees`] | Convert an east-west distance to degrees of longitude at a latitude |
//! | [`project_local`] | Project points onto a local metric plane |
//!
//! ## Example
//!
//! ```rust
//! use geonet::{GpsPoint, geo_utils};
//!
//! let a = GpsPoint::new(50.0, 14.0);
//! let b = GpsPoint::new(50.001, 14.0);
//!
//! let dist = geo_utils::haversine_distance(&a, &b);
//! assert!((dist - 111.2).abs() < 1.0);
//! ```
//!
//! ## Coordinate System
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees). Distances
//! are computed on a sphere with the mean Earth radius, matching `geo::Haversine`.

use geo::{Coord, Distance, Haversine, Point};

use crate::GpsPoint;

/// Mean Earth radius in meters, the same value `geo::Haversine` uses.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Smallest cosine used when dividing by cos(latitude), keeps polar conversions finite.
const MIN_COS_LATITUDE: f64 = 1e-6;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface.
///
/// # Example
///
/// ```rust
/// use geonet::{GpsPoint, geo_utils};
///
/// let prague = GpsPoint::new(50.0755, 14.4378);
/// let brno = GpsPoint::new(49.1951, 16.6068);
///
/// let distance = geo_utils::haversine_distance(&prague, &brno);
/// assert!((distance - 185_000.0).abs() < 5000.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

// =============================================================================
// Degree Conversions
// =============================================================================

/// Convert a north-south distance in meters to degrees of latitude.
#[inline]
pub fn meters_to_lat_degrees(meters: f64) -> f64 {
    (meters / EARTH_RADIUS_METERS).to_degrees()
}

/// Convert an east-west distance in meters to degrees of longitude at `latitude`.
///
/// Grows without bound towards the poles; callers covering a range of latitudes
/// should pass the one closest to a pole.
#[inline]
pub fn meters_to_lng_degrees(meters: f64, latitude: f64) -> f64 {
    let cos_lat = latitude.to_radians().cos().abs().max(MIN_COS_LATITUDE);
    meters_to_lat_degrees(meters) / cos_lat
}

// =============================================================================
// Projection
// =============================================================================

/// Project points onto a local equirectangular plane centred on the first point.
///
/// The result is in meters (x = east, y = north). Accurate for the few kilometres a
/// single network segment typically spans, which is all the simplifier needs to
/// measure perpendicular deviations in meters.
pub fn project_local(points: &[GpsPoint]) -> Vec<Coord<f64>> {
    let Some(origin) = points.first() else {
        return Vec::new();
    };
    let cos_lat = origin.latitude.to_radians().cos();

    points
        .iter()
        .map(|p| Coord {
            x: (p.longitude - origin.longitude).to_radians() * cos_lat * EARTH_RADIUS_METERS,
            y: (p.latitude - origin.latitude).to_radians() * EARTH_RADIUS_METERS,
        })
        .collect()
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

    #[test]
    fn test_haversine_distance_same_point() {
        let p = GpsPoint::new(50.0755, 14.4378);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_symmetric() {
        let a = GpsPoint::new(50.0, 14.0);
        let b = GpsPoint::new(50.01, 14.02);
        assert!(approx_eq(haversine_distance(&a, &b), haversine_distance(&b, &a), 1e-9));
    }

    #[test]
    fn test_meters_to_lat_degrees() {
        // One degree of latitude is ~111.2km on the mean sphere
        let deg = meters_to_lat_degrees(111_195.0);
        assert!(approx_eq(deg, 1.0, 0.001));
    }

    #[test]
    fn test_meters_to_lng_degrees_grows_with_latitude() {
        let at_equator = meters_to_lng_degrees(1000.0, 0.0);
        let at_sixty = meters_to_lng_degrees(1000.0, 60.0);
        assert!(approx_eq(at_sixty, at_equator * 2.0, 1e-6));
        assert!(meters_to_lng_degrees(1000.0, 90.0).is_finite());
    }

    #[test]
    fn test_project_local_matches_haversine() {
        let a = GpsPoint::new(50.0, 14.0);
        let b = GpsPoint::new(50.003, 14.004);
        let projected = project_local(&[a, b]);

        assert_eq!(projected[0], Coord { x: 0.0, y: 0.0 });
        let planar = projected[1].x.hypot(projected[1].y);
        assert!(approx_eq(planar, haversine_distance(&a, &b), 1.0));
    }

    #[test]
    fn test_project_local_empty() {
        assert!(project_local(&[]).is_empty());
    }
}
