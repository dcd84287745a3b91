//! Spatial predicates over place geometries.
//!
//! Geometries are WGS84 longitude/latitude. Planar predicates (`intersects`,
//! touches) work directly in degrees; distances in meters are great-circle
//! distances to the closest point of the target shape.

use geo::{Centroid, Closest, ClosestPoint, Intersects, Relate};
use geo_types::{Geometry, Point};

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two points in meters.
#[must_use]
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// The point of `geometry` nearest to `origin` in the lon/lat plane.
///
/// `origin` itself when it lies inside or on the geometry.
fn nearest_point(origin: Point<f64>, geometry: &Geometry<f64>) -> Option<Point<f64>> {
    if geometry.intersects(&origin) {
        return Some(origin);
    }
    match geometry.closest_point(&origin) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => Some(p),
        Closest::Indeterminate => geometry.centroid(),
    }
}

/// Minimum great-circle distance in meters from `origin` to `geometry`.
///
/// Zero when `origin` is inside the geometry.
#[must_use]
pub fn distance_meters(origin: Point<f64>, geometry: &Geometry<f64>) -> Option<f64> {
    nearest_point(origin, geometry).map(|p| haversine_distance(origin.y(), origin.x(), p.y(), p.x()))
}

/// Minimum planar distance from `origin` to `geometry`, in degrees.
#[must_use]
pub fn degree_distance(origin: Point<f64>, geometry: &Geometry<f64>) -> Option<f64> {
    nearest_point(origin, geometry).map(|p| (origin.x() - p.x()).hypot(origin.y() - p.y()))
}

/// Destination `distance_m` meters from `origin` along `bearing_degrees`,
/// as radians with the longitude left unwrapped.
fn destination(origin: Point<f64>, distance_m: f64, bearing_degrees: f64) -> (f64, f64) {
    let delta = distance_m / EARTH_RADIUS_METERS;
    let theta = bearing_degrees.to_radians();
    let phi1 = origin.y().to_radians();
    let lambda1 = origin.x().to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());
    (lambda2, phi2)
}

/// The point `distance_m` meters from `origin` along initial bearing
/// `bearing_degrees` (clockwise from north) on a spherical earth.
#[must_use]
pub fn project(origin: Point<f64>, distance_m: f64, bearing_degrees: f64) -> Point<f64> {
    let (lambda2, phi2) = destination(origin, distance_m, bearing_degrees);
    // Normalise longitude to [-180, 180).
    let lng = (lambda2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    Point::new(lng, phi2.to_degrees())
}

/// Reach in degrees of a `distance_m` circle around `origin`: the larger of
/// its east-west and north-south half widths.
///
/// Points within `distance_m` of `origin` are within this many planar
/// degrees of it, unless the circle crosses the antimeridian.
#[must_use]
pub fn degree_radius(origin: Point<f64>, distance_m: f64) -> f64 {
    let (lambda2, _) = destination(origin, distance_m, 90.0);
    let east = (lambda2.to_degrees() - origin.x()).abs();
    let north = (distance_m / EARTH_RADIUS_METERS).to_degrees();
    east.max(north)
}

#[must_use]
pub fn intersects(a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
    a.intersects(b)
}

/// True when `a` and `b` meet only along their boundaries.
#[must_use]
pub fn touches(a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
    a.relate(b).is_touches()
}

/// True when `a` and `b` share interior points.
///
/// Shapes that only meet along a border do not count: Connecticut has no
/// points inside New York even though the two states touch.
#[must_use]
pub fn overlaps_not_counting_border(a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
    a.intersects(b) && !a.relate(b).is_touches()
}
