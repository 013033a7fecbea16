//! # Geographic Utilities
//!
//! The geometry kernel used by field classification, tracking and attribution.
//!
//! Every function here is pure and total: degenerate input returns a safe default
//! (`false`, `0.0` or `None`) instead of panicking, so callers can treat it as
//! "no answer" and fall back to an unattributed state.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`distance_meters`] | Great-circle distance between two points |
//! | [`polyline_length`] | Total length of a track in meters |
//! | [`meters_to_degrees`] | Local meters to degree offsets |
//! | [`point_in_polygon`] | Even-odd containment test against a field boundary |
//! | [`polygon_area_ha`] | Field area in hectares via a local planar projection |
//! | [`split_polygon`] | Cut a boundary ring into two rings along a line |
//!
//! ## Example
//!
//! ```rust
//! use field_tracker::{GeoPoint, geo_utils};
//!
//! let boundary = vec![
//!     GeoPoint::new(0.0, 0.0),
//!     GeoPoint::new(0.0, 0.001),
//!     GeoPoint::new(0.001, 0.001),
//!     GeoPoint::new(0.001, 0.0),
//! ];
//!
//! let area = geo_utils::polygon_area_ha(&boundary);
//! println!("Field area: {:.2} ha", area);
//!
//! let inside = geo_utils::point_in_polygon(&GeoPoint::new(0.0005, 0.0005), &boundary);
//! assert!(inside);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Area
//!
//! Vertices are projected to local meters around the ring's mean latitude
//! (`lng_scale = 111319 * cos(mean_lat)`, `lat_scale = 111132`) and measured with the
//! shoelace formula. For field-sized polygons (tens of hectares) this stays within a
//! few centimeters of a geodesic computation.
//!
//! ### Coordinate System
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees).

use geo::{Area, Coord, Distance, Haversine, LineString, Point, Polygon};
use crate::{Bounds, GeoPoint};

/// Meters per degree of longitude at the equator, scaled by cos(latitude).
const METERS_PER_DEG_LNG: f64 = 111_319.0;
/// Meters per degree of latitude.
const METERS_PER_DEG_LAT: f64 = 111_132.0;
/// Split results smaller than this are treated as degenerate.
const MIN_SPLIT_AREA_HA: f64 = 0.0001;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance between two points in meters (haversine, spherical earth).
///
/// # Example
///
/// ```rust
/// use field_tracker::{GeoPoint, geo_utils};
///
/// let london = GeoPoint::new(51.5074, -0.1278);
/// let paris = GeoPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::distance_meters(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn distance_meters(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    let point1 = Point::new(p1.lng, p1.lat);
    let point2 = Point::new(p2.lng, p2.lat);
    Haversine::distance(point1, point2)
}

/// Total length of a polyline in meters. Empty or single-point input returns 0.0.
pub fn polyline_length(points: &[GeoPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| distance_meters(&w[0], &w[1]))
        .sum()
}

/// Approximate a distance in meters as degrees of latitude/longitude at `lat`.
///
/// Returns `(dlat, dlng)`. Near the poles the longitude span grows without bound.
pub fn meters_to_degrees(meters: f64, lat: f64) -> (f64, f64) {
    let dlat = meters / METERS_PER_DEG_LAT;
    let dlng = meters / (METERS_PER_DEG_LNG * lat.to_radians().cos().max(1e-9));
    (dlat, dlng)
}

// =============================================================================
// Polygon Functions
// =============================================================================

/// Test whether `point` lies inside `ring` using the even-odd rule.
///
/// The ring is implicitly closed (the last vertex connects to the first). Rings with
/// fewer than three vertices contain nothing. Points exactly on an edge may fall on
/// either side.
///
/// # Example
///
/// ```rust
/// use field_tracker::{GeoPoint, geo_utils};
///
/// let square = vec![
///     GeoPoint::new(51.0, 7.0),
///     GeoPoint::new(51.0, 7.01),
///     GeoPoint::new(51.01, 7.01),
///     GeoPoint::new(51.01, 7.0),
/// ];
///
/// assert!(geo_utils::point_in_polygon(&GeoPoint::new(51.005, 7.005), &square));
/// assert!(!geo_utils::point_in_polygon(&GeoPoint::new(52.0, 8.0), &square));
/// ```
pub fn point_in_polygon(point: &GeoPoint, ring: &[GeoPoint]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let (x, y) = (point.lng, point.lat);
    let mut inside = false;
    let mut j = ring.len() - 1;

    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].lng, ring[i].lat);
        let (xj, yj) = (ring[j].lng, ring[j].lat);

        // yi != yj whenever the first clause holds, so the division is safe
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Area of a boundary ring in hectares.
///
/// Projects the ring to local planar meters around its mean latitude and applies the
/// shoelace formula. Returns 0.0 for fewer than three vertices.
///
/// # Example
///
/// ```rust
/// use field_tracker::{GeoPoint, geo_utils};
///
/// // ~100m x 200m near the equator
/// let dlat = 100.0 / 111_132.0;
/// let dlng = 200.0 / 111_319.0;
/// let rect = vec![
///     GeoPoint::new(0.0, 0.0),
///     GeoPoint::new(0.0, dlng),
///     GeoPoint::new(dlat, dlng),
///     GeoPoint::new(dlat, 0.0),
/// ];
///
/// let area = geo_utils::polygon_area_ha(&rect);
/// assert!((area - 2.0).abs() < 0.02);
/// ```
pub fn polygon_area_ha(ring: &[GeoPoint]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }

    let mean_lat = ring.iter().map(|p| p.lat).sum::<f64>() / ring.len() as f64;
    let lng_scale = METERS_PER_DEG_LNG * mean_lat.to_radians().cos();

    let coords: Vec<Coord> = ring
        .iter()
        .map(|p| Coord { x: p.lng * lng_scale, y: p.lat * METERS_PER_DEG_LAT })
        .collect();

    // Polygon::new closes the exterior ring
    let polygon = Polygon::new(LineString::new(coords), vec![]);
    polygon.unsigned_area() / 10_000.0
}

/// Split a boundary ring into two rings along a cutter line.
///
/// Only the first and last cutter points are used: the ring is cut by the infinite line
/// through them. Each vertex is classified by the sign of its cross product with the
/// line, and intersection points are inserted into both rings wherever an edge changes
/// side.
///
/// Returns `None` when the cut cannot produce two real fields: the cutter has fewer than
/// two distinct points, or either side ends up with fewer than three vertices or an area
/// below 0.0001 ha.
pub fn split_polygon(ring: &[GeoPoint], cutter: &[GeoPoint]) -> Option<(Vec<GeoPoint>, Vec<GeoPoint>)> {
    if ring.len() < 3 || cutter.len() < 2 {
        return None;
    }

    let a = cutter[0];
    let b = cutter[cutter.len() - 1];
    let (dx, dy) = (b.lng - a.lng, b.lat - a.lat);
    if dx == 0.0 && dy == 0.0 {
        return None;
    }

    let side = |p: &GeoPoint| dx * (p.lat - a.lat) - dy * (p.lng - a.lng);

    let mut left = Vec::with_capacity(ring.len() + 2);
    let mut right = Vec::with_capacity(ring.len() + 2);

    for (i, current) in ring.iter().enumerate() {
        let next = &ring[(i + 1) % ring.len()];
        let s_cur = side(current);
        let s_next = side(next);

        if s_cur >= 0.0 {
            left.push(*current);
        }
        if s_cur <= 0.0 {
            right.push(*current);
        }

        if (s_cur > 0.0 && s_next < 0.0) || (s_cur < 0.0 && s_next > 0.0) {
            let t = s_cur / (s_cur - s_next);
            let crossing = GeoPoint::new(
                current.lat + t * (next.lat - current.lat),
                current.lng + t * (next.lng - current.lng),
            );
            left.push(crossing);
            right.push(crossing);
        }
    }

    if left.len() < 3 || right.len() < 3 {
        return None;
    }
    if polygon_area_ha(&left) < MIN_SPLIT_AREA_HA || polygon_area_ha(&right) < MIN_SPLIT_AREA_HA {
        return None;
    }

    Some((left, right))
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a set of points, or `None` for empty input.
#[inline]
pub fn compute_bounds(points: &[GeoPoint]) -> Option<Bounds> {
    Bounds::from_points(points)
}

// =============================================================================
// Unit Tests
// =============================================================================
