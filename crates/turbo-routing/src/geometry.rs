//! Planar geometry over small city-scale areas.
//!
//! Polygons are rings of `[longitude, latitude]` pairs. Topological tests
//! (containment, convex hulls) run directly in degree space through the
//! `geo` crate; metric tests (buffers, radii) project onto a local
//! equirectangular plane centred on the point of interest, which is accurate
//! to well under a metre at the distances involved here.

use geo::{
    Area, ConvexHull, Distance, Euclidean, Intersects, Line, LineString, MultiPoint, Point, Polygon,
};
use turbo_routing_core::Coordinates;

/// Length of one degree of latitude, in metres.
pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Number of vertices used to approximate a circle.
pub const CIRCLE_SEGMENTS: usize = 32;

/// Smallest hull area (in square degrees) still treated as a polygon.
const MIN_HULL_AREA: f64 = 1e-12;

/// An equirectangular projection to metres around a fixed origin.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    origin: Coordinates,
    meters_per_degree_lon: f64,
}

impl LocalProjection {
    pub fn new(origin: Coordinates) -> Self {
        Self {
            origin,
            meters_per_degree_lon: METERS_PER_DEGREE_LAT * origin.lat.to_radians().cos(),
        }
    }

    /// Projects a `[longitude, latitude]` pair to `(x, y)` metres.
    pub fn project(&self, lon_lat: [f64; 2]) -> (f64, f64) {
        (
            (lon_lat[0] - self.origin.lon) * self.meters_per_degree_lon,
            (lon_lat[1] - self.origin.lat) * METERS_PER_DEGREE_LAT,
        )
    }

    /// Maps `(x, y)` metres back to a `[longitude, latitude]` pair.
    pub fn unproject(&self, x: f64, y: f64) -> [f64; 2] {
        [
            self.origin.lon + x / self.meters_per_degree_lon,
            self.origin.lat + y / METERS_PER_DEGREE_LAT,
        ]
    }
}

/// Approximate distance in metres between two nearby coordinates.
pub fn distance_m(a: Coordinates, b: Coordinates) -> f64 {
    let (x, y) = LocalProjection::new(a).project(b.to_lon_lat());
    x.hypot(y)
}

/// Distance from `p` to the segment `ab`, all in the same planar units.
pub fn distance_to_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    Euclidean::distance(&Point::from(p), &Line::new(a, b))
}

/// Arithmetic mean of the given coordinates.
pub fn centroid(points: &[Coordinates]) -> Option<Coordinates> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lat, lon) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lon), p| (lat + p.lat, lon + p.lon));

    Some(Coordinates::new(lat / n, lon / n))
}

/// Number of distinct vertices in a ring, ignoring the closing vertex.
pub fn distinct_vertices(ring: &[[f64; 2]]) -> usize {
    let mut seen: Vec<[f64; 2]> = Vec::with_capacity(ring.len());
    for vertex in ring {
        if !seen.contains(vertex) {
            seen.push(*vertex);
        }
    }
    seen.len()
}

/// Whether the ring is closed and has at least three distinct vertices.
pub fn is_valid_ring(ring: &[[f64; 2]]) -> bool {
    ring.len() >= 4
        && ring.first() == ring.last()
        && distinct_vertices(ring) >= 3
        && ring.iter().all(|v| v[0].is_finite() && v[1].is_finite())
}

fn to_polygon(ring: &[[f64; 2]]) -> Polygon<f64> {
    Polygon::new(LineString::from(ring.to_vec()), vec![])
}

/// Convex hull of the points as a closed ring.
///
/// Returns `None` when the points do not span an area (fewer than three
/// distinct points, or all collinear).
pub fn convex_hull(points: &[Coordinates]) -> Option<Vec<[f64; 2]>> {
    let multi_point: MultiPoint<f64> = points
        .iter()
        .map(|p| Point::new(p.lon, p.lat))
        .collect::<Vec<_>>()
        .into();
    let hull = multi_point.convex_hull();

    if hull.unsigned_area() <= MIN_HULL_AREA {
        return None;
    }

    let ring: Vec<[f64; 2]> = hull.exterior().coords().map(|c| [c.x, c.y]).collect();
    is_valid_ring(&ring).then_some(ring)
}

/// A closed ring approximating a circle of `radius_m` metres.
pub fn circle_polygon(center: Coordinates, radius_m: f64, segments: usize) -> Vec<[f64; 2]> {
    let projection = LocalProjection::new(center);
    let segments = segments.max(3);

    let mut ring: Vec<[f64; 2]> = (0..segments)
        .map(|i| {
            let angle = core::f64::consts::TAU * i as f64 / segments as f64;
            projection.unproject(radius_m * angle.cos(), radius_m * angle.sin())
        })
        .collect();
    ring.push(ring[0]);

    ring
}

/// Tests whether `point` lies inside `ring` or within `buffer_m` metres of
/// its boundary. Points exactly on the boundary are inside.
pub fn contains_with_buffer(ring: &[[f64; 2]], point: Coordinates, buffer_m: f64) -> bool {
    if !is_valid_ring(ring) || !point.is_valid() {
        return false;
    }

    if to_polygon(ring).intersects(&Point::new(point.lon, point.lat)) {
        return true;
    }

    let projection = LocalProjection::new(point);
    ring.windows(2).any(|edge| {
        let a = projection.project(edge[0]);
        let b = projection.project(edge[1]);
        distance_to_segment((0.0, 0.0), a, b) <= buffer_m
    })
}
