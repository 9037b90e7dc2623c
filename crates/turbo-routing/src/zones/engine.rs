use crate::clustering::KMeans;
use crate::geometry::{self, CIRCLE_SEGMENTS};
use crate::zones::label::{Direction, zone_description, zone_label};
use rand::{Rng, SeedableRng, rngs::StdRng};
use turbo_routing_core::{Coordinates, Error, Result, ShipmentId};

/// Fixed cyclic palette for zone display colors.
pub const DEFAULT_PALETTE: [&str; 8] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
];

/// Default depot: the Turbo dispatch warehouse in Flores, Buenos Aires.
pub const DEFAULT_DEPOT: Coordinates = Coordinates::new(-34.6282, -58.4642);

/// Extra radius around the farthest member of a collinear cluster.
const COLLINEAR_MARGIN_M: f64 = 100.0;

/// A geocoded shipment fed into zone generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ZonePoint {
    pub lat: f64,
    pub lon: f64,
    pub shipment_id: ShipmentId,
}

impl ZonePoint {
    pub fn new(lat: f64, lon: f64, shipment_id: impl Into<ShipmentId>) -> Self {
        Self {
            lat,
            lon,
            shipment_id: shipment_id.into(),
        }
    }

    pub const fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}

/// How a zone boundary was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Convex hull of three or more non-collinear members.
    ConvexHull,
    /// Circle approximation around the centroid.
    Circle,
}

/// One zone produced by a generation run, before it is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedZone {
    /// 1-based ordinal within the run.
    pub ordinal: usize,
    pub label: String,
    pub description: String,
    /// Closed ring of `[longitude, latitude]` pairs.
    pub polygon: Vec<[f64; 2]>,
    pub boundary: Boundary,
    pub color: String,
    pub member_count: usize,
    pub member_ids: Vec<ShipmentId>,
    pub centroid: Coordinates,
}

/// Tuning for [`ZoneGenerationEngine`].
#[derive(Debug, Clone)]
pub struct ZoneGenerationConfig {
    /// Reference point for cardinal labels.
    pub depot: Coordinates,
    /// Radius of the circle used for clusters without a hull.
    pub fallback_radius_m: f64,
    /// Number of randomized clustering restarts.
    pub restarts: usize,
    /// Maximum Lloyd iterations per restart.
    pub max_iterations: usize,
    pub palette: Vec<String>,
}

impl Default for ZoneGenerationConfig {
    fn default() -> Self {
        Self {
            depot: DEFAULT_DEPOT,
            fallback_radius_m: 1_000.0,
            restarts: 10,
            max_iterations: 300,
            palette: DEFAULT_PALETTE.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Clusters geocoded shipments into coverage zones.
///
/// Generation is CPU-bound; services call it from a blocking worker (see
/// [`ZonePlanner`](crate::zones::ZonePlanner)) rather than on the I/O path.
#[derive(Debug, Clone, Default)]
pub struct ZoneGenerationEngine {
    config: ZoneGenerationConfig,
}

impl ZoneGenerationEngine {
    pub const fn new(config: ZoneGenerationConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &ZoneGenerationConfig {
        &self.config
    }

    /// Clusters `points` into at most `k` zones using OS-seeded randomness.
    pub fn generate_zones(&self, points: &[ZonePoint], k: usize) -> Vec<GeneratedZone> {
        self.generate_zones_with_rng(points, k, &mut StdRng::from_os_rng())
    }

    /// Same as [`generate_zones`](Self::generate_zones) with an explicit
    /// random source.
    pub fn generate_zones_with_rng<R: Rng + ?Sized>(
        &self,
        points: &[ZonePoint],
        k: usize,
        rng: &mut R,
    ) -> Vec<GeneratedZone> {
        let points: Vec<&ZonePoint> = points
            .iter()
            .filter(|p| {
                let valid = p.coordinates().is_valid();
                if !valid {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(shipment_id = %p.shipment_id, "Skipping point with invalid coordinates");
                }
                valid
            })
            .collect();

        if points.is_empty() || k == 0 {
            return Vec::new();
        }

        let data: Vec<[f64; 2]> = points.iter().map(|p| [p.lat, p.lon]).collect();
        let kmeans = KMeans::new(k, self.config.max_iterations, self.config.restarts);
        let Some(partition) = kmeans.fit(&data, rng) else {
            return Vec::new();
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            requested = k,
            clusters = partition.centers.len(),
            inertia = partition.inertia,
            "Clustered {} points",
            points.len()
        );

        let mut clusters: Vec<Vec<&ZonePoint>> = vec![Vec::new(); partition.centers.len()];
        for (&point, &label) in points.iter().zip(&partition.labels) {
            clusters[label].push(point);
        }

        let mut zones = Vec::with_capacity(clusters.len());
        for (_cluster_index, members) in clusters.into_iter().enumerate() {
            if members.is_empty() {
                continue;
            }

            match self.build_zone(zones.len() + 1, &members) {
                Ok(zone) => zones.push(zone),
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        cluster = _cluster_index,
                        members = members.len(),
                        "Dropping cluster: {_e}"
                    );
                }
            }
        }

        zones
    }

    fn build_zone(&self, ordinal: usize, members: &[&ZonePoint]) -> Result<GeneratedZone> {
        let coordinates: Vec<Coordinates> = members.iter().map(|p| p.coordinates()).collect();
        let centroid = geometry::centroid(&coordinates).ok_or_else(|| Error::Geometry {
            reason: "cluster has no members".to_string(),
        })?;

        let (polygon, boundary) = self.boundary_for(&coordinates, centroid);
        if !geometry::is_valid_ring(&polygon) {
            return Err(Error::Geometry {
                reason: format!("invalid boundary around {centroid}"),
            });
        }

        let direction = Direction::from_offset(centroid, self.config.depot);
        let color = self
            .config
            .palette
            .get((ordinal - 1) % self.config.palette.len().max(1))
            .cloned()
            .unwrap_or_else(|| DEFAULT_PALETTE[0].to_string());

        Ok(GeneratedZone {
            ordinal,
            label: zone_label(ordinal, direction),
            description: zone_description(members.len(), centroid),
            polygon,
            boundary,
            color,
            member_count: members.len(),
            member_ids: members.iter().map(|p| p.shipment_id.clone()).collect(),
            centroid,
        })
    }

    fn boundary_for(&self, coordinates: &[Coordinates], centroid: Coordinates) -> (Vec<[f64; 2]>, Boundary) {
        if coordinates.len() >= 3 {
            if let Some(hull) = geometry::convex_hull(coordinates) {
                return (hull, Boundary::ConvexHull);
            }
        }

        // One or two points, or a collinear cluster: cover every member.
        let farthest = coordinates
            .iter()
            .map(|&c| geometry::distance_m(centroid, c))
            .fold(0.0, f64::max);
        let radius = if farthest > 0.0 {
            self.config.fallback_radius_m.max(farthest + COLLINEAR_MARGIN_M)
        } else {
            self.config.fallback_radius_m
        };

        (
            geometry::circle_polygon(centroid, radius, CIRCLE_SEGMENTS),
            Boundary::Circle,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn cluster_around(center: Coordinates, n: usize, prefix: &str) -> Vec<ZonePoint> {
        (0..n)
            .map(|i| {
                let angle = i as f64 * core::f64::consts::TAU / n as f64;
                let radius = 0.002 + 0.001 * (i % 3) as f64;
                ZonePoint::new(
                    center.lat + radius * angle.sin(),
                    center.lon + radius * angle.cos(),
                    format!("{prefix}-{i}"),
                )
            })
            .collect()
    }

    fn seeded() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn north_cluster_is_labeled_norte() {
        let engine = ZoneGenerationEngine::default();
        let points = cluster_around(Coordinates::new(-34.60, -58.46), 10, "N");

        let zones = engine.generate_zones_with_rng(&points, 1, &mut seeded());

        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].label, "Zona 1 - Norte");
        assert_eq!(zones[0].boundary, Boundary::ConvexHull);
        assert_eq!(zones[0].member_count, 10);
    }

    #[test]
    fn depot_cluster_is_labeled_centro() {
        let engine = ZoneGenerationEngine::default();
        let points = cluster_around(Coordinates::new(-34.615, -58.475), 6, "C");

        let zones = engine.generate_zones_with_rng(&points, 1, &mut seeded());

        assert_eq!(zones[0].label, "Zona 1 - Centro");
    }

    #[test]
    fn every_point_lands_in_exactly_one_zone() {
        let engine = ZoneGenerationEngine::default();
        let mut points = cluster_around(Coordinates::new(-34.56, -58.46), 9, "N");
        points.extend(cluster_around(Coordinates::new(-34.70, -58.46), 7, "S"));
        points.extend(cluster_around(Coordinates::new(-34.63, -58.36), 8, "E"));
        points.extend(cluster_around(Coordinates::new(-34.63, -58.56), 5, "O"));

        for k in 1..=6 {
            let zones = engine.generate_zones_with_rng(&points, k, &mut seeded());
            assert_eq!(zones.len(), k);
            assert_eq!(zones.iter().map(|z| z.member_count).sum::<usize>(), points.len());

            let ids: Vec<&ShipmentId> = zones.iter().flat_map(|z| &z.member_ids).collect();
            let unique: HashSet<&ShipmentId> = ids.iter().copied().collect();
            assert_eq!(ids.len(), points.len());
            assert_eq!(unique.len(), points.len());

            for zone in &zones {
                assert!(geometry::is_valid_ring(&zone.polygon));
            }
        }
    }

    #[test]
    fn k_is_reduced_to_the_point_count() {
        let engine = ZoneGenerationEngine::default();
        let points = vec![
            ZonePoint::new(-34.60, -58.46, "a"),
            ZonePoint::new(-34.70, -58.40, "b"),
        ];

        let zones = engine.generate_zones_with_rng(&points, 5, &mut seeded());

        assert_eq!(zones.len(), 2);
        for zone in zones {
            assert_eq!(zone.boundary, Boundary::Circle);
            assert_eq!(zone.member_count, 1);
            assert!(geometry::is_valid_ring(&zone.polygon));
        }
    }

    #[test]
    fn small_clusters_fall_back_to_a_circle() {
        let engine = ZoneGenerationEngine::default();
        let points = vec![
            ZonePoint::new(-34.600, -58.460, "a"),
            ZonePoint::new(-34.601, -58.461, "b"),
        ];

        let zones = engine.generate_zones_with_rng(&points, 1, &mut seeded());

        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].boundary, Boundary::Circle);
        assert_eq!(zones[0].polygon.first(), zones[0].polygon.last());
        for point in &points {
            assert!(geometry::contains_with_buffer(&zones[0].polygon, point.coordinates(), 0.0));
        }
    }

    #[test]
    fn collinear_clusters_cover_all_members() {
        let engine = ZoneGenerationEngine::default();
        let points: Vec<ZonePoint> = (0..5)
            .map(|i| ZonePoint::new(-34.60, -58.50 + 0.01 * i as f64, format!("c{i}")))
            .collect();

        let zones = engine.generate_zones_with_rng(&points, 1, &mut seeded());

        assert_eq!(zones[0].boundary, Boundary::Circle);
        for point in &points {
            assert!(geometry::contains_with_buffer(&zones[0].polygon, point.coordinates(), 0.0));
        }
    }

    #[test]
    fn empty_and_invalid_input() {
        let engine = ZoneGenerationEngine::default();
        assert!(engine.generate_zones(&[], 3).is_empty());

        let points = vec![
            ZonePoint::new(f64::NAN, -58.46, "bad"),
            ZonePoint::new(-34.60, -58.46, "good"),
        ];
        let zones = engine.generate_zones_with_rng(&points, 2, &mut seeded());
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].member_ids, vec!["good".to_string()]);
    }

    #[test]
    fn colors_cycle_through_the_palette() {
        let engine = ZoneGenerationEngine::default();
        let points: Vec<ZonePoint> = (0..10)
            .map(|i| ZonePoint::new(-34.50 - 0.05 * i as f64, -58.46, format!("p{i}")))
            .collect();

        let zones = engine.generate_zones_with_rng(&points, 10, &mut seeded());

        assert_eq!(zones.len(), 10);
        assert_eq!(zones[0].color, DEFAULT_PALETTE[0]);
        assert_eq!(zones[8].color, DEFAULT_PALETTE[0]);
        assert_eq!(zones[9].color, DEFAULT_PALETTE[1]);
    }
}
