//! Point-in-zone matching of geocoded shipments.
//!
//! Matching is purely geometric and deterministic: zones are tested in the
//! order given, each polygon grown by a fixed buffer to absorb geocoding
//! imprecision. When buffers overlap, the first usable zone wins.

use crate::geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use turbo_routing_core::{Coordinates, Courier, CourierId, DeliveryZone, ShipmentId, ZoneId};

/// Default tolerance around every zone boundary, in metres.
pub const DEFAULT_BUFFER_M: f64 = 100.0;

/// A shipment with resolved coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedShipment {
    pub shipment_id: ShipmentId,
    pub coordinates: Coordinates,
}

impl LocatedShipment {
    pub fn new(shipment_id: impl Into<ShipmentId>, lat: f64, lon: f64) -> Self {
        Self {
            shipment_id: shipment_id.into(),
            coordinates: Coordinates::new(lat, lon),
        }
    }
}

/// A shipment matched to a zone with a usable courier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneMatch {
    pub shipment_id: ShipmentId,
    pub zone_id: ZoneId,
    pub courier_id: CourierId,
    pub coordinates: Coordinates,
}

/// Why a shipment was left for manual assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnassignedReason {
    /// No zone contains the point, even with the buffer.
    OutsideAllZones,
    /// Only zones without a bound, active courier contain the point.
    ZoneWithoutCourier { zone_ids: Vec<ZoneId> },
}

impl fmt::Display for UnassignedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutsideAllZones => f.write_str("outside all zones"),
            Self::ZoneWithoutCourier { zone_ids } => {
                let ids: Vec<String> = zone_ids.iter().map(ToString::to_string).collect();
                write!(f, "zone(s) {} have no active courier", ids.join(", "))
            }
        }
    }
}

/// A shipment left for manual assignment, with the coordinate kept for
/// boundary review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignedShipment {
    pub shipment_id: ShipmentId,
    pub coordinates: Coordinates,
    pub reason: UnassignedReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchAssignment {
    pub assigned: Vec<ZoneMatch>,
    pub unassigned: Vec<UnassignedShipment>,
}

/// Buffered point-in-polygon matcher.
#[derive(Debug, Clone, Copy)]
pub struct ZoneAssignmentEngine {
    buffer_m: f64,
}

impl Default for ZoneAssignmentEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_M)
    }
}

impl ZoneAssignmentEngine {
    pub const fn new(buffer_m: f64) -> Self {
        Self { buffer_m }
    }

    pub const fn buffer_m(&self) -> f64 {
        self.buffer_m
    }

    /// Whether the point lies in the zone polygon grown by the buffer.
    /// Points on the original boundary are inside.
    pub fn point_in_zone(&self, lat: f64, lon: f64, zone: &DeliveryZone) -> bool {
        geometry::contains_with_buffer(&zone.polygon, Coordinates::new(lat, lon), self.buffer_m)
    }

    /// Returns the first active zone, in the given order, containing the
    /// point.
    pub fn assign_point(&self, lat: f64, lon: f64, zones: &[DeliveryZone]) -> Option<ZoneId> {
        zones
            .iter()
            .filter(|zone| zone.active)
            .find(|zone| self.point_in_zone(lat, lon, zone))
            .map(|zone| zone.id)
    }

    /// Matches every shipment against `zones`.
    ///
    /// A zone is usable when it is active and bound to a courier that is
    /// active in `couriers`. Each shipment goes to the first usable zone
    /// containing it; shipments matched only by unusable zones, or by none,
    /// are returned as unassigned with the reason.
    pub fn assign_batch(
        &self,
        shipments: &[LocatedShipment],
        zones: &[DeliveryZone],
        couriers: &[Courier],
    ) -> BatchAssignment {
        let active_couriers: HashSet<CourierId> =
            couriers.iter().filter(|c| c.active).map(|c| c.id).collect();
        let active_zones: Vec<&DeliveryZone> = zones.iter().filter(|z| z.active).collect();

        let mut batch = BatchAssignment::default();
        for shipment in shipments {
            let Coordinates { lat, lon } = shipment.coordinates;
            let mut uncovered = Vec::new();
            let mut matched = None;

            for zone in &active_zones {
                if !self.point_in_zone(lat, lon, zone) {
                    continue;
                }
                match zone.courier_id.filter(|id| active_couriers.contains(id)) {
                    Some(courier_id) => {
                        matched = Some((zone.id, courier_id));
                        break;
                    }
                    None => uncovered.push(zone.id),
                }
            }

            match matched {
                Some((zone_id, courier_id)) => batch.assigned.push(ZoneMatch {
                    shipment_id: shipment.shipment_id.clone(),
                    zone_id,
                    courier_id,
                    coordinates: shipment.coordinates,
                }),
                None => {
                    let reason = if uncovered.is_empty() {
                        UnassignedReason::OutsideAllZones
                    } else {
                        UnassignedReason::ZoneWithoutCourier { zone_ids: uncovered }
                    };
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        shipment_id = %shipment.shipment_id,
                        coordinates = %shipment.coordinates,
                        %reason,
                        "Shipment left unassigned"
                    );
                    batch.unassigned.push(UnassignedShipment {
                        shipment_id: shipment.shipment_id.clone(),
                        coordinates: shipment.coordinates,
                        reason,
                    });
                }
            }
        }

        batch
    }
}
