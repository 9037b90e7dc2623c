//! # Turbo routing data contracts
//!
//! Serializable types shared by the routing engines, the stores and the
//! server binary. Field names follow the wire shape expected by the
//! downstream delivery-tracking and reporting consumers.
//!
//! Polygons are stored as closed rings of `[longitude, latitude]` pairs, the
//! same axis order the geocoding provider returns, while [`Coordinates`]
//! always names its axes explicitly.

use chrono::{DateTime, Utc};
use core::fmt;
use serde::{Deserialize, Serialize};

/// Identifier of a delivery zone. Only unique within the zone directory.
pub type ZoneId = u64;

/// Identifier of a courier in the courier directory.
pub type CourierId = u64;

/// External shipment reference (ERP order number or tracking code).
pub type ShipmentId = String;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Builds coordinates from a provider `[longitude, latitude]` pair.
    pub const fn from_lon_lat(pair: [f64; 2]) -> Self {
        Self {
            lat: pair[1],
            lon: pair[0],
        }
    }

    /// Returns the `[longitude, latitude]` pair used by polygon rings.
    pub const fn to_lon_lat(self) -> [f64; 2] {
        [self.lon, self.lat]
    }

    /// Whether both axes are finite and inside their geographic ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// A delivery rider. Zones and assignments reference couriers by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Courier {
    pub id: CourierId,
    pub name: String,
    pub active: bool,
    #[serde(default)]
    pub preferred_zone: Option<ZoneId>,
}

/// A coverage zone produced by a zone-generation run.
///
/// Zone sets are ephemeral snapshots: `version` identifies the regeneration
/// that produced the zone and ids are never reused across versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryZone {
    pub id: ZoneId,
    pub name: String,
    /// Closed ring of `[longitude, latitude]` pairs.
    pub polygon: Vec<[f64; 2]>,
    pub color: String,
    pub active: bool,
    #[serde(default)]
    pub courier_id: Option<CourierId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub member_count: usize,
    pub centroid: Coordinates,
    #[serde(default)]
    pub version: u64,
}

/// Lifecycle of a shipment and of its assignment record.
///
/// `pending -> assigned -> en_route -> delivered`, with `cancelled`
/// reachable from `pending` and `assigned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    EnRoute,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    /// Terminal states never change again and free the shipment id for a new
    /// assignment.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Assigned)
                | (Self::Pending, Self::Cancelled)
                | (Self::Assigned, Self::EnRoute)
                | (Self::Assigned, Self::Cancelled)
                | (Self::EnRoute, Self::Delivered)
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::EnRoute => "en_route",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an assignment came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    Automatic,
    Manual,
}

/// The binding of one shipment to a zone and courier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentAssignment {
    pub shipment_id: ShipmentId,
    pub zone_id: ZoneId,
    pub courier_id: CourierId,
    pub method: AssignmentMethod,
    pub status: DeliveryStatus,
    pub assigned_at: DateTime<Utc>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl ShipmentAssignment {
    pub fn automatic(
        shipment_id: impl Into<ShipmentId>,
        zone_id: ZoneId,
        courier_id: CourierId,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            shipment_id: shipment_id.into(),
            zone_id,
            courier_id,
            method: AssignmentMethod::Automatic,
            status: DeliveryStatus::Assigned,
            assigned_at,
            delivered_at: None,
        }
    }

    pub const fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// The record published to delivery-tracking and reporting consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub shipment_id: ShipmentId,
    pub zone_id: ZoneId,
    pub courier_id: CourierId,
    pub assigned_at: DateTime<Utc>,
    pub method: AssignmentMethod,
    pub status: DeliveryStatus,
}

impl From<&ShipmentAssignment> for AssignmentRecord {
    fn from(assignment: &ShipmentAssignment) -> Self {
        Self {
            shipment_id: assignment.shipment_id.clone(),
            zone_id: assignment.zone_id,
            courier_id: assignment.courier_id,
            assigned_at: assignment.assigned_at,
            method: assignment.method,
            status: assignment.status,
        }
    }
}

/// A resolved address, keyed by the fingerprint of its normalized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodingCacheEntry {
    pub fingerprint: String,
    pub normalized_address: String,
    pub lat: f64,
    pub lon: f64,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

impl GeocodingCacheEntry {
    pub const fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}

/// A shipment as supplied by the external shipment source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    pub shipment_id: ShipmentId,
    pub address: String,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

impl ShipmentRecord {
    /// Returns the resolved coordinates, if the source already supplied
    /// valid ones.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)).filter(Coordinates::is_valid),
            _ => None,
        }
    }
}
