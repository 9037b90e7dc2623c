use super::{AssignmentStore, CourierDirectory, CreateOutcome, ZoneStore};
use crate::zones::GeneratedZone;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use turbo_routing_core::{
    AssignmentMethod, Courier, CourierId, DeliveryStatus, DeliveryZone, Error, Result,
    ShipmentAssignment, ZoneId,
};

/// Serializable image of an [`InMemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub zones: Vec<DeliveryZone>,
    #[serde(default)]
    pub couriers: Vec<Courier>,
    #[serde(default)]
    pub assignments: Vec<ShipmentAssignment>,
}

#[derive(Debug, Default)]
struct ZoneState {
    zones: Vec<DeliveryZone>,
    next_id: ZoneId,
    version: u64,
}

/// Process-local store implementing every store trait.
///
/// Zones and couriers sit behind reader-writer locks; assignments sit behind
/// a mutex so the uniqueness check and the insert cannot interleave.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    zones: RwLock<ZoneState>,
    couriers: RwLock<Vec<Courier>>,
    assignments: Mutex<Vec<ShipmentAssignment>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a store from a snapshot. Zone ids continue after the largest
    /// id present and the version after the newest zone set.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        store.restore(snapshot);
        store
    }

    /// Replaces the whole contents with `snapshot`, e.g. after another
    /// process rewrote the backing files.
    pub fn restore(&self, snapshot: StoreSnapshot) {
        let next_id = snapshot.zones.iter().map(|z| z.id).max().map_or(1, |id| id + 1);
        let version = snapshot.zones.iter().map(|z| z.version).max().unwrap_or(0);

        *self.zones.write() = ZoneState {
            zones: snapshot.zones,
            next_id,
            version,
        };
        *self.couriers.write() = snapshot.couriers;
        *self.assignments.lock() = snapshot.assignments;
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            zones: self.zones.read().zones.clone(),
            couriers: self.couriers.read().clone(),
            assignments: self.assignments.lock().clone(),
        }
    }

    /// Replaces the courier directory contents.
    pub fn set_couriers(&self, couriers: Vec<Courier>) {
        *self.couriers.write() = couriers;
    }

    /// Version of the currently active zone set; `0` before the first commit.
    pub fn zone_version(&self) -> u64 {
        self.zones.read().version
    }
}

impl ZoneStore for InMemoryStore {
    async fn active_zones(&self) -> Result<Vec<DeliveryZone>> {
        let state = self.zones.read();
        let mut zones: Vec<DeliveryZone> = state.zones.iter().filter(|z| z.active).cloned().collect();
        zones.sort_by_key(|z| z.id);
        Ok(zones)
    }

    async fn replace_zones(&self, zones: Vec<GeneratedZone>) -> Result<Vec<DeliveryZone>> {
        let mut state = self.zones.write();
        state.version += 1;
        let version = state.version;

        // Superseded zones are only kept while an open assignment points at
        // them.
        let referenced: HashSet<ZoneId> = self
            .assignments
            .lock()
            .iter()
            .filter(|a| a.is_active())
            .map(|a| a.zone_id)
            .collect();
        state.zones.retain(|z| referenced.contains(&z.id));
        for zone in state.zones.iter_mut() {
            zone.active = false;
        }

        let mut committed = Vec::with_capacity(zones.len());
        for zone in zones {
            let id = state.next_id.max(1);
            state.next_id = id + 1;
            committed.push(DeliveryZone {
                id,
                name: zone.label,
                polygon: zone.polygon,
                color: zone.color,
                active: true,
                courier_id: None,
                description: zone.description,
                member_count: zone.member_count,
                centroid: zone.centroid,
                version,
            });
        }
        state.zones.extend(committed.iter().cloned());

        Ok(committed)
    }

    async fn bind_courier(&self, zone_id: ZoneId, courier_id: Option<CourierId>) -> Result<DeliveryZone> {
        if let Some(courier_id) = courier_id {
            if !self.couriers.read().iter().any(|c| c.id == courier_id) {
                return Err(Error::InvalidRequest {
                    reason: format!("unknown courier {courier_id}"),
                });
            }
        }

        let mut state = self.zones.write();
        if !state.zones.iter().any(|z| z.id == zone_id && z.active) {
            return Err(Error::ZoneNotFound { zone_id });
        }

        let mut bound = None;
        for zone in state.zones.iter_mut().filter(|z| z.active) {
            if zone.id == zone_id {
                zone.courier_id = courier_id;
                bound = Some(zone.clone());
            } else if courier_id.is_some() && zone.courier_id == courier_id {
                zone.courier_id = None;
            }
        }

        bound.ok_or(Error::ZoneNotFound { zone_id })
    }
}

impl CourierDirectory for InMemoryStore {
    async fn couriers(&self) -> Result<Vec<Courier>> {
        Ok(self.couriers.read().clone())
    }
}

impl AssignmentStore for InMemoryStore {
    async fn active_assignment(&self, shipment_id: &str) -> Result<Option<ShipmentAssignment>> {
        Ok(self
            .assignments
            .lock()
            .iter()
            .find(|a| a.shipment_id == shipment_id && a.is_active())
            .cloned())
    }

    async fn create_if_absent(&self, assignment: ShipmentAssignment) -> Result<CreateOutcome> {
        let mut assignments = self.assignments.lock();
        if let Some(existing) = assignments
            .iter()
            .find(|a| a.shipment_id == assignment.shipment_id && a.is_active())
        {
            return Ok(CreateOutcome::AlreadyActive(existing.clone()));
        }

        assignments.push(assignment.clone());
        Ok(CreateOutcome::Created(assignment))
    }

    async fn update_status(
        &self,
        shipment_id: &str,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<ShipmentAssignment> {
        let mut assignments = self.assignments.lock();
        let assignment = assignments
            .iter_mut()
            .find(|a| a.shipment_id == shipment_id && a.is_active())
            .ok_or_else(|| Error::AssignmentNotFound {
                shipment_id: shipment_id.to_string(),
            })?;

        if !assignment.status.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                shipment_id: shipment_id.to_string(),
                from: assignment.status,
                to: status,
            });
        }

        assignment.status = status;
        if status == DeliveryStatus::Delivered {
            assignment.delivered_at = Some(at);
        }

        Ok(assignment.clone())
    }

    async fn reassign(
        &self,
        shipment_id: &str,
        zone_id: ZoneId,
        courier_id: CourierId,
        at: DateTime<Utc>,
    ) -> Result<ShipmentAssignment> {
        let mut assignments = self.assignments.lock();
        let assignment = assignments
            .iter_mut()
            .find(|a| a.shipment_id == shipment_id && a.is_active())
            .ok_or_else(|| Error::AssignmentNotFound {
                shipment_id: shipment_id.to_string(),
            })?;

        assignment.zone_id = zone_id;
        assignment.courier_id = courier_id;
        assignment.method = AssignmentMethod::Manual;
        assignment.assigned_at = at;
        if assignment.status == DeliveryStatus::Pending {
            assignment.status = DeliveryStatus::Assigned;
        }

        Ok(assignment.clone())
    }

    async fn assignments(&self) -> Result<Vec<ShipmentAssignment>> {
        Ok(self.assignments.lock().clone())
    }
}
