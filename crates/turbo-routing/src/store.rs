//! Persistence seams for zones, couriers and assignment records.
//!
//! The routing core never talks to a database directly. Each concern is a
//! trait whose futures are `Send`, so services can hold stores behind an
//! `Arc` and drive them from spawned tasks. [`InMemoryStore`] implements all
//! three and is what tests and the file-backed server use.

mod memory;

pub use memory::*;

use crate::zones::GeneratedZone;
use chrono::{DateTime, Utc};
use core::future::Future;
use turbo_routing_core::{
    Courier, CourierId, DeliveryStatus, DeliveryZone, Result, ShipmentAssignment, ZoneId,
};

/// Outcome of [`AssignmentStore::create_if_absent`].
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// The assignment was stored.
    Created(ShipmentAssignment),
    /// A non-terminal assignment already existed and was left untouched.
    AlreadyActive(ShipmentAssignment),
}

/// The zone directory. Written by zone regeneration, read by assignment.
pub trait ZoneStore: Send + Sync {
    /// Active zones ordered by ascending id.
    fn active_zones(&self) -> impl Future<Output = Result<Vec<DeliveryZone>>> + Send;

    /// Atomically deactivates the current zone set and activates `zones` as
    /// the next version. Returns the committed zones.
    fn replace_zones(
        &self,
        zones: Vec<GeneratedZone>,
    ) -> impl Future<Output = Result<Vec<DeliveryZone>>> + Send;

    /// Binds `courier_id` to an active zone, or unbinds with `None`. A courier
    /// is bound to at most one zone, so any previous binding is released.
    fn bind_courier(
        &self,
        zone_id: ZoneId,
        courier_id: Option<CourierId>,
    ) -> impl Future<Output = Result<DeliveryZone>> + Send;
}

/// Read-only courier reference data.
pub trait CourierDirectory: Send + Sync {
    fn couriers(&self) -> impl Future<Output = Result<Vec<Courier>>> + Send;
}

/// Assignment records with at-most-one non-terminal assignment per shipment.
pub trait AssignmentStore: Send + Sync {
    fn active_assignment(
        &self,
        shipment_id: &str,
    ) -> impl Future<Output = Result<Option<ShipmentAssignment>>> + Send;

    /// Stores `assignment` unless the shipment already has a non-terminal
    /// one. The check and the insert are a single critical section.
    fn create_if_absent(
        &self,
        assignment: ShipmentAssignment,
    ) -> impl Future<Output = Result<CreateOutcome>> + Send;

    /// Moves the active assignment along the lifecycle.
    fn update_status(
        &self,
        shipment_id: &str,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<ShipmentAssignment>> + Send;

    /// Explicitly re-points a non-terminal assignment at another zone and
    /// courier. The method becomes `manual`.
    fn reassign(
        &self,
        shipment_id: &str,
        zone_id: ZoneId,
        courier_id: CourierId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<ShipmentAssignment>> + Send;

    /// Every assignment ever stored, terminal ones included.
    fn assignments(&self) -> impl Future<Output = Result<Vec<ShipmentAssignment>>> + Send;
}
