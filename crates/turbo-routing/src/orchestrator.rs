//! Automatic assignment passes over pending shipments.
//!
//! A pass pulls pending shipments, geocodes the ones without coordinates,
//! matches them against the active zone set and records one assignment per
//! matched shipment. Per-shipment failures are isolated and reported in the
//! [`AssignmentRunSummary`]; only a failing shipment source or zone directory
//! fails the pass as a whole.

use crate::assignment::{LocatedShipment, UnassignedShipment, ZoneAssignmentEngine};
use crate::geocoding::{GeocodingCache, GeocodingProvider, GeocodingService};
use crate::shipments::ShipmentSource;
use crate::store::{AssignmentStore, CourierDirectory, CreateOutcome, ZoneStore};
use crate::time::{SystemClock, TimeSource, to_datetime};
use crate::zones::{ZonePlanner, ZonePoint};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use turbo_routing_core::{
    AssignmentRecord, Courier, DeliveryZone, Error, Result, ShipmentAssignment, ShipmentId,
    ShipmentRecord,
};

#[cfg(test)]
mod tests;

/// Longest error list kept in a summary; `error_count` still counts all.
pub const MAX_REPORTED_ERRORS: usize = 20;

/// Where pending shipments are geocoded.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub city: String,
    pub country: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            city: "Buenos Aires".to_string(),
            country: "ar".to_string(),
        }
    }
}

/// Result of one automatic assignment pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssignmentRunSummary {
    /// Pending shipments considered.
    pub eligible: usize,
    pub assigned: Vec<AssignmentRecord>,
    /// Matched shipments that already had a non-terminal assignment.
    pub already_assigned: usize,
    pub unassigned: Vec<UnassignedShipment>,
    pub geocoding_failed: Vec<ShipmentId>,
    /// Set when a provider outage cut geocoding short.
    pub geocoding_outage: Option<String>,
    pub errors: Vec<String>,
    pub error_count: usize,
    /// Set when a precondition made the pass a no-op.
    pub nothing_to_assign: Option<String>,
}

impl AssignmentRunSummary {
    fn nothing_to_assign(eligible: usize, reason: &str) -> Self {
        Self {
            eligible,
            nothing_to_assign: Some(reason.to_string()),
            ..Self::default()
        }
    }

    fn record_error(&mut self, message: String) {
        self.error_count += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(message);
        }
    }
}

/// Result of [`AutoAssignmentOrchestrator::plan_zones`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonePlanReport {
    pub zones: Vec<DeliveryZone>,
    pub clustered: usize,
    pub geocoding_failed: Vec<ShipmentId>,
}

struct Located {
    shipments: Vec<LocatedShipment>,
    failed: Vec<ShipmentId>,
    outage: Option<String>,
}

pub struct AutoAssignmentOrchestrator<S, C, P, R, T = SystemClock>
where
    S: ShipmentSource,
    C: GeocodingCache,
    P: GeocodingProvider,
    R: ZoneStore + CourierDirectory + AssignmentStore,
    T: TimeSource<u64>,
{
    config: OrchestratorConfig,
    shipments: Arc<S>,
    geocoder: Arc<GeocodingService<C, P>>,
    store: Arc<R>,
    planner: Arc<ZonePlanner<R>>,
    engine: ZoneAssignmentEngine,
    clock: T,
    cancel: CancellationToken,
}

impl<S, C, P, R> AutoAssignmentOrchestrator<S, C, P, R, SystemClock>
where
    S: ShipmentSource,
    C: GeocodingCache,
    P: GeocodingProvider,
    R: ZoneStore + CourierDirectory + AssignmentStore,
{
    pub fn new(
        config: OrchestratorConfig,
        shipments: Arc<S>,
        geocoder: Arc<GeocodingService<C, P>>,
        planner: Arc<ZonePlanner<R>>,
        engine: ZoneAssignmentEngine,
    ) -> Self {
        Self::with_clock(config, shipments, geocoder, planner, engine, SystemClock)
    }
}

impl<S, C, P, R, T> AutoAssignmentOrchestrator<S, C, P, R, T>
where
    S: ShipmentSource,
    C: GeocodingCache,
    P: GeocodingProvider,
    R: ZoneStore + CourierDirectory + AssignmentStore,
    T: TimeSource<u64> + Send + Sync,
{
    pub fn with_clock(
        config: OrchestratorConfig,
        shipments: Arc<S>,
        geocoder: Arc<GeocodingService<C, P>>,
        planner: Arc<ZonePlanner<R>>,
        engine: ZoneAssignmentEngine,
        clock: T,
    ) -> Self {
        Self {
            config,
            shipments,
            geocoder,
            store: Arc::clone(planner.store()),
            planner,
            engine,
            clock,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts in-flight geocoding when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub const fn planner(&self) -> &Arc<ZonePlanner<R>> {
        &self.planner
    }

    /// Runs one automatic assignment pass.
    ///
    /// # Errors
    ///
    /// Fails only when the shipment source or one of the store directories
    /// cannot be read. Everything per shipment lands in the summary.
    ///
    /// Shipments with an open assignment are counted as already assigned and
    /// are neither geocoded nor matched.
    pub async fn run(&self) -> Result<AssignmentRunSummary> {
        let pending = self.shipments.pending_shipments().await?;
        if pending.is_empty() {
            return Ok(AssignmentRunSummary::nothing_to_assign(0, "no pending shipments"));
        }

        let _zone_set = self.planner.read_zone_set().await;
        let zones = self.store.active_zones().await?;
        let couriers = self.store.couriers().await?;

        if let Some(reason) = coverage_gap(&zones, &couriers) {
            #[cfg(feature = "tracing")]
            tracing::info!(pending = pending.len(), reason, "Nothing to assign");
            return Ok(AssignmentRunSummary::nothing_to_assign(pending.len(), reason));
        }

        let eligible = pending.len();
        let open: HashSet<ShipmentId> = self
            .store
            .assignments()
            .await?
            .into_iter()
            .filter(|a| a.is_active())
            .map(|a| a.shipment_id)
            .collect();
        let (held, pending): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|s| open.contains(&s.shipment_id));

        let located = self.locate(&pending).await;
        let batch = self.engine.assign_batch(&located.shipments, &zones, &couriers);

        let mut summary = AssignmentRunSummary {
            eligible,
            already_assigned: held.len(),
            unassigned: batch.unassigned,
            geocoding_failed: located.failed,
            geocoding_outage: located.outage,
            ..AssignmentRunSummary::default()
        };

        for matched in batch.assigned {
            let assignment = ShipmentAssignment::automatic(
                matched.shipment_id.clone(),
                matched.zone_id,
                matched.courier_id,
                to_datetime(self.clock.current_millis()),
            );

            match self.store.create_if_absent(assignment).await {
                Ok(CreateOutcome::Created(created)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        shipment_id = %created.shipment_id,
                        zone_id = created.zone_id,
                        courier_id = created.courier_id,
                        "Assigned shipment"
                    );
                    summary.assigned.push(AssignmentRecord::from(&created));
                }
                Ok(CreateOutcome::AlreadyActive(_)) => summary.already_assigned += 1,
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(shipment_id = %matched.shipment_id, error = %e, "Failed to store assignment");
                    summary.record_error(format!("{}: {e}", matched.shipment_id));
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            eligible = summary.eligible,
            assigned = summary.assigned.len(),
            already_assigned = summary.already_assigned,
            unassigned = summary.unassigned.len(),
            geocoding_failed = summary.geocoding_failed.len(),
            errors = summary.error_count,
            "Assignment pass finished"
        );

        Ok(summary)
    }

    /// Geocodes pending shipments and regenerates the zone set from them.
    ///
    /// # Errors
    ///
    /// Propagates planner errors, including
    /// [`Error::ConcurrentRegenerationConflict`].
    pub async fn plan_zones(&self, k: usize) -> Result<ZonePlanReport> {
        let pending = self.shipments.pending_shipments().await?;
        let located = self.locate(&pending).await;
        if let Some(_outage) = &located.outage {
            #[cfg(feature = "tracing")]
            tracing::warn!(outage = %_outage, "Planning zones without part of the shipments");
        }

        let points: Vec<ZonePoint> = located
            .shipments
            .iter()
            .map(|s| ZonePoint::new(s.coordinates.lat, s.coordinates.lon, s.shipment_id.clone()))
            .collect();
        if points.is_empty() {
            return Err(Error::InsufficientCoverage {
                reason: "no geocoded pending shipments to cluster".to_string(),
            });
        }

        let clustered = points.len();
        let zones = self.planner.regenerate(points, k).await?;

        Ok(ZonePlanReport {
            zones,
            clustered,
            geocoding_failed: located.failed,
        })
    }

    async fn locate(&self, pending: &[ShipmentRecord]) -> Located {
        let mut seen = HashSet::new();
        let addresses: Vec<String> = pending
            .iter()
            .filter(|s| s.coordinates().is_none())
            .filter(|s| seen.insert(s.address.clone()))
            .map(|s| s.address.clone())
            .collect();

        let report = if addresses.is_empty() {
            Default::default()
        } else {
            self.geocoder
                .geocode_batch(&addresses, &self.config.city, &self.config.country, &self.cancel)
                .await
        };

        let mut located = Located {
            shipments: Vec::with_capacity(pending.len()),
            failed: Vec::new(),
            outage: report.outage.clone(),
        };

        for shipment in pending {
            match shipment.coordinates().or_else(|| report.resolved(&shipment.address)) {
                Some(coordinates) => located.shipments.push(LocatedShipment {
                    shipment_id: shipment.shipment_id.clone(),
                    coordinates,
                }),
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(shipment_id = %shipment.shipment_id, "Could not geocode shipment");
                    located.failed.push(shipment.shipment_id.clone());
                }
            }
        }

        located
    }
}

fn coverage_gap(zones: &[DeliveryZone], couriers: &[Courier]) -> Option<&'static str> {
    if zones.is_empty() {
        return Some("no active zones");
    }
    let active: HashSet<_> = couriers.iter().filter(|c| c.active).map(|c| c.id).collect();
    if active.is_empty() {
        return Some("no active couriers");
    }
    if !zones
        .iter()
        .any(|z| z.courier_id.is_some_and(|id| active.contains(&id)))
    {
        return Some("no zones bound to an active courier");
    }
    None
}
