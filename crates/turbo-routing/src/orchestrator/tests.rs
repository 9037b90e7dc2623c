use super::*;
use crate::assignment::UnassignedReason;
use crate::geocoding::service::tests::MockProvider;
use crate::geocoding::{GeocodingConfig, InMemoryGeocodingCache, ProviderError};
use crate::shipments::StaticShipmentSource;
use crate::store::{InMemoryStore, StoreSnapshot};
use crate::time::tests::MockTime;
use crate::zones::{GeneratedZone, PlannerConfig, ZoneGenerationEngine};
use chrono::{DateTime, Utc};
use core::time::Duration;
use turbo_routing_core::{
    AssignmentMethod, Coordinates, CourierId, DeliveryStatus, ZoneId,
};

const NOW_MS: u64 = 1_704_067_200_000;

type TestOrchestrator<R> = AutoAssignmentOrchestrator<
    StaticShipmentSource,
    InMemoryGeocodingCache,
    MockProvider,
    R,
    MockTime,
>;

fn zone(id: ZoneId, center: (f64, f64), courier_id: Option<CourierId>) -> DeliveryZone {
    let (lat, lon) = center;
    let half = 0.01;
    DeliveryZone {
        id,
        name: format!("Zona {id}"),
        polygon: vec![
            [lon - half, lat - half],
            [lon + half, lat - half],
            [lon + half, lat + half],
            [lon - half, lat + half],
            [lon - half, lat - half],
        ],
        color: "#4ECDC4".to_string(),
        active: true,
        courier_id,
        description: String::new(),
        member_count: 0,
        centroid: Coordinates::new(lat, lon),
        version: 1,
    }
}

fn courier(id: CourierId) -> Courier {
    Courier {
        id,
        name: format!("Motoquero {id}"),
        active: true,
        preferred_zone: None,
    }
}

fn located(id: &str, lat: f64, lon: f64) -> ShipmentRecord {
    ShipmentRecord {
        shipment_id: id.to_string(),
        address: format!("Calle {id}"),
        status: DeliveryStatus::Pending,
        lat: Some(lat),
        lon: Some(lon),
    }
}

fn unlocated(id: &str, address: &str) -> ShipmentRecord {
    ShipmentRecord {
        shipment_id: id.to_string(),
        address: address.to_string(),
        status: DeliveryStatus::Pending,
        lat: None,
        lon: None,
    }
}

fn orchestrator<R>(
    store: Arc<R>,
    shipments: Vec<ShipmentRecord>,
    provider: MockProvider,
) -> TestOrchestrator<R>
where
    R: ZoneStore + CourierDirectory + AssignmentStore,
{
    let geocoder = GeocodingService::new(
        GeocodingConfig {
            min_delay: Duration::ZERO,
            ..GeocodingConfig::default()
        },
        InMemoryGeocodingCache::new(),
        provider,
    );
    let planner = ZonePlanner::new(
        PlannerConfig::default(),
        store,
        ZoneGenerationEngine::default(),
    );

    AutoAssignmentOrchestrator::with_clock(
        OrchestratorConfig {
            city: "CABA".to_string(),
            country: "ar".to_string(),
        },
        Arc::new(StaticShipmentSource::new(shipments)),
        Arc::new(geocoder),
        Arc::new(planner),
        ZoneAssignmentEngine::default(),
        MockTime::at(NOW_MS),
    )
}

fn covered_store(assignments: Vec<ShipmentAssignment>) -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::from_snapshot(StoreSnapshot {
        zones: vec![
            zone(1, (-34.60, -58.46), Some(10)),
            zone(2, (-34.56, -58.40), None),
        ],
        couriers: vec![courier(10)],
        assignments,
    }))
}

#[tokio::test]
async fn assigns_matched_shipments_and_reports_the_rest() {
    let store = covered_store(Vec::new());
    let mut delivered = located("D1", -34.60, -58.46);
    delivered.status = DeliveryStatus::Delivered;

    let orchestrator = orchestrator(
        Arc::clone(&store),
        vec![
            located("A1", -34.601, -58.461),
            unlocated("A2", "Av. Rivadavia 6500"),
            located("B1", -34.56, -58.40),
            located("X1", -34.80, -58.70),
            unlocated("G1", "Calle Inexistente 1"),
            delivered,
        ],
        MockProvider::new().with_match("Av. Rivadavia 6500", -34.605, -58.455),
    );

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.eligible, 5);
    assert_eq!(summary.nothing_to_assign, None);
    let assigned: Vec<_> = summary.assigned.iter().map(|a| a.shipment_id.as_str()).collect();
    assert_eq!(assigned, ["A1", "A2"]);
    assert!(summary.assigned.iter().all(|a| {
        a.zone_id == 1
            && a.courier_id == 10
            && a.method == AssignmentMethod::Automatic
            && a.status == DeliveryStatus::Assigned
            && a.assigned_at == DateTime::<Utc>::from_timestamp_millis(NOW_MS as i64).unwrap()
    }));

    assert_eq!(summary.unassigned.len(), 2);
    assert_eq!(
        summary.unassigned[0].reason,
        UnassignedReason::ZoneWithoutCourier { zone_ids: vec![2] }
    );
    assert_eq!(summary.unassigned[1].reason, UnassignedReason::OutsideAllZones);
    assert_eq!(summary.unassigned[1].coordinates, Coordinates::new(-34.80, -58.70));

    assert_eq!(summary.geocoding_failed, ["G1"]);
    assert_eq!(summary.error_count, 0);
    assert_eq!(store.assignments().await.unwrap().len(), 2);
}

#[tokio::test]
async fn existing_active_assignment_is_left_untouched() {
    let manual = ShipmentAssignment {
        method: AssignmentMethod::Manual,
        ..ShipmentAssignment::automatic("A1", 1, 99, to_datetime(0))
    };
    let store = covered_store(vec![manual.clone()]);
    let orchestrator = orchestrator(
        Arc::clone(&store),
        vec![located("A1", -34.60, -58.46), located("A2", -34.60, -58.46)],
        MockProvider::new(),
    );

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.already_assigned, 1);
    assert_eq!(summary.assigned.len(), 1);
    assert_eq!(
        store.active_assignment("A1").await.unwrap(),
        Some(manual)
    );

    // A second pass changes nothing.
    let again = orchestrator.run().await.unwrap();
    assert_eq!(again.already_assigned, 2);
    assert!(again.assigned.is_empty());
    assert_eq!(store.assignments().await.unwrap().len(), 2);
}

#[tokio::test]
async fn manually_assigned_shipments_are_skipped_before_matching() {
    let manual = |id: &str| ShipmentAssignment {
        method: AssignmentMethod::Manual,
        ..ShipmentAssignment::automatic(id, 2, 99, to_datetime(0))
    };
    let store = covered_store(vec![manual("M1"), manual("M2")]);
    let orchestrator = orchestrator(
        Arc::clone(&store),
        vec![
            located("M1", -34.80, -58.70),
            unlocated("M2", "Pasaje Sin Numero"),
            located("A1", -34.60, -58.46),
        ],
        MockProvider::new(),
    );

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.eligible, 3);
    assert_eq!(summary.already_assigned, 2);
    let assigned: Vec<_> = summary.assigned.iter().map(|a| a.shipment_id.as_str()).collect();
    assert_eq!(assigned, ["A1"]);
    assert!(summary.unassigned.is_empty());
    assert!(summary.geocoding_failed.is_empty());
    assert_eq!(orchestrator.geocoder.provider().calls(), 0);
}

#[tokio::test]
async fn terminal_assignment_allows_a_new_one() {
    let mut finished = ShipmentAssignment::automatic("A1", 1, 10, to_datetime(0));
    finished.status = DeliveryStatus::Cancelled;
    let store = covered_store(vec![finished]);
    let orchestrator = orchestrator(
        Arc::clone(&store),
        vec![located("A1", -34.60, -58.46)],
        MockProvider::new(),
    );

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.assigned.len(), 1);
    assert_eq!(store.assignments().await.unwrap().len(), 2);
}

#[tokio::test]
async fn uncovered_zone_set_is_a_no_op() {
    let shipments = vec![unlocated("A1", "Av. Corrientes 1234")];

    let empty = orchestrator(Arc::new(InMemoryStore::new()), shipments.clone(), MockProvider::new());
    let summary = empty.run().await.unwrap();
    assert_eq!(summary.nothing_to_assign.as_deref(), Some("no active zones"));
    assert_eq!(summary.eligible, 1);
    assert_eq!(empty.geocoder.provider().calls(), 0);

    let unbound = Arc::new(InMemoryStore::from_snapshot(StoreSnapshot {
        zones: vec![zone(1, (-34.60, -58.46), None)],
        couriers: vec![courier(10)],
        assignments: Vec::new(),
    }));
    let summary = orchestrator(unbound, shipments.clone(), MockProvider::new())
        .run()
        .await
        .unwrap();
    assert_eq!(
        summary.nothing_to_assign.as_deref(),
        Some("no zones bound to an active courier")
    );

    let idle = Arc::new(InMemoryStore::from_snapshot(StoreSnapshot {
        zones: vec![zone(1, (-34.60, -58.46), Some(10))],
        couriers: vec![Courier {
            active: false,
            ..courier(10)
        }],
        assignments: Vec::new(),
    }));
    let summary = orchestrator(idle, shipments, MockProvider::new())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.nothing_to_assign.as_deref(), Some("no active couriers"));

    let summary = orchestrator(covered_store(Vec::new()), Vec::new(), MockProvider::new())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.nothing_to_assign.as_deref(), Some("no pending shipments"));
}

/// Delegating store whose assignment writes fail for ids starting with
/// `fail`.
#[derive(Debug)]
struct FlakyStore {
    inner: InMemoryStore,
}

impl ZoneStore for FlakyStore {
    async fn active_zones(&self) -> Result<Vec<DeliveryZone>> {
        self.inner.active_zones().await
    }

    async fn replace_zones(&self, zones: Vec<GeneratedZone>) -> Result<Vec<DeliveryZone>> {
        self.inner.replace_zones(zones).await
    }

    async fn bind_courier(
        &self,
        zone_id: ZoneId,
        courier_id: Option<CourierId>,
    ) -> Result<DeliveryZone> {
        self.inner.bind_courier(zone_id, courier_id).await
    }
}

impl CourierDirectory for FlakyStore {
    async fn couriers(&self) -> Result<Vec<Courier>> {
        self.inner.couriers().await
    }
}

impl AssignmentStore for FlakyStore {
    async fn active_assignment(&self, shipment_id: &str) -> Result<Option<ShipmentAssignment>> {
        self.inner.active_assignment(shipment_id).await
    }

    async fn create_if_absent(&self, assignment: ShipmentAssignment) -> Result<CreateOutcome> {
        if assignment.shipment_id.starts_with("fail") {
            return Err(Error::Persistence {
                context: "disk full".to_string(),
            });
        }
        self.inner.create_if_absent(assignment).await
    }

    async fn update_status(
        &self,
        shipment_id: &str,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<ShipmentAssignment> {
        self.inner.update_status(shipment_id, status, at).await
    }

    async fn reassign(
        &self,
        shipment_id: &str,
        zone_id: ZoneId,
        courier_id: CourierId,
        at: DateTime<Utc>,
    ) -> Result<ShipmentAssignment> {
        self.inner.reassign(shipment_id, zone_id, courier_id, at).await
    }

    async fn assignments(&self) -> Result<Vec<ShipmentAssignment>> {
        self.inner.assignments().await
    }
}

#[tokio::test]
async fn persistence_failures_are_isolated_and_capped() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryStore::from_snapshot(StoreSnapshot {
            zones: vec![zone(1, (-34.60, -58.46), Some(10))],
            couriers: vec![courier(10)],
            assignments: Vec::new(),
        }),
    });

    let mut shipments: Vec<_> = (0..25)
        .map(|i| located(&format!("fail-{i}"), -34.60, -58.46))
        .collect();
    shipments.insert(3, located("ok-1", -34.60, -58.46));
    shipments.push(located("ok-2", -34.60, -58.46));

    let summary = orchestrator(Arc::clone(&store), shipments, MockProvider::new())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.assigned.len(), 2);
    assert_eq!(summary.error_count, 25);
    assert_eq!(summary.errors.len(), MAX_REPORTED_ERRORS);
    assert_eq!(summary.errors[0], "fail-0: Persistence error: disk full");
    assert_eq!(store.assignments().await.unwrap().len(), 2);
}

#[tokio::test]
async fn provider_outage_is_reported_without_further_calls() {
    let store = covered_store(Vec::new());
    let orchestrator = orchestrator(
        Arc::clone(&store),
        vec![
            unlocated("A1", "Av. Rivadavia 6500"),
            unlocated("A2", "Av. Directorio 3000"),
            located("A3", -34.60, -58.46),
        ],
        MockProvider::new()
            .with_error("Av. Rivadavia 6500", ProviderError::Status { status: 503 })
            .with_match("Av. Directorio 3000", -34.60, -58.46),
    );

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(
        summary.geocoding_outage.as_deref(),
        Some("Provider returned HTTP 503")
    );
    assert_eq!(summary.geocoding_failed, ["A1", "A2"]);
    assert_eq!(summary.assigned.len(), 1);
    assert_eq!(orchestrator.geocoder.provider().calls(), 1);
}

#[tokio::test]
async fn shared_addresses_are_geocoded_once() {
    let store = covered_store(Vec::new());
    let orchestrator = orchestrator(
        Arc::clone(&store),
        vec![
            unlocated("A1", "Av. Corrientes 1234, CABA"),
            unlocated("A2", "Av. Corrientes 1234, CABA"),
        ],
        MockProvider::new().with_match("Av. Corrientes 1234, CABA", -34.603, -58.465),
    );

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.assigned.len(), 2);
    orchestrator.run().await.unwrap();
    assert_eq!(orchestrator.geocoder.provider().calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn plan_zones_clusters_pending_shipments() {
    let store = Arc::new(InMemoryStore::new());
    store.set_couriers(vec![courier(10)]);

    let mut shipments = Vec::new();
    for i in 0..6_u32 {
        let d = f64::from(i) * 0.003;
        shipments.push(located(&format!("N{i}"), -34.55 + d, -58.47 + d * 0.5));
        shipments.push(located(&format!("S{i}"), -34.70 - d, -58.45 - d * 0.7));
    }
    shipments.push(unlocated("G1", "Calle Inexistente 1"));

    let orchestrator = orchestrator(Arc::clone(&store), shipments, MockProvider::new());
    let report = orchestrator.plan_zones(2).await.unwrap();

    assert_eq!(report.zones.len(), 2);
    assert_eq!(report.clustered, 12);
    assert_eq!(report.geocoding_failed, ["G1"]);
    assert_eq!(report.zones.iter().map(|z| z.member_count).sum::<usize>(), 12);

    // Fresh zones have no courier yet.
    let summary = orchestrator.run().await.unwrap();
    assert_eq!(
        summary.nothing_to_assign.as_deref(),
        Some("no zones bound to an active courier")
    );

    orchestrator
        .planner()
        .bind_courier(report.zones[0].id, Some(10))
        .await
        .unwrap();
    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.assigned.len(), report.zones[0].member_count);

    orchestrator.planner().shutdown().await.unwrap();
}

#[tokio::test]
async fn plan_zones_without_points_is_insufficient_coverage() {
    let orchestrator = orchestrator(
        Arc::new(InMemoryStore::new()),
        vec![unlocated("G1", "Calle Inexistente 1")],
        MockProvider::new(),
    );

    assert!(matches!(
        orchestrator.plan_zones(3).await,
        Err(Error::InsufficientCoverage { .. })
    ));
}
