//! Wiring of the routing components behind the server commands.

use crate::server::config::ServerConfig;
use crate::server::storage::{DataDir, FileShipmentSource};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use turbo_routing::geocoding::{
    GeocodingConfig, GeocodingService, JsonFileGeocodingCache, MapboxProvider,
};
use turbo_routing::{
    AssignmentRunSummary, AutoAssignmentOrchestrator, Coordinates, CourierId, DeliveryZone,
    InMemoryStore, OrchestratorConfig, PlannerConfig, ShipmentCache, ZoneAssignmentEngine,
    ZoneGenerationConfig, ZoneGenerationEngine, ZoneId, ZonePlanReport, ZonePlanner,
};

pub type Geocoder = GeocodingService<JsonFileGeocodingCache, MapboxProvider>;

pub type Orchestrator = AutoAssignmentOrchestrator<
    ShipmentCache<FileShipmentSource>,
    JsonFileGeocodingCache,
    MapboxProvider,
    InMemoryStore,
>;

/// The dispatch service: one store, one geocoder and one orchestrator over a
/// data directory.
pub struct DispatchService {
    config: ServerConfig,
    data: DataDir,
    store: Arc<InMemoryStore>,
    geocoder: Arc<Geocoder>,
    orchestrator: Orchestrator,
}

impl DispatchService {
    /// Loads the data directory and spawns the zone workers.
    pub async fn open(config: ServerConfig) -> anyhow::Result<Self> {
        let data = DataDir::new(&config.data_dir);
        data.ensure().await?;

        if config.mapbox.access_token.is_empty() {
            tracing::warn!("MAPBOX_TOKEN is not set, addresses without coordinates cannot be geocoded");
        }

        let store = Arc::new(data.load_store().await?);
        let cache = JsonFileGeocodingCache::open(data.geocoding_cache()).await?;
        let geocoder = Arc::new(GeocodingService::new(
            GeocodingConfig {
                language: config.language.clone(),
                min_delay: config.geocode_delay,
            },
            cache,
            MapboxProvider::new(config.mapbox.clone())?,
        ));

        let shipments = Arc::new(ShipmentCache::new(
            FileShipmentSource::new(data.shipments()),
            config.shipment_ttl,
        ));

        let engine = ZoneGenerationEngine::new(ZoneGenerationConfig {
            depot: config.depot,
            restarts: config.cluster_restarts,
            ..ZoneGenerationConfig::default()
        });
        let planner = Arc::new(ZonePlanner::new(
            PlannerConfig {
                num_workers: config.num_workers,
                shutdown_timeout: config.shutdown_timeout,
            },
            Arc::clone(&store),
            engine,
        ));

        let orchestrator = AutoAssignmentOrchestrator::new(
            OrchestratorConfig {
                city: config.city.clone(),
                country: config.country.clone(),
            },
            shipments,
            Arc::clone(&geocoder),
            planner,
            ZoneAssignmentEngine::new(config.zone_buffer_m),
        );

        Ok(Self {
            config,
            data,
            store,
            geocoder,
            orchestrator,
        })
    }

    /// Token cancelling in-flight geocoding.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.orchestrator.cancellation_token()
    }

    /// Runs one assignment pass and persists the new assignments.
    pub async fn assign_once(&self) -> anyhow::Result<AssignmentRunSummary> {
        self.reload().await?;
        let summary = self.orchestrator.run().await?;
        if !summary.assigned.is_empty() {
            self.data.save_assignments(&self.store).await?;
        }
        Ok(summary)
    }

    /// Regenerates the zone set from pending shipments and persists it.
    pub async fn plan(&self, zones: usize) -> anyhow::Result<ZonePlanReport> {
        self.reload().await?;
        let report = self.orchestrator.plan_zones(zones).await?;
        self.data.save_zones(&self.store).await?;
        Ok(report)
    }

    pub async fn bind(
        &self,
        zone_id: ZoneId,
        courier_id: Option<CourierId>,
    ) -> anyhow::Result<DeliveryZone> {
        self.reload().await?;
        let zone = self
            .orchestrator
            .planner()
            .bind_courier(zone_id, courier_id)
            .await?;
        self.data.save_zones(&self.store).await?;
        Ok(zone)
    }

    // Other processes may have rewritten the data dir since the last command.
    async fn reload(&self) -> anyhow::Result<()> {
        self.store.restore(self.data.load_snapshot().await?);
        Ok(())
    }

    pub async fn geocode(&self, address: &str, force: bool) -> Option<Coordinates> {
        if force {
            self.geocoder
                .regeocode(address, &self.config.city, &self.config.country)
                .await
        } else {
            self.geocoder
                .geocode(address, &self.config.city, &self.config.country)
                .await
        }
    }

    /// Runs assignment passes every `ASSIGN_INTERVAL_SECS` until `shutdown`
    /// is cancelled. A failed pass is logged and retried on the next tick.
    pub async fn serve(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.assign_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            data_dir = %self.data.root().display(),
            interval_secs = self.config.assign_interval.as_secs(),
            workers = self.config.num_workers,
            "Starting assignment loop"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.assign_once().await {
                        tracing::error!("Assignment pass failed: {e:#}");
                    }
                }
            }
        }
    }

    /// Stops the zone workers.
    pub async fn shutdown(&self) {
        if let Err(e) = self.orchestrator.planner().shutdown().await {
            tracing::error!("Error during service shutdown: {e:?}");
        }
    }
}
