//! Zone-set regeneration and courier binding.
//!
//! [`ZonePlanner`] is the single writer of the active zone set:
//!
//! - Regeneration requests never interleave. A request arriving while one is
//!   running is rejected with [`Error::ConcurrentRegenerationConflict`].
//! - Commits and courier bindings take the zone-set write lock; assignment
//!   passes hold the read lock for their whole duration, so a pass observes
//!   either the previous zone set or the new one.

use super::pool::{WorkerPool, worker_loop};
use super::{ZoneGenerationEngine, ZonePoint};
use crate::store::ZoneStore;
use core::time::Duration;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, mpsc};
use tokio_util::sync::CancellationToken;
use turbo_routing_core::{CourierId, DeliveryZone, Error, Result, ZoneId};

/// Worker pool sizing for [`ZonePlanner`].
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub num_workers: usize,
    /// Per-worker wait for shutdown acknowledgement.
    pub shutdown_timeout: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            num_workers: 2,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug)]
pub struct ZonePlanner<R: ZoneStore> {
    store: Arc<R>,
    pool: WorkerPool,
    writer: Mutex<()>,
    zone_set: RwLock<()>,
}

impl<R: ZoneStore> ZonePlanner<R> {
    /// Creates the planner and spawns its workers. Must be called inside a
    /// Tokio runtime.
    pub fn new(config: PlannerConfig, store: Arc<R>, engine: ZoneGenerationEngine) -> Self {
        let num_workers = config.num_workers.max(1);
        let engine = Arc::new(engine);
        let shutdown_token = CancellationToken::new();
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            // A regeneration is single-writer, so a worker never holds more
            // than one queued request.
            let (tx, rx) = mpsc::channel(1);
            workers.push(tx);

            tokio::spawn(worker_loop(
                worker_id,
                rx,
                Arc::clone(&engine),
                shutdown_token.clone(),
            ));
        }

        Self {
            store,
            pool: WorkerPool::new(workers, shutdown_token, config.shutdown_timeout),
            writer: Mutex::new(()),
            zone_set: RwLock::new(()),
        }
    }

    pub const fn store(&self) -> &Arc<R> {
        &self.store
    }

    /// Clusters `points` into at most `k` zones on a worker and atomically
    /// replaces the active zone set with the result.
    ///
    /// Existing assignments are not touched; zone ids are never reused.
    ///
    /// # Errors
    ///
    /// - [`Error::ConcurrentRegenerationConflict`] if another regeneration is
    ///   in progress.
    /// - [`Error::InvalidRequest`] for `k == 0` or no points.
    /// - [`Error::Geometry`] if no zone could be built from the points.
    pub async fn regenerate(&self, points: Vec<ZonePoint>, k: usize) -> Result<Vec<DeliveryZone>> {
        let _writer = self
            .writer
            .try_lock()
            .map_err(|_| Error::ConcurrentRegenerationConflict)?;

        if k == 0 {
            return Err(Error::InvalidRequest {
                reason: "Zone count must be greater than 0".to_string(),
            });
        }
        if points.is_empty() {
            return Err(Error::InvalidRequest {
                reason: "No geocoded shipments to cluster".to_string(),
            });
        }

        let point_count = points.len();
        let generated = self.pool.generate(points, k).await?;
        if generated.is_empty() {
            return Err(Error::Geometry {
                reason: format!("No zone could be built from {point_count} points"),
            });
        }

        let _commit = self.zone_set.write().await;
        let zones = self.store.replace_zones(generated).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            points = point_count,
            requested = k,
            zones = zones.len(),
            version = zones.first().map_or(0, |z| z.version),
            "Committed new zone set"
        );

        Ok(zones)
    }

    /// Binds `courier_id` to `zone_id`, or unbinds the zone with `None`.
    pub async fn bind_courier(
        &self,
        zone_id: ZoneId,
        courier_id: Option<CourierId>,
    ) -> Result<DeliveryZone> {
        let _commit = self.zone_set.write().await;
        let zone = self.store.bind_courier(zone_id, courier_id).await?;
        #[cfg(feature = "tracing")]
        tracing::info!(zone_id, ?courier_id, "Updated zone courier");
        Ok(zone)
    }

    /// Holds off commits until the guard is dropped.
    pub async fn read_zone_set(&self) -> RwLockReadGuard<'_, ()> {
        self.zone_set.read().await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.pool.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::zones::GeneratedZone;
    use tokio::sync::Notify;
    use turbo_routing_core::Courier;

    fn points() -> Vec<ZonePoint> {
        let mut points = Vec::new();
        for i in 0..6_u32 {
            let d = f64::from(i) * 0.002;
            points.push(ZonePoint::new(-34.55 + d, -58.46 + d, format!("N{i}")));
            points.push(ZonePoint::new(-34.70 - d, -58.46 - d, format!("S{i}")));
        }
        points
    }

    fn planner(store: Arc<InMemoryStore>) -> ZonePlanner<InMemoryStore> {
        ZonePlanner::new(PlannerConfig::default(), store, ZoneGenerationEngine::default())
    }

    /// Zone store whose commit waits until released.
    #[derive(Debug, Default)]
    struct GatedStore {
        inner: InMemoryStore,
        entered: Notify,
        release: Notify,
    }

    impl ZoneStore for GatedStore {
        async fn active_zones(&self) -> Result<Vec<DeliveryZone>> {
            self.inner.active_zones().await
        }

        async fn replace_zones(&self, zones: Vec<GeneratedZone>) -> Result<Vec<DeliveryZone>> {
            self.entered.notify_one();
            self.release.notified().await;
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

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn regenerate_commits_a_new_versioned_zone_set() {
        let store = Arc::new(InMemoryStore::new());
        let planner = planner(Arc::clone(&store));

        let first = planner.regenerate(points(), 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.iter().map(|z| z.member_count).sum::<usize>(), 12);
        assert!(first.iter().all(|z| z.version == 1 && z.courier_id.is_none()));

        let second = planner.regenerate(points(), 3).await.unwrap();
        assert_eq!(second.len(), 3);
        assert!(second.iter().all(|z| z.version == 2));
        assert!(second.iter().all(|z| first.iter().all(|old| old.id != z.id)));
        assert_eq!(store.active_zones().await.unwrap(), second);

        planner.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rejects_invalid_requests() {
        let planner = planner(Arc::new(InMemoryStore::new()));

        assert!(matches!(
            planner.regenerate(points(), 0).await,
            Err(Error::InvalidRequest { .. })
        ));
        assert!(matches!(
            planner.regenerate(Vec::new(), 3).await,
            Err(Error::InvalidRequest { .. })
        ));
        assert!(matches!(
            planner
                .regenerate(vec![ZonePoint::new(f64::NAN, -58.4, "bad")], 1)
                .await,
            Err(Error::Geometry { .. })
        ));

        planner.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn overlapping_regeneration_is_rejected() {
        let store = Arc::new(GatedStore::default());
        let planner = Arc::new(ZonePlanner::new(
            PlannerConfig::default(),
            Arc::clone(&store),
            ZoneGenerationEngine::default(),
        ));

        let running = {
            let planner = Arc::clone(&planner);
            tokio::spawn(async move { planner.regenerate(points(), 2).await })
        };
        store.entered.notified().await;

        assert_eq!(
            planner.regenerate(points(), 2).await,
            Err(Error::ConcurrentRegenerationConflict)
        );

        store.release.notify_one();
        assert_eq!(running.await.unwrap().unwrap().len(), 2);

        // The writer slot is free again.
        let next = {
            let planner = Arc::clone(&planner);
            tokio::spawn(async move { planner.regenerate(points(), 2).await })
        };
        store.entered.notified().await;
        store.release.notify_one();
        assert!(next.await.unwrap().is_ok());

        planner.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn commit_waits_for_readers() {
        let store = Arc::new(InMemoryStore::new());
        let planner = Arc::new(planner(Arc::clone(&store)));
        planner.regenerate(points(), 2).await.unwrap();

        let guard = planner.read_zone_set().await;
        let pending = {
            let planner = Arc::clone(&planner);
            tokio::spawn(async move { planner.regenerate(points(), 3).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.zone_version(), 1);

        drop(guard);
        pending.await.unwrap().unwrap();
        assert_eq!(store.zone_version(), 2);

        planner.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn binds_and_moves_couriers() {
        let store = Arc::new(InMemoryStore::new());
        store.set_couriers(vec![Courier {
            id: 7,
            name: "Juan".to_string(),
            active: true,
            preferred_zone: None,
        }]);
        let planner = planner(Arc::clone(&store));
        let zones = planner.regenerate(points(), 2).await.unwrap();

        planner.bind_courier(zones[0].id, Some(7)).await.unwrap();
        let moved = planner.bind_courier(zones[1].id, Some(7)).await.unwrap();
        assert_eq!(moved.courier_id, Some(7));

        let active = store.active_zones().await.unwrap();
        assert_eq!(active.iter().filter(|z| z.courier_id == Some(7)).count(), 1);

        assert_eq!(
            planner.bind_courier(999, Some(7)).await,
            Err(Error::ZoneNotFound { zone_id: 999 })
        );

        planner.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn requests_after_shutdown_fail() {
        let planner = planner(Arc::new(InMemoryStore::new()));
        planner.shutdown().await.unwrap();

        assert_eq!(
            planner.regenerate(points(), 2).await,
            Err(Error::ServiceShutdown)
        );
    }
}
