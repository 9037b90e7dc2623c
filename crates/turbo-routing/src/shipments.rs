//! Shipment sources and the TTL snapshot cache placed in front of them.

use crate::time::{SystemClock, TimeSource};
use core::future::Future;
use core::time::Duration;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use turbo_routing_core::{DeliveryStatus, Result, ShipmentRecord};

/// Read access to the shipments awaiting routing.
pub trait ShipmentSource: Send + Sync {
    fn shipments(&self) -> impl Future<Output = Result<Vec<ShipmentRecord>>> + Send;

    /// Shipments still in `pending`.
    fn pending_shipments(&self) -> impl Future<Output = Result<Vec<ShipmentRecord>>> + Send {
        async move {
            Ok(self
                .shipments()
                .await?
                .into_iter()
                .filter(|s| s.status == DeliveryStatus::Pending)
                .collect())
        }
    }
}

/// Shipments held in memory and replaced wholesale.
#[derive(Debug, Default)]
pub struct StaticShipmentSource {
    shipments: RwLock<Vec<ShipmentRecord>>,
}

impl StaticShipmentSource {
    pub fn new(shipments: Vec<ShipmentRecord>) -> Self {
        Self {
            shipments: RwLock::new(shipments),
        }
    }

    pub fn replace(&self, shipments: Vec<ShipmentRecord>) {
        *self.shipments.write() = shipments;
    }
}

impl ShipmentSource for StaticShipmentSource {
    async fn shipments(&self) -> Result<Vec<ShipmentRecord>> {
        Ok(self.shipments.read().clone())
    }
}

#[derive(Debug)]
struct Snapshot {
    fetched_at: u64,
    shipments: Arc<Vec<ShipmentRecord>>,
}

/// Wraps a [`ShipmentSource`] and serves a snapshot until it is older than
/// the TTL.
///
/// Concurrent callers hitting a stale snapshot share one refresh. A failed
/// refresh keeps no snapshot, so the next call retries.
#[derive(Debug)]
pub struct ShipmentCache<S, T = SystemClock>
where
    S: ShipmentSource,
    T: TimeSource<u64>,
{
    source: S,
    ttl: Duration,
    clock: T,
    snapshot: Mutex<Option<Snapshot>>,
}

impl<S: ShipmentSource> ShipmentCache<S, SystemClock> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self::with_clock(source, ttl, SystemClock)
    }
}

impl<S, T> ShipmentCache<S, T>
where
    S: ShipmentSource,
    T: TimeSource<u64> + Send + Sync,
{
    pub fn with_clock(source: S, ttl: Duration, clock: T) -> Self {
        Self {
            source,
            ttl,
            clock,
            snapshot: Mutex::new(None),
        }
    }

    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Returns the cached snapshot, refreshing it first when stale.
    pub async fn get(&self) -> Result<Arc<Vec<ShipmentRecord>>> {
        let mut snapshot = self.snapshot.lock().await;
        let now = self.clock.current_millis();

        if let Some(cached) = snapshot.as_ref() {
            let age = now.saturating_sub(cached.fetched_at);
            if u128::from(age) < self.ttl.as_millis() {
                #[cfg(feature = "tracing")]
                tracing::trace!(age_ms = age, "Shipment cache hit");
                return Ok(Arc::clone(&cached.shipments));
            }
        }

        *snapshot = None;
        let shipments = Arc::new(self.source.shipments().await?);
        #[cfg(feature = "tracing")]
        tracing::debug!(count = shipments.len(), "Refreshed shipment cache");
        *snapshot = Some(Snapshot {
            fetched_at: now,
            shipments: Arc::clone(&shipments),
        });

        Ok(shipments)
    }

    /// Drops the snapshot; the next `get` reads through.
    pub async fn clear(&self) {
        self.snapshot.lock().await.take();
    }
}

impl<S, T> ShipmentSource for ShipmentCache<S, T>
where
    S: ShipmentSource,
    T: TimeSource<u64> + Send + Sync,
{
    async fn shipments(&self) -> Result<Vec<ShipmentRecord>> {
        Ok(self.get().await?.as_ref().clone())
    }
}
