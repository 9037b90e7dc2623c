//! The data directory.
//!
//! `shipments.json` and `couriers.json` are written by upstream systems and
//! only read here. `zones.json` and `assignments.json` are owned by this
//! service and rewritten through a temporary file and a rename, so readers
//! never see a partial file. `geocoding_cache.json` is managed by
//! [`JsonFileGeocodingCache`](turbo_routing::geocoding::JsonFileGeocodingCache).

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use turbo_routing::{
    Courier, DeliveryZone, Error, InMemoryStore, Result, ShipmentAssignment, ShipmentRecord,
    ShipmentSource, StoreSnapshot,
};

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shipments(&self) -> PathBuf {
        self.root.join("shipments.json")
    }

    pub fn couriers(&self) -> PathBuf {
        self.root.join("couriers.json")
    }

    pub fn zones(&self) -> PathBuf {
        self.root.join("zones.json")
    }

    pub fn assignments(&self) -> PathBuf {
        self.root.join("assignments.json")
    }

    pub fn geocoding_cache(&self) -> PathBuf {
        self.root.join("geocoding_cache.json")
    }

    pub async fn ensure(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Reads the zone, courier and assignment files. Missing files count as
    /// empty.
    pub async fn load_snapshot(&self) -> Result<StoreSnapshot> {
        let zones: Vec<DeliveryZone> = read_json(&self.zones()).await?.unwrap_or_default();
        let couriers: Vec<Courier> = read_json(&self.couriers()).await?.unwrap_or_default();
        let assignments: Vec<ShipmentAssignment> =
            read_json(&self.assignments()).await?.unwrap_or_default();

        tracing::debug!(
            zones = zones.len(),
            couriers = couriers.len(),
            assignments = assignments.len(),
            "Loaded data from {}",
            self.root.display()
        );

        Ok(StoreSnapshot {
            zones,
            couriers,
            assignments,
        })
    }

    pub async fn load_store(&self) -> Result<InMemoryStore> {
        Ok(InMemoryStore::from_snapshot(self.load_snapshot().await?))
    }

    /// Writes `zones.json` from `store`. Only zone planning and courier
    /// binding call this.
    pub async fn save_zones(&self, store: &InMemoryStore) -> Result<()> {
        write_json(&self.zones(), &store.snapshot().zones).await
    }

    /// Writes `assignments.json` from `store`. Only assignment passes call
    /// this.
    pub async fn save_assignments(&self, store: &InMemoryStore) -> Result<()> {
        write_json(&self.assignments(), &store.snapshot().assignments).await
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| Error::Persistence {
            context: format!("invalid JSON in {}: {e}", path.display()),
        })
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| Error::Persistence {
        context: format!("failed to encode {}: {e}", path.display()),
    })?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Shipment source reading `shipments.json` on every call.
#[derive(Debug, Clone)]
pub struct FileShipmentSource {
    path: PathBuf,
}

impl FileShipmentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ShipmentSource for FileShipmentSource {
    async fn shipments(&self) -> Result<Vec<ShipmentRecord>> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }
}
