//! Geocoding cache implementations.
//!
//! Upserts are idempotent and atomic per address: a reader sees either the
//! previous entry or the new one, never a partial write. Nothing is batched,
//! so cancelling a batch geocode leaves every completed address cached.

use core::future::Future;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use turbo_routing_core::{Error, GeocodingCacheEntry, Result};

/// Persistent fingerprint -> coordinates mapping.
pub trait GeocodingCache: Send + Sync {
    fn get(
        &self,
        fingerprint: &str,
    ) -> impl Future<Output = Result<Option<GeocodingCacheEntry>>> + Send;

    /// Inserts or replaces the entry keyed by `entry.fingerprint`.
    fn upsert(&self, entry: GeocodingCacheEntry) -> impl Future<Output = Result<()>> + Send;
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct InMemoryGeocodingCache {
    entries: RwLock<HashMap<String, GeocodingCacheEntry>>,
}

impl InMemoryGeocodingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl GeocodingCache for InMemoryGeocodingCache {
    async fn get(&self, fingerprint: &str) -> Result<Option<GeocodingCacheEntry>> {
        Ok(self.entries.read().get(fingerprint).cloned())
    }

    async fn upsert(&self, entry: GeocodingCacheEntry) -> Result<()> {
        self.entries.write().insert(entry.fingerprint.clone(), entry);
        Ok(())
    }
}

/// Cache persisted as a JSON array of entries.
///
/// Every upsert rewrites the file through a temporary sibling and a rename,
/// and only updates the in-memory view once the rename succeeded.
#[derive(Debug)]
pub struct JsonFileGeocodingCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, GeocodingCacheEntry>>,
}

impl JsonFileGeocodingCache {
    /// Opens the cache at `path`; a missing file starts an empty cache.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<GeocodingCacheEntry>>(&bytes)
                .map_err(|e| Error::Persistence {
                    context: format!("corrupt geocoding cache {}: {e}", path.display()),
                })?
                .into_iter()
                .map(|entry| (entry.fingerprint.clone(), entry))
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened geocoding cache");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn persist(&self, entries: &HashMap<String, GeocodingCacheEntry>) -> Result<()> {
        let mut rows: Vec<&GeocodingCacheEntry> = entries.values().collect();
        rows.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

        let bytes = serde_json::to_vec_pretty(&rows).map_err(|e| Error::Persistence {
            context: format!("failed to encode geocoding cache: {e}"),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl GeocodingCache for JsonFileGeocodingCache {
    async fn get(&self, fingerprint: &str) -> Result<Option<GeocodingCacheEntry>> {
        Ok(self.entries.lock().await.get(fingerprint).cloned())
    }

    async fn upsert(&self, entry: GeocodingCacheEntry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.get(&entry.fingerprint) == Some(&entry) {
            return Ok(());
        }

        let mut next = entries.clone();
        next.insert(entry.fingerprint.clone(), entry);
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }
}
