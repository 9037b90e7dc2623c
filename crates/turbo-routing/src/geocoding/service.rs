use super::{
    GeocodeQuery, GeocodingCache, GeocodingProvider, ProviderError, fingerprint, normalize_address,
};
use crate::time::{SystemClock, TimeSource, to_datetime};
use core::time::Duration;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use turbo_routing_core::{Coordinates, GeocodingCacheEntry};

/// Settings for [`GeocodingService`].
#[derive(Debug, Clone)]
pub struct GeocodingConfig {
    /// Result language passed to the provider.
    pub language: String,
    /// Minimum spacing between two external calls.
    pub min_delay: Duration,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            language: "es".to_string(),
            min_delay: Duration::from_millis(100),
        }
    }
}

/// Outcome of [`GeocodingService::geocode_batch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGeocodeReport {
    /// Keyed by the input address. Addresses not reached before a
    /// cancellation are absent.
    pub results: HashMap<String, Option<Coordinates>>,
    pub provider_calls: usize,
    pub cache_hits: usize,
    /// Set when a provider outage stopped further external calls.
    pub outage: Option<String>,
    pub cancelled: bool,
}

impl BatchGeocodeReport {
    pub fn resolved(&self, address: &str) -> Option<Coordinates> {
        self.results.get(address).copied().flatten()
    }

    pub fn failures(&self) -> usize {
        self.results.values().filter(|r| r.is_none()).count()
    }
}

/// Cache-first geocoder.
///
/// Cache hits never touch the network. Misses go to the provider one at a
/// time: the throttle mutex is held for the whole external call, and a call
/// starts no earlier than `min_delay` after the previous one finished.
/// Provider failures are logged and surface as `None`.
#[derive(Debug)]
pub struct GeocodingService<C, P, T = SystemClock>
where
    C: GeocodingCache,
    P: GeocodingProvider,
    T: TimeSource<u64>,
{
    config: GeocodingConfig,
    cache: C,
    provider: P,
    clock: T,
    last_call: Mutex<Option<Instant>>,
}

impl<C, P> GeocodingService<C, P, SystemClock>
where
    C: GeocodingCache,
    P: GeocodingProvider,
{
    pub fn new(config: GeocodingConfig, cache: C, provider: P) -> Self {
        Self::with_clock(config, cache, provider, SystemClock)
    }
}

impl<C, P, T> GeocodingService<C, P, T>
where
    C: GeocodingCache,
    P: GeocodingProvider,
    T: TimeSource<u64> + Send + Sync,
{
    pub fn with_clock(config: GeocodingConfig, cache: C, provider: P, clock: T) -> Self {
        Self {
            config,
            cache,
            provider,
            clock,
            last_call: Mutex::new(None),
        }
    }

    pub const fn cache(&self) -> &C {
        &self.cache
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Resolves an address, consulting the cache first.
    pub async fn geocode(&self, address: &str, city: &str, country: &str) -> Option<Coordinates> {
        if address.trim().is_empty() {
            return None;
        }

        let normalized = normalize_address(address, city, country);
        let key = fingerprint(&normalized);
        if let Some(coords) = self.cached(&key).await {
            return Some(coords);
        }

        self.fetch(address, city, country, normalized, key)
            .await
            .unwrap_or_else(|_e| {
                #[cfg(feature = "tracing")]
                tracing::warn!(address, error = %_e, "Geocoding failed");
                None
            })
    }

    /// Resolves an address through the provider even when cached, replacing
    /// the cache entry on success.
    pub async fn regeocode(&self, address: &str, city: &str, country: &str) -> Option<Coordinates> {
        if address.trim().is_empty() {
            return None;
        }

        let normalized = normalize_address(address, city, country);
        let key = fingerprint(&normalized);
        self.fetch(address, city, country, normalized, key)
            .await
            .unwrap_or_else(|_e| {
                #[cfg(feature = "tracing")]
                tracing::warn!(address, error = %_e, "Re-geocoding failed");
                None
            })
    }

    /// Resolves a sequence of addresses.
    ///
    /// Cached addresses resolve without delay. After the first provider
    /// outage the remaining uncached addresses resolve to `None` without
    /// further external calls. Cancellation stops the batch between
    /// addresses or aborts the in-flight call; completed addresses stay
    /// cached.
    pub async fn geocode_batch(
        &self,
        addresses: &[String],
        city: &str,
        country: &str,
        cancel: &CancellationToken,
    ) -> BatchGeocodeReport {
        let mut report = BatchGeocodeReport::default();

        for address in addresses {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if report.results.contains_key(address) {
                continue;
            }
            if address.trim().is_empty() {
                report.results.insert(address.clone(), None);
                continue;
            }

            let normalized = normalize_address(address, city, country);
            let key = fingerprint(&normalized);
            if let Some(coords) = self.cached(&key).await {
                report.cache_hits += 1;
                report.results.insert(address.clone(), Some(coords));
                continue;
            }

            if report.outage.is_some() {
                report.results.insert(address.clone(), None);
                continue;
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                outcome = self.fetch(address, city, country, normalized, key) => outcome,
            };
            report.provider_calls += 1;

            match outcome {
                Ok(coords) => {
                    report.results.insert(address.clone(), coords);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(address = %address, error = %e, "Geocoding failed");
                    if e.is_outage() {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            provider = self.provider.name(),
                            "Provider outage, skipping remaining external lookups"
                        );
                        report.outage = Some(e.to_string());
                    }
                    report.results.insert(address.clone(), None);
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            addresses = addresses.len(),
            provider_calls = report.provider_calls,
            cache_hits = report.cache_hits,
            cancelled = report.cancelled,
            "Batch geocoding finished"
        );

        report
    }

    async fn cached(&self, key: &str) -> Option<Coordinates> {
        match self.cache.get(key).await {
            Ok(entry) => entry.map(|e| e.coordinates()).filter(Coordinates::is_valid),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "Geocoding cache read failed");
                None
            }
        }
    }

    async fn fetch(
        &self,
        address: &str,
        city: &str,
        country: &str,
        normalized: String,
        key: String,
    ) -> Result<Option<Coordinates>, ProviderError> {
        let query = GeocodeQuery {
            text: query_text(address, city),
            country: country.trim().to_lowercase(),
            language: self.config.language.clone(),
        };

        let outcome = {
            let mut last_call = self.last_call.lock().await;
            if let Some(previous) = *last_call {
                tokio::time::sleep_until(previous + self.config.min_delay).await;
            }
            let outcome = self.provider.lookup(&query).await;
            *last_call = Some(Instant::now());
            outcome
        }?;

        let Some(coords) = outcome else {
            #[cfg(feature = "tracing")]
            tracing::debug!(address, "No geocoding match");
            return Ok(None);
        };

        let entry = GeocodingCacheEntry {
            fingerprint: key,
            normalized_address: normalized,
            lat: coords.lat,
            lon: coords.lon,
            provider: self.provider.name().to_string(),
            created_at: to_datetime(self.clock.current_millis()),
        };
        if let Err(_e) = self.cache.upsert(entry).await {
            #[cfg(feature = "tracing")]
            tracing::warn!(address, error = %_e, "Failed to cache geocoding result");
        }

        Ok(Some(coords))
    }
}

fn query_text(address: &str, city: &str) -> String {
    let address = address.trim();
    let city = city.trim();
    if city.is_empty() {
        address.to_string()
    } else {
        format!("{address}, {city}")
    }
}
