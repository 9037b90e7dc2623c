//! Address geocoding with a fingerprint-keyed cache.
//!
//! ## Structure
//!
//! - [`fingerprint`] - address normalization and cache keys.
//! - [`cache`] - the [`GeocodingCache`] trait with in-memory and JSON-file
//!   implementations.
//! - [`provider`] - the [`GeocodingProvider`] trait and the Mapbox client.
//! - [`service`] - [`GeocodingService`], cache-first resolution with a
//!   serialized, rate-limited provider path.

pub mod cache;
pub mod fingerprint;
pub mod provider;
pub mod service;

pub use cache::{GeocodingCache, InMemoryGeocodingCache, JsonFileGeocodingCache};
pub use fingerprint::{fingerprint, normalize_address};
pub use provider::{GeocodeQuery, GeocodingProvider, MapboxConfig, MapboxProvider, ProviderError};
pub use service::{BatchGeocodeReport, GeocodingConfig, GeocodingService};
