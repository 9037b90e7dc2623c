//! External geocoding providers.
//!
//! A provider answers a single best-match forward lookup restricted to one
//! country. "No match" is `Ok(None)`; `Err` is reserved for failures of the
//! provider itself, which callers classify with [`ProviderError::is_outage`].

use core::future::Future;
use core::time::Duration;
use serde::Deserialize;
use turbo_routing_core::Coordinates;

/// Failure of a provider request.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum ProviderError {
    /// The request exceeded the configured timeout.
    #[error("Provider request timed out")]
    Timeout,

    /// Connection, TLS or DNS failure.
    #[error("Provider transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("Provider returned HTTP {status}")]
    Status { status: u16 },

    /// The response body did not have the expected shape.
    #[error("Malformed provider response: {0}")]
    Decode(String),

    /// The request could not be built (bad base URL, empty query).
    #[error("Invalid provider request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Whether the failure affects the provider as a whole rather than this
    /// one address. Batch geocoding stops calling the provider after an
    /// outage instead of paying the same latency for every address.
    pub const fn is_outage(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { status } => matches!(*status, 401 | 403 | 429) || *status >= 500,
            Self::Decode(_) | Self::InvalidRequest(_) => false,
        }
    }
}

/// A single forward-geocoding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodeQuery {
    /// Free-text address, usually `"{address}, {city}"`.
    pub text: String,
    /// ISO 3166-1 alpha-2 country filter.
    pub country: String,
    /// Preferred result language (e.g. `"es"`).
    pub language: String,
}

/// A best-match forward geocoder.
pub trait GeocodingProvider: Send + Sync {
    /// Name recorded on cache entries.
    fn name(&self) -> &str;

    fn lookup(
        &self,
        query: &GeocodeQuery,
    ) -> impl Future<Output = Result<Option<Coordinates>, ProviderError>> + Send;
}

/// Settings for [`MapboxProvider`].
#[derive(Debug, Clone)]
pub struct MapboxConfig {
    pub access_token: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl MapboxConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.mapbox.com/geocoding/v5/mapbox.places";

    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MapboxResponse {
    #[serde(default)]
    features: Vec<MapboxFeature>,
}

#[derive(Debug, Deserialize)]
struct MapboxFeature {
    /// `[longitude, latitude]`
    center: [f64; 2],
}

/// Mapbox forward geocoding (`mapbox.places`) client.
#[derive(Debug, Clone)]
pub struct MapboxProvider {
    config: MapboxConfig,
    client: reqwest::Client,
}

impl MapboxProvider {
    /// Builds the HTTP client with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] when the TLS backend cannot be
    /// initialized.
    pub fn new(config: MapboxConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub const fn config(&self) -> &MapboxConfig {
        &self.config
    }

    fn url(&self, query: &GeocodeQuery) -> Result<reqwest::Url, ProviderError> {
        if query.text.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("empty address".to_string()));
        }

        let mut url = reqwest::Url::parse(&self.config.base_url)
            .map_err(|e| ProviderError::InvalidRequest(format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ProviderError::InvalidRequest("base url cannot carry a path".to_string()))?
            .push(&format!("{}.json", query.text.trim()));

        Ok(url)
    }
}

impl GeocodingProvider for MapboxProvider {
    fn name(&self) -> &str {
        "mapbox"
    }

    async fn lookup(&self, query: &GeocodeQuery) -> Result<Option<Coordinates>, ProviderError> {
        let url = self.url(query)?;

        let response = self
            .client
            .get(url)
            .query(&[
                ("access_token", self.config.access_token.as_str()),
                ("country", query.country.as_str()),
                ("language", query.language.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
            });
        }

        let body: MapboxResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Decode(e.to_string())
            }
        })?;

        Ok(body
            .features
            .first()
            .map(|feature| Coordinates::from_lon_lat(feature.center))
            .filter(Coordinates::is_valid))
    }
}
