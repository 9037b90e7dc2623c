//! Error types for zone generation, geocoding and shipment assignment.
//!
//! This module defines the central `Error` enum, which captures every
//! recoverable and reportable error case of the routing core. Per-shipment
//! failures are recorded in pass summaries rather than propagated; only
//! whole-pass preconditions and infrastructure failures surface as `Err`.
//!
//! ## Error Cases
//! - `GeocodingFailure`: the provider timed out, failed or found no match.
//! - `InsufficientCoverage`: no active zones, couriers or courier-bound zones.
//! - `UnmatchedPoint`: a coordinate lies outside every buffered zone.
//! - `ConcurrentRegenerationConflict`: a zone regeneration is already running.
//! - `InvalidTransition`: an assignment status change the lifecycle forbids.
//! - `AlreadyAssigned`: a non-terminal assignment exists for the shipment.
//! - `AssignmentNotFound` / `ZoneNotFound`: unknown identifiers.
//! - `Persistence`: a store read or write failed.
//! - `Geometry`: a polygon could not be built from the given points.
//! - `ChannelError`: an internal communication failure between tasks.
//! - `ServiceShutdown`: a request arrived while the service was stopping.
//! - `InvalidRequest`: caller input was malformed or out of bounds.

use super::types::{DeliveryStatus, ZoneId};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the routing core.
#[derive(Clone, thiserror::Error, Debug, PartialEq)]
pub enum Error {
    /// The address could not be resolved to coordinates.
    #[error("Geocoding failed for '{address}': {reason}")]
    GeocodingFailure { address: String, reason: String },

    /// There is nothing the automatic pass could assign to.
    #[error("Nothing to assign: {reason}")]
    InsufficientCoverage { reason: String },

    /// The coordinate is outside every zone, even with the buffer applied.
    #[error("Point ({lat}, {lon}) is outside every zone")]
    UnmatchedPoint { lat: f64, lon: f64 },

    /// Another regeneration of the zone set is still in progress.
    #[error("Zone regeneration already in progress")]
    ConcurrentRegenerationConflict,

    /// The requested status change is not part of the lifecycle.
    #[error("Invalid status transition for shipment {shipment_id}: {from} -> {to}")]
    InvalidTransition {
        shipment_id: String,
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    /// The shipment already has a non-terminal assignment.
    #[error("Shipment {shipment_id} already has an active assignment")]
    AlreadyAssigned { shipment_id: String },

    /// No non-terminal assignment exists for the shipment.
    #[error("No active assignment for shipment {shipment_id}")]
    AssignmentNotFound { shipment_id: String },

    /// The zone id is unknown or inactive.
    #[error("Zone {zone_id} not found")]
    ZoneNotFound { zone_id: ZoneId },

    /// A store operation failed.
    #[error("Persistence error: {context}")]
    Persistence { context: String },

    /// A zone boundary could not be constructed.
    #[error("Geometry error: {reason}")]
    Geometry { reason: String },

    /// Internal channel send/receive failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// The caller request was invalid or exceeded constraints.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl Error {
    /// Returns `true` for failures scoped to a single shipment, which are
    /// reported and retried on the next pass instead of aborting a batch.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::GeocodingFailure { .. } | Self::UnmatchedPoint { .. } | Self::AlreadyAssigned { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence {
            context: err.to_string(),
        }
    }
}
