//! Server-side components of the `turbo-routing` dispatch service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI and environment configuration.
//! - [`storage`] - JSON files in the data directory.
//! - [`service`] - Wiring of the routing components and the commands run
//!   against them.
//! - [`telemetry`] - Structured logging initialization.

pub mod config;
pub mod service;
pub mod storage;
pub mod telemetry;
