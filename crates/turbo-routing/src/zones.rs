//! Zone generation and the planner that commits zone sets.
//!
//! ## Structure
//!
//! - [`ZoneGenerationEngine`] clusters geocoded shipments and derives a
//!   labelled polygon per cluster.
//! - [`ZonePlanner`] runs the engine on background workers and is the single
//!   writer of the active zone set.

mod engine;
mod label;
mod planner;
pub mod pool;

pub use engine::*;
pub use label::*;
pub use planner::*;
