#![doc = include_str!("../README.md")]

pub mod assignment;
mod clustering;
pub mod geocoding;
pub mod geometry;
pub mod orchestrator;
pub mod shipments;
pub mod store;
mod time;
pub mod zones;

pub use crate::assignment::*;
pub use crate::clustering::*;
pub use crate::orchestrator::*;
pub use crate::shipments::*;
pub use crate::store::*;
pub use crate::time::*;
pub use crate::zones::*;
pub use turbo_routing_core::*;
