//! Data contracts and errors shared by every Turbo routing crate.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
