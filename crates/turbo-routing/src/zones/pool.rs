//! Background workers for CPU-bound zone generation.
//!
//! The planner never clusters on the async executor. Requests travel over a
//! bounded [`mpsc`](tokio::sync::mpsc) channel to a worker, which runs the
//! engine on the blocking pool and replies on a
//! [`oneshot`](tokio::sync::oneshot) channel.

mod manager;
mod worker;

pub use manager::WorkerPool;
pub use worker::worker_loop;

use super::{GeneratedZone, ZonePoint};
use tokio::sync::oneshot;
use turbo_routing_core::Result;

/// A message handled by [`worker_loop`].
#[derive(Debug)]
pub enum WorkRequest {
    /// Cluster `points` into at most `k` zones.
    Generate {
        points: Vec<ZonePoint>,
        k: usize,
        response: oneshot::Sender<Result<Vec<GeneratedZone>>>,
    },
    /// Stop the worker after acknowledging.
    Shutdown { response: oneshot::Sender<()> },
}
