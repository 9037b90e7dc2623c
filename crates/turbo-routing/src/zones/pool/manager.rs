use super::WorkRequest;
use crate::zones::{GeneratedZone, ZonePoint};
use core::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use turbo_routing_core::{Error, Result};

/// A pool of zone-generation workers.
///
/// Work is distributed round-robin. Shutdown cancels the shared token so
/// in-flight requests resolve with [`Error::ServiceShutdown`], then waits for
/// every worker to acknowledge.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<mpsc::Sender<WorkRequest>>,
    next_worker: AtomicUsize,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    pub const fn new(
        workers: Vec<mpsc::Sender<WorkRequest>>,
        shutdown_token: CancellationToken,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            shutdown_token,
            shutdown_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Sends a [`WorkRequest`] to the next worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has begun and
    /// [`Error::ChannelError`] if the worker is gone.
    pub async fn send_to_next_worker(&self, request: WorkRequest) -> Result<()> {
        if self.shutdown_token.is_cancelled() || self.workers.is_empty() {
            return Err(Error::ServiceShutdown);
        }

        let worker_idx = self.next_worker_index();
        self.workers[worker_idx]
            .send(request)
            .await
            .map_err(|_| Error::ChannelError {
                context: format!("Worker {worker_idx} channel closed"),
            })
    }

    /// Runs one generation request on the pool and waits for its result.
    pub async fn generate(&self, points: Vec<ZonePoint>, k: usize) -> Result<Vec<GeneratedZone>> {
        let (tx, rx) = oneshot::channel();
        self.send_to_next_worker(WorkRequest::Generate {
            points,
            k,
            response: tx,
        })
        .await?;

        rx.await.map_err(|_| Error::ChannelError {
            context: "Worker dropped the generation response".to_string(),
        })?
    }

    /// Cancels outstanding work and waits, up to the shutdown timeout per
    /// worker, for every worker to acknowledge.
    pub async fn shutdown(&self) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling outstanding zone generation");
        self.shutdown_token.cancel();

        let mut acks = Vec::with_capacity(self.workers.len());
        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            if let Err(_e) = worker.send(WorkRequest::Shutdown { response: tx }).await {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to send shutdown to worker {i}: {_e}");
            } else {
                acks.push((i, rx));
            }
        }

        let shutdown_timeout = self.shutdown_timeout;
        let waits = acks.into_iter().map(|(_i, rx)| async move {
            match timeout(shutdown_timeout, rx).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} shutdown acknowledged");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_i} returned error: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_i} shutdown timed out");
                }
            }
        });
        futures::future::join_all(waits).await;

        #[cfg(feature = "tracing")]
        tracing::info!("Zone worker pool shutdown complete");
        Ok(())
    }
}
