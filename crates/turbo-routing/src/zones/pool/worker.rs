use super::WorkRequest;
use crate::zones::ZoneGenerationEngine;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use turbo_routing_core::Error;

/// Worker task processing [`WorkRequest`]s until told to shut down.
///
/// Clustering runs under [`tokio::task::spawn_blocking`]. A cancelled
/// `shutdown_token` answers the pending request with
/// [`Error::ServiceShutdown`] without waiting for the blocking task.
pub async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<WorkRequest>,
    engine: Arc<ZoneGenerationEngine>,
    shutdown_token: CancellationToken,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    while let Some(work) = rx.recv().await {
        match work {
            WorkRequest::Generate {
                points,
                k,
                response,
            } => {
                #[cfg(feature = "tracing")]
                tracing::debug!(worker_id, points = points.len(), k, "Generating zones");

                let engine = Arc::clone(&engine);
                let task = tokio::task::spawn_blocking(move || engine.generate_zones(&points, k));

                let result = tokio::select! {
                    () = shutdown_token.cancelled() => Err(Error::ServiceShutdown),
                    joined = task => joined.map_err(|e| Error::ChannelError {
                        context: format!("Worker {worker_id} generation task failed: {e}"),
                    }),
                };

                if response.send(result).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {worker_id}: requester went away");
                }
            }
            WorkRequest::Shutdown { response } => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}
