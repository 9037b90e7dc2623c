#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use serde::Serialize;
use server::config::{CliArgs, Command, ServerConfig};
use server::service::DispatchService;
use server::telemetry::init_telemetry;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry(config.log_format)?;

    if cfg!(debug_assertions) {
        tracing::debug!("Starting with full config: {config:#?}");
    }

    let command = config.command.clone();
    let service = DispatchService::open(config).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(
        shutdown.clone(),
        service.cancellation_token(),
    ));

    let result = match command {
        Command::Serve => {
            service.serve(shutdown).await;
            Ok(())
        }
        Command::Plan { zones } => service.plan(zones).await.and_then(|r| print_json(&r)),
        Command::Assign => service.assign_once().await.and_then(|r| print_json(&r)),
        Command::Geocode { address, force } => {
            let coordinates = service.geocode(&address, force).await;
            print_json(&coordinates)
        }
        Command::Bind { zone, courier } => {
            service.bind(zone, courier).await.and_then(|r| print_json(&r))
        }
    };

    service.shutdown().await;
    tracing::info!("Service shut down successfully");
    result
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken, geocoding: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
    geocoding.cancel();
    shutdown.cancel();
}
