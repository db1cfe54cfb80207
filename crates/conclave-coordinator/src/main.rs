//! # Conclave Coordinator Process
//!
//! Waits for the required agents at boot (bounded), then monitors liveness
//! and publishes readiness snapshots until shutdown.

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use conclave_coordinator::Coordinator;
use conclave_shared::bus::{heartbeat_key, BusClient, HEARTBEAT_ALIVE};
use conclave_shared::{logging, ConclaveConfig};

const COORDINATOR_IDENTITY: &str = "coordinator";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    info!("Starting Conclave Coordinator...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(ConclaveConfig::load()?);
    let bus = BusClient::connect(&config.redis_url)
        .await?
        .with_publish_deadline(config.publish_deadline());
    let coordinator = Coordinator::new(bus.clone(), config.clone());
    let cancel = CancellationToken::new();

    // Own liveness marker, so the rest of the system can see us too.
    let heartbeat = tokio::spawn({
        let bus = bus.clone();
        let config = config.clone();
        let cancel = cancel.clone();
        async move {
            let key = heartbeat_key(COORDINATOR_IDENTITY);
            loop {
                if let Err(e) = bus
                    .set_with_ttl(&key, HEARTBEAT_ALIVE, config.heartbeat_ttl())
                    .await
                {
                    error!(error = %e, "Coordinator heartbeat failed");
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.heartbeat_interval()) => {}
                }
            }
        }
    });

    if !coordinator.wait_for_ready().await {
        info!("Continuing to monitor despite incomplete startup readiness");
    }
    let monitor = coordinator.spawn_monitor(cancel.clone());

    info!("Coordinator running. Press Ctrl+C to shutdown gracefully");
    shutdown_signal().await;
    info!("Shutdown signal received, stopping coordinator...");

    cancel.cancel();
    for (name, handle) in [("monitor", monitor), ("heartbeat", heartbeat)] {
        let mut handle = handle;
        if tokio::time::timeout(config.shutdown_grace(), &mut handle)
            .await
            .is_err()
        {
            error!(activity = name, "Did not stop within grace period, aborting");
            handle.abort();
        }
    }

    info!("Coordinator shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
