//! # Conclave Gateway Server
//!
//! Runs the websocket gateway: accepts frontend clients on `/ws` and relays
//! the frontend broadcast channel to every attached client.
//!
//! ```bash
//! CONCLAVE_GATEWAY_BIND_ADDR=0.0.0.0:8300 cargo run --bin conclave-gateway
//! ```

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use conclave_gateway::{relay, ws, GatewayState};
use conclave_shared::bus::BusClient;
use conclave_shared::{logging, ConclaveConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    info!("Starting Conclave Gateway...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(ConclaveConfig::load()?);
    let bus = BusClient::connect(&config.redis_url)
        .await?
        .with_publish_deadline(config.publish_deadline());
    let state = Arc::new(GatewayState::new(bus, config.clone()));
    let cancel = CancellationToken::new();

    let relay_handle = relay::spawn(state.clone(), cancel.clone());

    let tcp = tokio::net::TcpListener::bind(&config.gateway_bind_addr).await?;
    info!(
        addr = %config.gateway_bind_addr,
        "Gateway running on /ws. Press Ctrl+C to shutdown gracefully"
    );

    let app = ws::router(state.clone());
    let shutdown = cancel.clone();
    let server = axum::serve(tcp, app).with_graceful_shutdown(async move {
        shutdown.cancelled().await;
    });

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "Websocket server failed");
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, initiating graceful shutdown...");
        }
    }

    cancel.cancel();
    let mut relay_handle = relay_handle;
    if tokio::time::timeout(config.shutdown_grace(), &mut relay_handle)
        .await
        .is_err()
    {
        error!("Relay did not stop within grace period, aborting");
        relay_handle.abort();
    }

    info!("Gateway shutdown complete");
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
