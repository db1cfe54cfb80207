//! # Conclave Tool Core Server
//!
//! Runs the tool execution service: HTTP API, bus request listener and the
//! sandbox polling loop, with its own heartbeat so the coordinator counts
//! it as a required agent.
//!
//! ```bash
//! CONCLAVE_TOOLCORE_BIND_ADDR=0.0.0.0:8200 cargo run --bin conclave-toolcore
//! ```

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use conclave_shared::bus::{heartbeat_key, BusClient, HEARTBEAT_ALIVE};
use conclave_shared::{logging, ConclaveConfig};
use conclave_toolcore::registry::InMemoryToolRegistry;
use conclave_toolcore::{bus_listener, http, ToolCoreService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    info!("Starting Conclave Tool Core...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(ConclaveConfig::load()?);
    let bus = BusClient::connect(&config.redis_url)
        .await?
        .with_publish_deadline(config.publish_deadline());

    let registry = Arc::new(InMemoryToolRegistry::with_builtin_tools());
    let service = Arc::new(ToolCoreService::new(bus.clone(), &config, registry));
    let cancel = CancellationToken::new();

    let polling = service.start_polling();
    let listener = bus_listener::spawn(
        service.clone(),
        bus.clone(),
        config.tool_request_channel.clone(),
        cancel.clone(),
    );
    let heartbeat = tokio::spawn(heartbeat_loop(
        bus.clone(),
        config.clone(),
        cancel.clone(),
    ));

    let tcp = tokio::net::TcpListener::bind(&config.toolcore_bind_addr).await?;
    info!(
        addr = %config.toolcore_bind_addr,
        sandbox = %config.sandbox_api_url,
        "Tool Core running. Press Ctrl+C to shutdown gracefully"
    );

    let app = http::router(service.clone());
    let shutdown = cancel.clone();
    let server = axum::serve(tcp, app).with_graceful_shutdown(async move {
        shutdown.cancelled().await;
    });

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server failed");
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, initiating graceful shutdown...");
        }
    }

    cancel.cancel();
    service.shutdown();
    let grace = config.shutdown_grace();
    for (name, handle) in [
        ("listener", listener),
        ("polling", polling),
        ("heartbeat", heartbeat),
    ] {
        let mut handle = handle;
        if tokio::time::timeout(grace, &mut handle).await.is_err() {
            error!(activity = name, "Did not stop within grace period, aborting");
            handle.abort();
        }
    }

    info!("Tool Core shutdown complete");
    Ok(())
}

/// The tool core's own liveness marker
async fn heartbeat_loop(bus: BusClient, config: Arc<ConclaveConfig>, cancel: CancellationToken) {
    let key = heartbeat_key(&config.toolcore_agent);
    loop {
        if let Err(e) = bus
            .set_with_ttl(&key, HEARTBEAT_ALIVE, config.heartbeat_ttl())
            .await
        {
            error!(error = %e, "Tool core heartbeat failed");
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.heartbeat_interval()) => {}
        }
    }
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
