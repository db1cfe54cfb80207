//! # Conclave Orchestrator Server
//!
//! Runs the debate orchestrator as a standalone process.
//!
//! ```bash
//! CONCLAVE_REDIS_URL=redis://localhost:6379 cargo run --bin conclave-orchestrator
//! ```

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use conclave_agent::AgentRuntime;
use conclave_orchestration::Orchestrator;
use conclave_shared::{logging, ConclaveConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    info!("Starting Conclave Orchestrator...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(ConclaveConfig::load()?);
    let orchestrator = Arc::new(Orchestrator::new(&config));
    let mut runtime = AgentRuntime::new(orchestrator, config.clone());
    runtime.start().await?;

    info!(
        agent = %config.orchestrator_agent,
        max_rounds = config.max_debate_rounds,
        "Orchestrator running. Press Ctrl+C to shutdown gracefully"
    );

    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");

    match tokio::time::timeout(config.shutdown_grace() * 2, runtime.stop()).await {
        Ok(()) => info!("Orchestrator stopped"),
        Err(_) => error!("Graceful shutdown timed out, forcing exit"),
    }

    info!("Orchestrator shutdown complete");
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
