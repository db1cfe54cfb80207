//! # Conclave Debate Agent
//!
//! Runs a single debate agent process against the configured bus.
//!
//! ```bash
//! # Proposer under its configured name
//! AGENT_ROLE=proposer cargo run --bin conclave-agent
//!
//! # Critic
//! AGENT_ROLE=critic cargo run --bin conclave-agent
//! ```
//!
//! The model backend is pluggable; this binary wires in the echo responder,
//! which is enough to exercise the full fabric locally.

use std::sync::Arc;

use tokio::signal;
use tracing::info;

use conclave_agent::debate::{DebateAgent, DebateRole, EchoResponder};
use conclave_agent::AgentRuntime;
use conclave_shared::{logging, ConclaveConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Arc::new(ConclaveConfig::load()?);
    let role = match std::env::var("AGENT_ROLE").as_deref() {
        Ok("critic") => DebateRole::Critic,
        _ => DebateRole::Proposer,
    };
    let name = match role {
        DebateRole::Proposer => config.proposer_agent.clone(),
        DebateRole::Critic => config.critic_agent.clone(),
    };

    info!(agent = %name, role = ?role, "Starting debate agent...");

    let handler = Arc::new(DebateAgent::new(&name, role, Box::new(EchoResponder)));
    let mut runtime = AgentRuntime::new(handler, config);
    runtime.start().await?;

    info!(agent = %name, "Agent running. Press Ctrl+C to shutdown gracefully");
    shutdown_signal().await;

    info!("Shutdown signal received, stopping agent...");
    runtime.stop().await;
    info!("Agent shutdown complete");
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
