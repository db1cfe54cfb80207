//! # Conclave Websocket Gateway
//!
//! Bridges frontend websocket clients and the bus. Inbound client frames
//! become Task envelopes addressed at the orchestrator; everything published
//! on the frontend broadcast channel is classified and fanned out to every
//! attached client through bounded per-client buffers.

pub mod connections;
pub mod relay;
pub mod ws;

use std::sync::Arc;

use conclave_shared::bus::BusClient;
use conclave_shared::ConclaveConfig;

use connections::ConnectionManager;

/// Shared handles for the gateway process
#[derive(Debug, Clone)]
pub struct GatewayState {
    pub bus: BusClient,
    pub config: Arc<ConclaveConfig>,
    pub connections: Arc<ConnectionManager>,
}

impl GatewayState {
    pub fn new(bus: BusClient, config: Arc<ConclaveConfig>) -> Self {
        GatewayState {
            bus,
            config,
            connections: Arc::new(ConnectionManager::new()),
        }
    }
}
